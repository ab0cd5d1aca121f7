//! Candidate documents produced by discovery.

/// Where the bytes of an item come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Must be fetched from `source_url`
    Remote,
    /// Already in memory (decompressed archive entry)
    Inline(Vec<u8>),
}

/// One unit of work for the item pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Provenance; archive entries use `archive_url#entry_name`
    pub source_url: String,
    pub file_name: String,
    pub payload: Payload,
    /// A 404 for this item is expected and logged quietly
    pub missing_ok: bool,
}

impl Item {
    /// Item fetched over the network; the file name is the last URL segment.
    pub fn remote(url: impl Into<String>) -> Self {
        let source_url = url.into();
        let file_name = file_name_from_url(&source_url);
        Self {
            source_url,
            file_name,
            payload: Payload::Remote,
            missing_ok: false,
        }
    }

    /// Item whose bytes were read from an archive entry.
    pub fn archived(archive_url: &str, entry_name: &str, content: Vec<u8>) -> Self {
        Self {
            source_url: format!("{archive_url}#{entry_name}"),
            file_name: entry_file_name(entry_name),
            payload: Payload::Inline(content),
            missing_ok: false,
        }
    }

    pub fn missing_ok(mut self, missing_ok: bool) -> Self {
        self.missing_ok = missing_ok;
        self
    }
}

/// Last path segment of a URL, ignoring any query string.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Last path segment of an archive entry name.
pub fn entry_file_name(entry_name: &str) -> String {
    entry_name
        .rsplit('/')
        .next()
        .unwrap_or(entry_name)
        .to_string()
}
