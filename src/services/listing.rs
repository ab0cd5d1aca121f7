//! Paginated HTML listing discovery.
//!
//! Walks `{base}/data-set-{n}-files?page=0,1,2,...` collecting PDF links until
//! a page yields none.

use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::{Event, EventType, Item, Run};
use crate::pipeline::ItemPipeline;
use crate::services::require_data_set_number;
use crate::utils::{is_pdf_name, resolve_url};

/// Discovery over a paginated listing of PDF links.
#[derive(Debug, Clone)]
pub struct ListingDiscovery {
    base_url: String,
    max_pages: u32,
}

impl ListingDiscovery {
    pub fn new(base_url: &str, max_pages: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages,
        }
    }

    pub fn page_url(&self, number: u32, page: u32) -> String {
        format!("{}/data-set-{}-files?page={}", self.base_url, number, page)
    }

    /// Collect every PDF link in listing order.
    ///
    /// Stops at the first empty page, the page limit, or the first page that
    /// cannot be fetched.
    async fn discover(&self, pipeline: &ItemPipeline, run: &Run, number: u32) -> Vec<String> {
        let mut urls = Vec::new();

        for page in 0..self.max_pages {
            let page_url = self.page_url(number, page);
            let html = match pipeline.fetcher().fetch_text(&page_url).await {
                Ok(html) => html,
                Err(e) => {
                    log::error!(
                        "[{}] [{}] Listing discovery stopped at page {}: {}",
                        run.id,
                        run.data_set,
                        page,
                        e
                    );
                    pipeline
                        .record_event(Event::new(
                            run.id,
                            EventType::DiscoveryFailed,
                            Some(page_url.as_str()),
                            e.to_string(),
                        ))
                        .await;
                    return urls;
                }
            };

            let links = extract_pdf_links(&html, &page_url);
            if links.is_empty() {
                log::debug!(
                    "[{}] [{}] Page {} has no documents, discovery complete",
                    run.id,
                    run.data_set,
                    page
                );
                return urls;
            }

            log::info!(
                "[{}] [{}] Page {}: {} documents",
                run.id,
                run.data_set,
                page,
                links.len()
            );
            for link in links {
                pipeline
                    .record_event(Event::new(
                        run.id,
                        EventType::DocumentDiscovered,
                        Some(link.as_str()),
                        format!("Discovered on page {page}"),
                    ))
                    .await;
                urls.push(link);
            }
        }

        log::warn!(
            "[{}] [{}] Listing discovery hit the {} page limit",
            run.id,
            run.data_set,
            self.max_pages
        );
        urls
    }

    pub async fn execute(&self, pipeline: &ItemPipeline, run: &mut Run) -> Result<()> {
        let number = require_data_set_number(&run.data_set)?;
        let urls = self.discover(pipeline, run, number).await;

        run.total_discovered = urls.len() as u64;
        pipeline.persist_run(run).await;
        log::info!(
            "[{}] [{}] Discovered {} documents",
            run.id,
            run.data_set,
            urls.len()
        );

        for url in urls {
            pipeline.process(run, &Item::remote(url)).await;
        }
        Ok(())
    }
}

/// Absolute URLs of every `a[href]` on the page that end in `.pdf`.
pub fn extract_pdf_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_url(&base, href.trim()))
        .filter(|link| is_pdf_name(link))
        .collect()
}
