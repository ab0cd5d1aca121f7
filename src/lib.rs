// src/lib.rs

//! Resilient document ingestor library

pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod utils;

#[cfg(test)]
mod testing;
