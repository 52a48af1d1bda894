pub mod aggregate;
pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod export;
pub mod idempotency;
pub mod ingestion;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod types;
