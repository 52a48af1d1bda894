//! Venue API acquisition: transport, pacing, retry, and the rate-controlled
//! fetcher built from them.

pub mod fetcher;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use fetcher::{FetchFailure, FetchOutcome, LineupFetcher};
pub use rate_limiter::{PacingConfig, RateController};
pub use retry::RetryPolicy;
pub use transport::{LineupTransport, ReqwestTransport, TransportResponse};
