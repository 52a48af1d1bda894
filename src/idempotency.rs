use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Stable show identifier: the first 16 hex chars of SHA-256 over
/// `date|time|venue`. Identical keys give identical ids across runs.
pub fn compute_show_id(date: NaiveDate, time: &str, venue: &str) -> String {
    let mut s = String::new();
    s.push_str(&date.format("%Y-%m-%d").to_string());
    s.push('|');
    s.push_str(time);
    s.push('|');
    s.push_str(venue);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    hex::encode(&out[..8])
}
