//! Choosing one profile among lookup candidates.
//!
//! Each candidate is scored in [0, 1]:
//! - +0.3 per name token (longer than two characters) found in the handle
//! - +0.4 when the full name appears in the display name or bio
//! - +0.1 when the display name or bio mentions comedy
//! - +0.2 when the text carries a verification marker
//!
//! Candidates under [`MIN_CONFIDENCE`] are dropped. If the best two
//! survivors are closer than [`AMBIGUITY_MARGIN`] the name is ambiguous.

use crate::enrich::{LookupState, ProfileCandidate};
use std::collections::HashMap;

pub const MIN_CONFIDENCE: f64 = 0.5;
pub const AMBIGUITY_MARGIN: f64 = 0.05;

const COMEDY_KEYWORDS: &[&str] = &["comedian", "comedy", "stand-up", "standup", "comic"];
const VERIFIED_MARKERS: &[&str] = &["verified", "✓"];

pub fn confidence(name: &str, candidate: &ProfileCandidate) -> f64 {
    let name_lower = name.to_lowercase();
    let handle = candidate.handle.to_lowercase();
    let text = format!("{} {}", candidate.display_name, candidate.bio_snippet).to_lowercase();

    let mut score = 0.0;
    for part in name_lower.split_whitespace() {
        if part.chars().count() > 2 && handle.contains(part) {
            score += 0.3;
        }
    }
    if !name_lower.trim().is_empty() && text.contains(name_lower.trim()) {
        score += 0.4;
    }
    if COMEDY_KEYWORDS.iter().any(|k| text.contains(k)) {
        score += 0.1;
    }
    if VERIFIED_MARKERS.iter().any(|m| text.contains(m)) {
        score += 0.2;
    }
    f64::min(score, 1.0)
}

/// Collapse candidates sharing a handle (case-insensitive): the best-scoring
/// entry is kept, carrying the largest follower count seen for that handle.
fn dedupe(name: &str, candidates: &[ProfileCandidate]) -> Vec<(ProfileCandidate, f64)> {
    let mut by_handle: HashMap<String, (ProfileCandidate, f64)> = HashMap::new();
    let mut order = Vec::new();
    for candidate in candidates {
        let key = candidate.handle.to_lowercase();
        let score = confidence(name, candidate);
        match by_handle.get_mut(&key) {
            Some((kept, kept_score)) => {
                let followers = kept.follower_count.max(candidate.follower_count);
                if score > *kept_score {
                    *kept = candidate.clone();
                    *kept_score = score;
                }
                kept.follower_count = followers;
            }
            None => {
                order.push(key.clone());
                by_handle.insert(key, (candidate.clone(), score));
            }
        }
    }
    order
        .into_iter()
        .filter_map(|key| by_handle.remove(&key))
        .collect()
}

pub fn select_profile(name: &str, candidates: &[ProfileCandidate]) -> LookupState {
    let mut passing: Vec<(ProfileCandidate, f64)> = dedupe(name, candidates)
        .into_iter()
        .filter(|(_, score)| *score >= MIN_CONFIDENCE)
        .collect();
    if passing.is_empty() {
        return LookupState::NotFound;
    }
    // Stable sort keeps lookup order among equal scores.
    passing.sort_by(|a, b| b.1.total_cmp(&a.1));

    let best_score = passing[0].1;
    let contenders: Vec<&(ProfileCandidate, f64)> = passing
        .iter()
        .filter(|(_, score)| best_score - score < AMBIGUITY_MARGIN)
        .collect();
    if contenders.len() > 1 {
        return LookupState::Ambiguous {
            handles: contenders.iter().map(|(c, _)| c.handle.clone()).collect(),
        };
    }

    let (best, confidence) = passing.swap_remove(0);
    LookupState::Resolved {
        handle: best.handle,
        follower_count: best.follower_count,
        confidence,
    }
}
