use once_cell::sync::Lazy;
use regex::Regex;

// Profile meta descriptions read like "2M Followers, 1,038 Following, 757 Posts".
static OG_FOLLOWERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([kmb]?)\s*followers").unwrap());

static SUFFIXED_FOLLOWERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([kmb])\s*(?:instagram\s*)?followers").unwrap()
});
static PLAIN_FOLLOWERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d+)\s*(?:instagram\s*)?followers").unwrap()
});
static FOLLOWERS_THEN_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)followers[\s:]*(\d+(?:\.\d+)?)\s*([kmb])\b").unwrap());

/// Convert "5.2" + "m" style parts to a count. Commas in the number are ignored.
pub fn scale_count(number: &str, suffix: &str) -> Option<u64> {
    let base: f64 = number.replace(',', "").parse().ok()?;
    let multiplier = match suffix.to_ascii_lowercase().as_str() {
        "" => 1.0,
        "k" => 1_000.0,
        "m" => 1_000_000.0,
        "b" => 1_000_000_000.0,
        _ => return None,
    };
    let count = (base * multiplier).round();
    (count > 0.0).then_some(count as u64)
}

/// Follower count from an `og:description` meta tag.
pub fn from_og_description(description: &str) -> Option<u64> {
    let caps = OG_FOLLOWERS.captures(description)?;
    scale_count(&caps[1], caps.get(2).map_or("", |m| m.as_str()))
}

/// Follower count mentioned anywhere in free text such as a search snippet.
pub fn from_text(text: &str) -> Option<u64> {
    if let Some(caps) = SUFFIXED_FOLLOWERS.captures(text) {
        if let Some(count) = scale_count(&caps[1], &caps[2]) {
            return Some(count);
        }
    }
    if let Some(caps) = FOLLOWERS_THEN_COUNT.captures(text) {
        if let Some(count) = scale_count(&caps[1], &caps[2]) {
            return Some(count);
        }
    }
    PLAIN_FOLLOWERS
        .captures(text)
        .and_then(|caps| scale_count(&caps[1], ""))
}

/// Human-readable count: "1.2M", "50.0K", "999".
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
