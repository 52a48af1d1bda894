/// Venue API endpoint and request constants
pub const VENUE_API_URL: &str = "https://www.comedycellar.com/lineup/api/";
pub const VENUE_API_ACTION: &str = "cc_get_shows";
pub const DEFAULT_REQUEST_TYPE: &str = "past";

// Request selectors accepted by the venue API
pub const VENUE_NEW_YORK: &str = "newyork";
pub const VENUE_ALL: &str = "all";

/// Show labels the venue API is known to emit in set headers
pub const KNOWN_SHOW_VENUES: &[&str] = &[
    "MacDougal Street",
    "Village Underground",
    "Fat Black Pussycat",
    "Fat Black Pussycat Lounge",
];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Joins performer names in the shows table
pub const COMEDIAN_DELIMITER: &str = "; ";
/// Stands in for a literal ';' inside a performer name in joined fields
pub const DELIMITER_REPLACEMENT: char = '\u{FF1B}';

// Google Custom Search defaults
pub const SEARCH_API_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const PROFILE_URL_PREFIX: &str = "https://www.instagram.com/";
pub const GOOGLE_API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const GOOGLE_CSE_ID_VAR: &str = "GOOGLE_CSE_ID";

pub const DEFAULT_CONFIG_PATH: &str = "lineup.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "lineup_data";

/// Build the default export base name for a run started at `now`
pub fn default_base_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("lineups_{}", now.format("%Y%m%d_%H%M%S"))
}
