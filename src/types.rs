use crate::constants::{VENUE_ALL, VENUE_NEW_YORK};
use crate::error::ScraperError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Venue selector sent to the lineup API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueSelector {
    NewYork,
    /// Sentinel asking the API for every venue
    All,
}

impl VenueSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueSelector::NewYork => VENUE_NEW_YORK,
            VenueSelector::All => VENUE_ALL,
        }
    }
}

impl Default for VenueSelector {
    fn default() -> Self {
        VenueSelector::NewYork
    }
}

impl fmt::Display for VenueSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueSelector {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            VENUE_NEW_YORK => Ok(VenueSelector::NewYork),
            VENUE_ALL => Ok(VenueSelector::All),
            other => Err(ScraperError::Config(format!(
                "Unknown venue '{other}' (expected '{VENUE_NEW_YORK}' or '{VENUE_ALL}')"
            ))),
        }
    }
}

/// Raw venue API response for one (date, venue) request
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub date: NaiveDate,
    pub venue: VenueSelector,
    pub body: serde_json::Value,
    /// Position of the successful request in the run's global request order
    pub sequence: u64,
}

/// One performer block as found in a lineup fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPerformer {
    pub name: String,
    pub description: String,
    pub website: String,
    pub thumb_url: String,
}

/// One show extracted from a lineup fragment, performers in source order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedShow {
    pub date: NaiveDate,
    pub time: String,
    pub venue: String,
    pub performers: Vec<ParsedPerformer>,
}

/// Canonical show after aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Show {
    pub show_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub venue: String,
    /// Performer names in lineup order
    pub comedians: Vec<String>,
}

impl Show {
    pub fn comedian_count(&self) -> usize {
        self.comedians.len()
    }
}

/// One performer's slot in one show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appearance {
    pub show_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub venue: String,
    pub comedian_name: String,
    /// 1-based position in the show
    pub order: usize,
    pub description: String,
    pub website: String,
    pub thumb_url: String,
}

/// Finalized, read-only view of the aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub shows: Vec<Show>,
    pub appearances: Vec<Appearance>,
}
