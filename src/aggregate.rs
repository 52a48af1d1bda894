use crate::idempotency::compute_show_id;
use crate::types::{Appearance, ParsedShow, Show, Snapshot};
use chrono::{NaiveDate, NaiveTime};
use metrics::counter;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Show identity: (date, time, venue)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShowKey {
    pub date: NaiveDate,
    pub time: String,
    pub venue: String,
}

impl ShowKey {
    fn of(show: &ParsedShow) -> Self {
        Self {
            date: show.date,
            time: show.time.clone(),
            venue: show.venue.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredShow {
    sequence: u64,
    parsed: ParsedShow,
}

/// Result of one ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Replaced,
    /// An ingestion with a later sequence already holds this key
    Stale,
    /// The show has no performers and is not recorded
    Empty,
}

/// Folds parsed shows into one canonical show per key. A later ingestion for
/// the same key replaces the earlier one; "later" is the fetch sequence when
/// given, otherwise the aggregator's own ingestion counter. Shows without
/// performers are never recorded, so every stored show has a non-empty
/// `comedians` list.
#[derive(Debug, Default)]
pub struct Aggregator {
    shows: HashMap<ShowKey, StoredShow>,
    next_sequence: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    /// Ingest in arrival order.
    pub fn ingest(&mut self, show: ParsedShow) -> IngestOutcome {
        let sequence = self.next_sequence + 1;
        self.ingest_at(show, sequence)
    }

    /// Ingest with an explicit total-order position (the fetch sequence).
    pub fn ingest_at(&mut self, show: ParsedShow, sequence: u64) -> IngestOutcome {
        self.next_sequence = self.next_sequence.max(sequence);
        let key = ShowKey::of(&show);
        if show.performers.is_empty() {
            warn!(
                "Ignoring show without performers: {} {} {}",
                key.date, key.time, key.venue
            );
            return IngestOutcome::Empty;
        }

        let outcome = match self.shows.get(&key) {
            Some(existing) if existing.sequence > sequence => {
                debug!(
                    "Ignoring stale ingestion for {} {} {} (seq {} < {})",
                    key.date, key.time, key.venue, sequence, existing.sequence
                );
                return IngestOutcome::Stale;
            }
            Some(_) => IngestOutcome::Replaced,
            None => IngestOutcome::Inserted,
        };
        if outcome == IngestOutcome::Inserted {
            counter!("lineup_shows_ingested_total").increment(1);
        }

        self.shows.insert(
            key,
            StoredShow {
                sequence,
                parsed: show,
            },
        );
        outcome
    }

    /// Read-only view of the canonical shows and their appearances, ordered
    /// by date, clock time, then venue.
    pub fn snapshot(&self) -> Snapshot {
        let mut entries: Vec<(&ShowKey, &StoredShow)> = self.shows.iter().collect();
        entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));

        let mut snapshot = Snapshot::default();
        for (key, stored) in entries {
            let show_id = compute_show_id(key.date, &key.time, &key.venue);
            let performers = &stored.parsed.performers;

            for (position, performer) in performers.iter().enumerate() {
                snapshot.appearances.push(Appearance {
                    show_id: show_id.clone(),
                    date: key.date,
                    time: key.time.clone(),
                    venue: key.venue.clone(),
                    comedian_name: performer.name.clone(),
                    order: position + 1,
                    description: performer.description.clone(),
                    website: performer.website.clone(),
                    thumb_url: performer.thumb_url.clone(),
                });
            }

            snapshot.shows.push(Show {
                show_id,
                date: key.date,
                time: key.time.clone(),
                venue: key.venue.clone(),
                comedians: performers.iter().map(|p| p.name.clone()).collect(),
            });
        }
        snapshot
    }
}

/// Minutes after midnight for clock strings such as "8:00pm" or "10:30 PM".
fn clock_minutes(time: &str) -> Option<u32> {
    use chrono::Timelike;
    let normalized = time.replace(' ', "").to_uppercase();
    ["%I:%M%p", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&normalized, fmt).ok())
        .map(|t| t.hour() * 60 + t.minute())
}

fn compare_keys(a: &ShowKey, b: &ShowKey) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| match (clock_minutes(&a.time), clock_minutes(&b.time)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.time.cmp(&b.time),
        })
        .then_with(|| a.time.cmp(&b.time))
        .then_with(|| a.venue.cmp(&b.venue))
}
