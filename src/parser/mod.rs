//! Lineup payload parsing. The venue API wraps its lineup markup in a JSON
//! envelope (`{"show": {"html": "..."}}`); each show in the markup is a
//! `div.set-header` paired with a `div[data-set-content]` lineup container.

use crate::constants::KNOWN_SHOW_VENUES;
use crate::error::{Result, ScraperError};
use crate::types::{ParsedPerformer, ParsedShow, RawPayload};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

static SET_HEADER: Lazy<Selector> = Lazy::new(|| Selector::parse("div.set-header").unwrap());
static TIME_SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span.bold").unwrap());
static TITLE_SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span.title").unwrap());
static LINEUP_TOGGLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.lineup-toggle").unwrap());
static LINEUP_CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-set-content]").unwrap());
static PERFORMER_BLOCK: Lazy<Selector> = Lazy::new(|| Selector::parse("div.set-content").unwrap());
static NAME_SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span.name").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

static TRAILING_SHOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*show\s*$").unwrap());

/// The `show` member of a lineup response
#[derive(Debug, Default, Deserialize)]
pub struct ShowSection {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Validate the response envelope and return its show section, if any.
/// `null`, `false`, or an empty string under `show` mean "no shows".
pub fn show_section(body: &Value) -> Result<Option<ShowSection>> {
    let root = body
        .as_object()
        .ok_or_else(|| ScraperError::malformed("response is not a JSON object"))?;

    match root.get("show") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(v @ Value::Object(_)) => {
            let section: ShowSection = serde_json::from_value(v.clone())
                .map_err(|e| ScraperError::malformed(format!("unexpected show shape: {e}")))?;
            Ok(Some(section))
        }
        Some(other) => Err(ScraperError::malformed(format!(
            "show has unexpected type: {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LineupParser;

impl LineupParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one venue API payload. Zero shows is an empty list; only a
    /// mis-shaped envelope is an error.
    pub fn parse(&self, payload: &RawPayload) -> Result<Vec<ParsedShow>> {
        let Some(section) = show_section(&payload.body)? else {
            debug!("No show section for {}", payload.date);
            return Ok(Vec::new());
        };

        if let Some(reported) = section.date.as_deref() {
            if NaiveDate::parse_from_str(reported, "%Y-%m-%d").ok() != Some(payload.date) {
                debug!(
                    "Response reports date '{}' for request {}",
                    reported, payload.date
                );
            }
        }

        let shows = match section.html.as_deref() {
            Some(html) if !html.trim().is_empty() => self.parse_html(payload.date, html),
            _ => Vec::new(),
        };
        info!("Found {} shows for {}", shows.len(), payload.date);
        Ok(shows)
    }

    /// Extract every well-formed show fragment from lineup markup. Malformed
    /// fragments are logged and skipped.
    pub fn parse_html(&self, date: NaiveDate, html: &str) -> Vec<ParsedShow> {
        let document = Html::parse_fragment(html);

        let containers: HashMap<String, ElementRef> = document
            .select(&LINEUP_CONTAINER)
            .filter_map(|el| {
                el.value()
                    .attr("data-set-content")
                    .map(|id| (id.trim().to_string(), el))
            })
            .collect();

        let mut shows = Vec::new();
        for (index, header) in document.select(&SET_HEADER).enumerate() {
            match parse_fragment(date, index, header, &containers) {
                Ok(show) => shows.push(show),
                Err(reason) => {
                    warn!("Error parsing show {} on {}: {}", index, date, reason);
                }
            }
        }
        shows
    }
}

fn parse_fragment(
    date: NaiveDate,
    index: usize,
    header: ElementRef<'_>,
    containers: &HashMap<String, ElementRef<'_>>,
) -> std::result::Result<ParsedShow, String> {
    let time_text = header
        .select(&TIME_SPAN)
        .next()
        .map(element_text)
        .ok_or("set header has no time span")?;
    let time = TRAILING_SHOW.replace(&time_text, "").trim().to_string();
    if time.is_empty() {
        return Err("set header has an empty show time".into());
    }

    let venue = header
        .select(&TITLE_SPAN)
        .next()
        .map(element_text)
        .filter(|v| !v.is_empty())
        .ok_or("set header has no venue title")?;
    if !KNOWN_SHOW_VENUES.iter().any(|known| known.eq_ignore_ascii_case(&venue)) {
        debug!("Unrecognized venue label '{}'", venue);
    }

    let lineup_id = header
        .select(&LINEUP_TOGGLE)
        .next()
        .and_then(|toggle| toggle.value().attr("data-lineup-id"))
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|| index.to_string());

    let container = containers
        .get(&lineup_id)
        .ok_or_else(|| format!("no lineup container for lineup id {lineup_id}"))?;
    let performers: Vec<ParsedPerformer> = container
        .select(&PERFORMER_BLOCK)
        .filter_map(|block| {
            let performer = parse_performer(block);
            if performer.is_none() {
                debug!("Skipping performer block without a name in lineup {}", lineup_id);
            }
            performer
        })
        .collect();
    if performers.is_empty() {
        return Err(format!("lineup {lineup_id} has no named performers"));
    }

    Ok(ParsedShow {
        date,
        time,
        venue,
        performers,
    })
}

fn parse_performer(block: ElementRef<'_>) -> Option<ParsedPerformer> {
    let name = block
        .select(&NAME_SPAN)
        .next()
        .map(element_text)
        .filter(|n| !n.is_empty())?;

    let description = block
        .select(&PARAGRAPH)
        .find(|p| p.select(&NAME_SPAN).next().is_some())
        .map(|p| collapse_whitespace(&element_text(p).replacen(&name, "", 1)))
        .unwrap_or_default();

    let website = block
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .unwrap_or_default();

    let thumb_url = block
        .select(&IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .unwrap_or_default();

    Some(ParsedPerformer {
        name,
        description,
        website,
        thumb_url,
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
