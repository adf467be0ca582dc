use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::PAGE_SIZE;
use crate::error::SearchError;
use crate::fetch::Fetcher;
use crate::search::{SearchRequest, SearchUrlBuilder};

pub const RECORD_LINK_BASE: &str = "https://gbif.org/occurrence/";
pub const NO_RESULTS_NOTICE: &str = "No values were found for your query. Please try again.";
pub const NO_MORE_RESULTS_NOTICE: &str = "No more records for this query.";
pub const MINIMAL_COLUMNS: [&str; 7] = [
    "link",
    "catalogNumber",
    "scientificName",
    "eventDate",
    "recordedBy",
    "locality",
    "mediaUrl",
];

#[derive(Debug, Deserialize)]
struct OccurrenceResponse {
    results: Vec<Value>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default, rename = "endOfRecords")]
    end_of_records: Option<bool>,
}

/// One occurrence record after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceRow {
    pub key: Option<String>,
    pub link: Option<String>,
    pub catalog_number: Option<String>,
    pub scientific_name: Option<String>,
    pub event_date: Option<String>,
    pub collectors: Vec<String>,
    pub locality: Option<String>,
    pub media_links: Vec<String>,
    pub media_url: Option<String>,
    pub media_label: Option<String>,
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

impl OccurrenceRow {
    pub fn from_record(record: Map<String, Value>) -> Self {
        let key = record.get("key").and_then(scalar_text);
        let link = key.as_ref().map(|key| format!("{RECORD_LINK_BASE}{key}"));
        let media_links = record
            .get("media")
            .and_then(|value| value.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("identifier"))
                    .filter_map(|value| value.as_str())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let media_url = media_links.first().cloned();
        let media_label = media_label(media_links.len());

        Self {
            link,
            catalog_number: text_field(&record, "catalogNumber"),
            scientific_name: text_field(&record, "scientificName"),
            event_date: text_field(&record, "eventDate"),
            collectors: record
                .get("recordedBy")
                .and_then(|value| value.as_str())
                .map(split_collectors)
                .unwrap_or_default(),
            locality: text_field(&record, "locality"),
            media_links,
            media_url,
            media_label,
            key,
            raw: record,
        }
    }

    /// The fixed display columns, in display order.
    pub fn minimal(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("link".to_string(), opt_value(&self.link));
        row.insert("catalogNumber".to_string(), opt_value(&self.catalog_number));
        row.insert("scientificName".to_string(), opt_value(&self.scientific_name));
        row.insert("eventDate".to_string(), opt_value(&self.event_date));
        row.insert("recordedBy".to_string(), collectors_value(&self.collectors));
        row.insert("locality".to_string(), opt_value(&self.locality));
        row.insert("mediaUrl".to_string(), opt_value(&self.media_url));
        row
    }

    /// Every field of the source record in source order, led by `link` in
    /// place of `key`, with collectors split and media summarized.
    pub fn full(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("link".to_string(), opt_value(&self.link));
        for (name, value) in &self.raw {
            match name.as_str() {
                "key" => {}
                "recordedBy" => {
                    row.insert(name.clone(), collectors_value(&self.collectors));
                }
                _ => {
                    row.insert(name.clone(), value.clone());
                }
            }
        }
        row.insert("mediaUrl".to_string(), opt_value(&self.media_url));
        row.insert("mediaLabel".to_string(), opt_value(&self.media_label));
        row
    }

    pub fn project(&self, minimal: bool) -> Map<String, Value> {
        if minimal { self.minimal() } else { self.full() }
    }
}

/// Pipe-delimited collector names, in source order.
pub fn split_collectors(value: &str) -> Vec<String> {
    value
        .split('|')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn media_label(count: usize) -> Option<String> {
    match count {
        0 => None,
        1 => Some("View image".to_string()),
        n => Some(format!("View image ({n})")),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn text_field(record: &Map<String, Value>, name: &str) -> Option<String> {
    record.get(name).and_then(scalar_text)
}

fn opt_value(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn collectors_value(collectors: &[String]) -> Value {
    Value::Array(collectors.iter().cloned().map(Value::String).collect())
}

/// One fetched page. Replaced, never updated, on navigation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub rows: Vec<OccurrenceRow>,
    pub offset: u32,
    pub full: bool,
    pub first: bool,
    pub total: Option<u64>,
    pub end_of_records: Option<bool>,
    pub fetched_at: String,
}

impl ResultPage {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A full page may have more after it, unless the next offset overflows.
    pub fn has_next(&self) -> bool {
        self.full && self.offset.checked_add(PAGE_SIZE).is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    pub fn next_offset(&self) -> Option<u32> {
        if self.full {
            self.offset.checked_add(PAGE_SIZE)
        } else {
            None
        }
    }

    pub fn previous_offset(&self) -> Option<u32> {
        self.has_previous()
            .then(|| self.offset.saturating_sub(PAGE_SIZE))
    }

    /// User-facing notice for an empty page.
    pub fn notice(&self) -> Option<&'static str> {
        if !self.is_empty() {
            None
        } else if self.first {
            Some(NO_RESULTS_NOTICE)
        } else {
            Some(NO_MORE_RESULTS_NOTICE)
        }
    }

    pub fn table(&self, minimal: bool) -> Vec<Map<String, Value>> {
        self.rows.iter().map(|row| row.project(minimal)).collect()
    }
}

/// Parses an occurrence search response body.
pub fn parse_page(body: &str, offset: u32) -> Result<ResultPage, SearchError> {
    let response: OccurrenceResponse =
        serde_json::from_str(body).map_err(|err| SearchError::Decode(err.to_string()))?;
    let rows = response
        .results
        .into_iter()
        .map(|record| match record {
            Value::Object(map) => Ok(OccurrenceRow::from_record(map)),
            other => Err(SearchError::Decode(format!(
                "occurrence record is not an object: {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let full = rows.len() == PAGE_SIZE as usize;
    Ok(ResultPage {
        rows,
        offset,
        full,
        first: offset == 0,
        total: response.count,
        end_of_records: response.end_of_records,
        fetched_at: chrono::Utc::now().to_rfc3339(),
    })
}

pub struct PageAssembler<F: Fetcher> {
    fetcher: F,
    timeout: Duration,
}

impl<F: Fetcher> PageAssembler<F> {
    pub fn new(fetcher: F, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub fn assemble_page(&self, url: &str, offset: u32) -> Result<ResultPage, SearchError> {
        let body = self.fetcher.fetch(url, self.timeout)?;
        let page = parse_page(&body, offset)?;
        debug!(url, rows = page.rows.len(), full = page.full, "assembled page");
        Ok(page)
    }

    pub fn fetch(
        &self,
        builder: &SearchUrlBuilder,
        request: &SearchRequest,
    ) -> Result<ResultPage, SearchError> {
        self.assemble_page(&builder.build(request), request.offset())
    }
}
