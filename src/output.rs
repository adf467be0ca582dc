use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::{PageOutcome, ProgressEvent, ProgressSink, SearchOutcome};
use crate::domain::QueryFields;
use crate::page::ResultPage;
use crate::search::SearchRequest;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Serialize)]
struct PageJson<'a> {
    fields: &'a QueryFields,
    request: &'a SearchRequest,
    url: &'a str,
    offset: u32,
    full: bool,
    has_next: bool,
    has_previous: bool,
    total: Option<u64>,
    notice: Option<&'a str>,
    fetched_at: &'a str,
    rows: Vec<Map<String, Value>>,
}

impl<'a> PageJson<'a> {
    fn new(
        fields: &'a QueryFields,
        request: &'a SearchRequest,
        url: &'a str,
        page: &'a ResultPage,
        minimal: bool,
    ) -> Self {
        Self {
            fields,
            request,
            url,
            offset: page.offset,
            full: page.full,
            has_next: page.has_next(),
            has_previous: page.has_previous(),
            total: page.total,
            notice: page.notice(),
            fetched_at: &page.fetched_at,
            rows: page.table(minimal),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    /// `request` in the output can be passed back to `gbif-nl page`.
    pub fn print_search(outcome: &SearchOutcome, minimal: bool) -> io::Result<()> {
        Self::print_json(&PageJson::new(
            &outcome.fields,
            &outcome.request,
            &outcome.url,
            &outcome.page,
            minimal,
        ))
    }

    pub fn print_page(outcome: &PageOutcome, minimal: bool) -> io::Result<()> {
        Self::print_json(&PageJson::new(
            outcome.request.fields(),
            &outcome.request,
            &outcome.url,
            &outcome.page,
            minimal,
        ))
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain text rendering for a terminal.
pub struct TextOutput;

impl TextOutput {
    pub fn print_fields(fields: &QueryFields) {
        println!("Interpreted parameters");
        for (key, value) in fields.iter() {
            println!("  {key:<16} {value}");
        }
    }

    /// `request_ref` is what to pass to `gbif-nl page --request`.
    pub fn print_search(outcome: &SearchOutcome, minimal: bool, request_ref: &str) {
        Self::print_fields(&outcome.fields);
        println!();
        Self::print_rows(&outcome.page, &outcome.url, minimal, request_ref);
    }

    pub fn print_page(outcome: &PageOutcome, minimal: bool, request_ref: &str) {
        Self::print_rows(&outcome.page, &outcome.url, minimal, request_ref);
    }

    fn print_rows(page: &ResultPage, url: &str, minimal: bool, request_ref: &str) {
        if let Some(notice) = page.notice() {
            println!("{notice}");
        } else {
            for row in page.table(minimal) {
                let line = row
                    .iter()
                    .map(|(name, value)| format!("{name}={}", cell(value)))
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("{line}");
            }
            let shown_to = page.offset as usize + page.rows.len();
            match page.total {
                Some(total) => println!(
                    "\nrecords {}-{} of {total}",
                    page.offset as usize + 1,
                    shown_to
                ),
                None => println!("\nrecords {}-{}", page.offset as usize + 1, shown_to),
            }
        }
        if page.has_next() {
            println!("next page: gbif-nl page --request {request_ref} --next");
        }
        if page.has_previous() {
            println!("previous page: gbif-nl page --request {request_ref} --previous");
        }
        println!("Open raw GBIF search results: {url}");
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join("; "),
        other => other.to_string(),
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1?})", event.message, elapsed),
            None => eprintln!("{}", event.message),
        }
    }
}
