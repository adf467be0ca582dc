use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use gbif_nl_search::app::{App, PageTurn, Pager, ProgressEvent, ProgressSink, SearchOptions};
use gbif_nl_search::domain::{EntityKey, PAGE_SIZE, QueryKey};
use gbif_nl_search::error::SearchError;
use gbif_nl_search::fetch::Fetcher;
use gbif_nl_search::page::NO_RESULTS_NOTICE;
use gbif_nl_search::search::SearchRequest;
use gbif_nl_search::translate::Oracle;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

struct MockOracle {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl Oracle for MockOracle {
    fn complete(&self, prompt: &str) -> Result<String, SearchError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Answers lookups with `lookup` and occurrence searches with `occurrences`.
struct MockGbif {
    lookup: String,
    occurrences: String,
    urls: Mutex<Vec<String>>,
}

impl MockGbif {
    fn new(lookup: &str, occurrences: String) -> Self {
        Self {
            lookup: lookup.to_string(),
            occurrences,
            urls: Mutex::new(Vec::new()),
        }
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Fetcher for MockGbif {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, SearchError> {
        self.urls.lock().unwrap().push(url.to_string());
        if url.contains("/grscicoll/") {
            Ok(self.lookup.clone())
        } else {
            Ok(self.occurrences.clone())
        }
    }
}

fn occurrences(count: u32) -> String {
    let results = (0..count)
        .map(|i| {
            json!({
                "key": 4_000_000_000u64 + u64::from(i),
                "scientificName": "Cyanocitta cristata (Linnaeus, 1758)",
                "eventDate": "1921-05-14",
                "recordedBy": "Fleming|Lloyd",
                "locality": "Toronto",
                "catalogNumber": format!("ROM-{i}"),
            })
        })
        .collect::<Vec<_>>();
    let end_of_records = count < PAGE_SIZE;
    json!({
        "offset": 0,
        "limit": PAGE_SIZE,
        "endOfRecords": end_of_records,
        "count": count,
        "results": results,
    })
    .to_string()
}

fn app<'a>(
    oracle: &'a MockOracle,
    gbif: &'a MockGbif,
    institution_key: Option<EntityKey>,
) -> App<&'a MockOracle, &'a MockGbif> {
    App::new(
        oracle,
        gbif,
        "https://api.gbif.org/v1",
        institution_key,
        Duration::from_secs(5),
    )
}

#[test]
fn blue_jays_from_toronto() {
    let oracle =
        MockOracle::new(r#"{"scientificName": "Cyanocitta cristata", "locality": "Toronto"}"#);
    let gbif = MockGbif::new(r#"{"results":[]}"#, occurrences(42));
    let app = app(&oracle, &gbif, None);

    let outcome = app
        .search("Blue Jays from Toronto", &SearchOptions::default(), &NoopSink)
        .unwrap();

    assert_eq!(
        outcome.fields.get(QueryKey::ScientificName),
        Some("Cyanocitta cristata")
    );
    assert!(outcome.url.ends_with(
        "?scientificName=Cyanocitta+cristata&locality=Toronto&limit=300&offset=0&basisOfRecord=PRESERVED_SPECIMEN"
    ));
    // no institution/collection text, so no lookups
    assert_eq!(gbif.urls(), vec![outcome.url.clone()]);
    assert_eq!(outcome.page.rows.len(), 42);
    assert!(!outcome.page.full);
    assert!(outcome.page.first);
    assert!(!outcome.page.has_next());
    assert_eq!(outcome.page.rows[0].collectors, vec!["Fleming", "Lloyd"]);
    assert!(
        oracle.prompts.lock().unwrap()[0].contains("Blue Jays from Toronto")
    );
}

#[test]
fn full_page_then_next_page() {
    let oracle = MockOracle::new(r#"{"scientificName": "Passer domesticus"}"#);
    let gbif = MockGbif::new(r#"{"results":[]}"#, occurrences(PAGE_SIZE));
    let app = app(&oracle, &gbif, None);

    let outcome = app
        .search("house sparrows", &SearchOptions::default(), &NoopSink)
        .unwrap();
    assert!(outcome.page.full);
    assert!(outcome.page.has_next());
    assert!(!outcome.page.has_previous());

    let next = outcome.request.next_page().unwrap();
    let page = app.page(&next, &NoopSink).unwrap();
    assert_eq!(page.offset, 300);
    assert!(page.has_previous());
    assert!(app.url(&next).contains("&offset=300&"));
    // the oracle is asked once; navigation reuses the translated fields
    assert_eq!(oracle.prompts.lock().unwrap().len(), 1);
}

#[test]
fn stored_request_pages_without_the_oracle() {
    let oracle = MockOracle::new(r#"{"scientificName": "Bombus", "institution": "Bishop Museum"}"#);
    let gbif = MockGbif::new(r#"{"results":[{"key":"bishop-guid"}]}"#, occurrences(PAGE_SIZE));
    let app = app(&oracle, &gbif, None);
    let outcome = app
        .search("Bombus at Bishop Museum", &SearchOptions::default(), &NoopSink)
        .unwrap();
    let stored = serde_json::to_string(&outcome.request).unwrap();

    // a later invocation only has the stored request and the search API
    let later = MockGbif::new("unused", occurrences(PAGE_SIZE));
    let pager = Pager::new(&later, "https://api.gbif.org/v1", Duration::from_secs(5));
    let request = SearchRequest::from_json(&stored).unwrap();
    let next = pager.turn(&request, PageTurn::Next, &NoopSink).unwrap();

    assert_eq!(next.request.offset(), 300);
    assert_eq!(next.page.offset, 300);
    assert_eq!(
        next.url,
        outcome.url.replace("&offset=0&", "&offset=300&")
    );
    assert_eq!(later.urls(), vec![next.url.clone()]);
    assert!(!later.urls()[0].contains("/grscicoll/"));
    assert_eq!(oracle.prompts.lock().unwrap().len(), 1);

    let back = pager
        .turn(&next.request, PageTurn::Previous, &NoopSink)
        .unwrap();
    assert_eq!(back.url, outcome.url);
    let err = pager
        .turn(&back.request, PageTurn::Previous, &NoopSink)
        .unwrap_err();
    assert_matches!(err, SearchError::NoSuchPage("previous"));
}

#[test]
fn unknown_institution_is_dropped() {
    let oracle = MockOracle::new(
        r#"{"scientificName": "Bombus", "institution": "Museum of Nowhere In Particular"}"#,
    );
    let gbif = MockGbif::new(r#"{"offset":0,"count":0,"results":[]}"#, occurrences(3));
    let app = app(&oracle, &gbif, None);

    let outcome = app
        .search(
            "bumblebees at the Museum of Nowhere In Particular",
            &SearchOptions::default(),
            &NoopSink,
        )
        .unwrap();

    assert!(outcome.request.resolved().institution.is_none());
    assert!(!outcome.url.contains("institutionKey"));
    assert!(!outcome.url.contains("institution="));
    assert!(!outcome.url.contains("Nowhere"));
    assert_eq!(gbif.urls().len(), 2);
    assert_eq!(outcome.page.rows.len(), 3);
}

#[test]
fn resolved_institution_and_configured_override() {
    let oracle = MockOracle::new(r#"{"scientificName": "Bombus", "institution": "Bishop Museum"}"#);
    let gbif = MockGbif::new(r#"{"results":[{"key":"bishop-guid"}]}"#, occurrences(1));
    let app = app(&oracle, &gbif, Some(EntityKey::new("configured-guid")));

    let options = SearchOptions {
        institution_code: Some("BBM".to_string()),
        collection_code: Some("CTC".to_string()),
        offset: 0,
    };
    let outcome = app.search("Bombus at Bishop Museum", &options, &NoopSink).unwrap();

    assert!(outcome.url.contains("institutionKey=bishop-guid"));
    assert!(outcome.url.contains("institutionKey=configured-guid"));
    assert!(outcome.url.ends_with("&institutionCode=BBM&collectionCode=CTC"));
}

#[test]
fn empty_result_is_a_notice_not_an_error() {
    let oracle = MockOracle::new(r#"{"scientificName": "Dodo nonexistens"}"#);
    let gbif = MockGbif::new(r#"{"results":[]}"#, occurrences(0));
    let app = app(&oracle, &gbif, None);

    let outcome = app
        .search("dodos", &SearchOptions::default(), &NoopSink)
        .unwrap();

    assert!(outcome.page.is_empty());
    assert!(!outcome.page.full);
    assert_eq!(outcome.page.notice(), Some(NO_RESULTS_NOTICE));
}

#[test]
fn malformed_translation_stops_before_any_request() {
    let oracle = MockOracle::new("I think you mean blue jays in Toronto!");
    let gbif = MockGbif::new(r#"{"results":[]}"#, occurrences(1));
    let app = app(&oracle, &gbif, None);

    let err = app
        .search("Blue Jays from Toronto", &SearchOptions::default(), &NoopSink)
        .unwrap_err();

    assert_matches!(err, SearchError::Translation(_));
    assert!(err.is_client_input());
    assert!(gbif.urls().is_empty());
}

#[test]
fn blank_query_is_rejected() {
    let oracle = MockOracle::new("{}");
    let gbif = MockGbif::new(r#"{"results":[]}"#, occurrences(1));
    let app = app(&oracle, &gbif, None);

    let err = app
        .search("   ", &SearchOptions::default(), &NoopSink)
        .unwrap_err();

    assert_matches!(err, SearchError::EmptyQuery);
    assert!(oracle.prompts.lock().unwrap().is_empty());
}
