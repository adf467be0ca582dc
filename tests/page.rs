use std::fs;

use gbif_nl_search::page::parse_page;

#[test]
fn normalize_occurrence_fixture() {
    let body = fs::read_to_string("tests/fixtures/occurrence_search.json").unwrap();
    let page = parse_page(&body, 0).unwrap();

    assert_eq!(page.rows.len(), 2);
    assert!(!page.full);
    assert!(page.first);
    assert_eq!(page.total, Some(2));
    assert_eq!(page.end_of_records, Some(true));
    assert_eq!(page.notice(), None);

    let first = &page.rows[0];
    assert_eq!(
        first.link.as_deref(),
        Some("https://gbif.org/occurrence/1928374650")
    );
    assert_eq!(first.collectors, vec!["Smith", "Jones"]);
    assert_eq!(first.catalog_number.as_deref(), Some("ROM-O-104233"));
    assert_eq!(
        first.media_url.as_deref(),
        Some("https://images.example.org/rom/104233-a.jpg")
    );
    assert_eq!(first.media_label.as_deref(), Some("View image (2)"));
    assert_eq!(first.media_links.len(), 2);

    let second = &page.rows[1];
    assert!(second.collectors.is_empty());
    assert_eq!(second.media_url, None);
    assert_eq!(second.media_label, None);
}

#[test]
fn projection_toggle() {
    let body = fs::read_to_string("tests/fixtures/occurrence_search.json").unwrap();
    let page = parse_page(&body, 0).unwrap();

    let minimal = page.table(true);
    let columns = minimal[0].keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(
        columns,
        vec![
            "link",
            "catalogNumber",
            "scientificName",
            "eventDate",
            "recordedBy",
            "locality",
            "mediaUrl",
        ]
    );
    assert_eq!(minimal[0]["recordedBy"], serde_json::json!(["Smith", "Jones"]));

    let full = page.table(false);
    assert_eq!(full[0]["countryCode"], "CA");
    assert_eq!(full[0]["mediaLabel"], "View image (2)");
    assert!(full[0].get("key").is_none());
    let full_columns = full[0].keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(&full_columns[..3], &["link", "datasetKey", "basisOfRecord"]);
}
