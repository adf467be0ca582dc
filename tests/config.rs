use std::time::Duration;

use assert_matches::assert_matches;

use gbif_nl_search::config::ConfigLoader;
use gbif_nl_search::error::SearchError;

#[test]
fn load_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("gbif-nl.json");
    std::fs::write(
        &path,
        r#"{
            "timeout_secs": 10,
            "retry": {"max_retries": 5, "base_delay": 500, "jitter": 250}
        }"#,
    )
    .unwrap();

    let settings = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(settings.timeout, Duration::from_secs(10));
    assert_eq!(settings.retry.max_retries, 5);
    assert_eq!(settings.retry.base_delay, Duration::from_millis(500));
    assert_eq!(settings.retry.jitter, Duration::from_millis(250));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, SearchError::ConfigRead(_));
}

#[test]
fn broken_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("gbif-nl.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, SearchError::ConfigParse(_));
}
