use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::{EntityKey, EntityKind, QueryFields, QueryKey};
use crate::fetch::Fetcher;

/// GUIDs found for the institution/collection names of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedIdentifiers {
    pub institution: Option<EntityKey>,
    pub collection: Option<EntityKey>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    key: Option<String>,
}

/// Maps institution and collection names to GUIDs through the GRSciColl
/// search endpoints. The first search hit wins; nothing is ranked.
pub struct EntityResolver<F: Fetcher> {
    fetcher: F,
    api_base: String,
    timeout: Duration,
}

impl<F: Fetcher> EntityResolver<F> {
    pub fn new(fetcher: F, api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fetcher,
            api_base: api_base.into(),
            timeout,
        }
    }

    pub fn lookup_url(&self, kind: EntityKind, name: &str) -> Option<String> {
        let base = format!(
            "{}/grscicoll/{}/search",
            self.api_base.trim_end_matches('/'),
            kind.path_segment()
        );
        let mut url = Url::parse(&base).ok()?;
        url.query_pairs_mut().append_pair("q", name.trim());
        Some(url.to_string())
    }

    /// Best effort: blank names, failed requests and odd responses all give `None`.
    pub fn resolve(&self, kind: EntityKind, name: &str) -> Option<EntityKey> {
        if name.trim().is_empty() {
            return None;
        }
        let url = self.lookup_url(kind, name)?;
        let body = match self.fetcher.fetch(&url, self.timeout) {
            Ok(body) => body,
            Err(err) => {
                warn!(%kind, name, error = %err, "identifier lookup failed");
                return None;
            }
        };
        let key = first_key(&body);
        debug!(%kind, name, key = ?key, "identifier lookup");
        key
    }

    /// Resolves whichever of the institution/collection names are present.
    pub fn resolve_fields(&self, fields: &QueryFields) -> ResolvedIdentifiers {
        ResolvedIdentifiers {
            institution: fields
                .get(QueryKey::Institution)
                .and_then(|name| self.resolve(EntityKind::Institution, name)),
            collection: fields
                .get(QueryKey::Collection)
                .and_then(|name| self.resolve(EntityKind::Collection, name)),
        }
    }
}

fn first_key(body: &str) -> Option<EntityKey> {
    let response: LookupResponse = serde_json::from_str(body).ok()?;
    response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.key)
        .filter(|key| !key.trim().is_empty())
        .map(EntityKey::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_result_wins() {
        let body = r#"{"results":[{"key":"aaa-111","name":"First"},{"key":"bbb-222"}]}"#;
        assert_eq!(first_key(body), Some(EntityKey::new("aaa-111")));
    }

    #[test]
    fn empty_or_malformed_bodies_resolve_to_none() {
        assert_eq!(first_key(r#"{"results":[]}"#), None);
        assert_eq!(first_key(r#"{"count":0}"#), None);
        assert_eq!(first_key("<html>oops</html>"), None);
        assert_eq!(first_key(r#"{"results":[{"name":"no key"}]}"#), None);
    }
}
