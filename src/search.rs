use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::domain::{EntityKey, PAGE_SIZE, QueryFields};
use crate::error::SearchError;
use crate::resolve::ResolvedIdentifiers;

pub const BASIS_OF_RECORD: &str = "PRESERVED_SPECIMEN";

/// Everything needed to ask for one page of occurrences. Navigation produces
/// a new request; an existing one is never changed.
///
/// The serialized form can be stored and read back to move between pages
/// without interpreting the query again. Reading it back applies the same
/// checks as [`SearchRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRequest")]
pub struct SearchRequest {
    fields: QueryFields,
    resolved: ResolvedIdentifiers,
    institution_key_override: Option<EntityKey>,
    institution_code: Option<String>,
    collection_code: Option<String>,
    offset: u32,
}

impl SearchRequest {
    /// Institution/collection names in `fields` are discarded; only the
    /// identifiers in `resolved` narrow the search.
    pub fn new(
        fields: &QueryFields,
        resolved: ResolvedIdentifiers,
        institution_key_override: Option<EntityKey>,
        institution_code: Option<&str>,
        collection_code: Option<&str>,
        offset: u32,
    ) -> Result<Self, SearchError> {
        if offset % PAGE_SIZE != 0 {
            return Err(SearchError::InvalidOffset(offset));
        }
        Ok(Self {
            fields: fields.without_entity_names(),
            resolved,
            institution_key_override: institution_key_override
                .filter(|key| !key.as_str().trim().is_empty()),
            institution_code: non_blank(institution_code),
            collection_code: non_blank(collection_code),
            offset,
        })
    }

    pub fn fields(&self) -> &QueryFields {
        &self.fields
    }

    pub fn resolved(&self) -> &ResolvedIdentifiers {
        &self.resolved
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_first_page(&self) -> bool {
        self.offset == 0
    }

    pub fn at_offset(&self, offset: u32) -> Result<Self, SearchError> {
        if offset % PAGE_SIZE != 0 {
            return Err(SearchError::InvalidOffset(offset));
        }
        Ok(Self {
            offset,
            ..self.clone()
        })
    }

    /// `None` when the next offset does not fit.
    pub fn next_page(&self) -> Option<Self> {
        let offset = self.offset.checked_add(PAGE_SIZE)?;
        Some(Self {
            offset,
            ..self.clone()
        })
    }

    /// `None` on the first page.
    pub fn previous_page(&self) -> Option<Self> {
        if self.offset == 0 {
            return None;
        }
        Some(Self {
            offset: self.offset - PAGE_SIZE,
            ..self.clone()
        })
    }

    /// Query string in a fixed parameter order.
    pub fn query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.fields.iter() {
            query.append_pair(key.as_str(), value);
        }
        if let Some(key) = &self.resolved.institution {
            query.append_pair("institutionKey", key.as_str());
        }
        if let Some(key) = &self.resolved.collection {
            query.append_pair("collectionKey", key.as_str());
        }
        query
            .append_pair("limit", &PAGE_SIZE.to_string())
            .append_pair("offset", &self.offset.to_string())
            .append_pair("basisOfRecord", BASIS_OF_RECORD);
        if let Some(key) = &self.institution_key_override {
            if self.resolved.institution.as_ref() != Some(key) {
                query.append_pair("institutionKey", key.as_str());
            }
        }
        if let Some(code) = &self.institution_code {
            query.append_pair("institutionCode", code);
        }
        if let Some(code) = &self.collection_code {
            query.append_pair("collectionCode", code);
        }
        query.finish()
    }
}

impl SearchRequest {
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        serde_json::from_str(json).map_err(|err| SearchError::InvalidRequest(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SearchError> {
        serde_json::to_string(self).map_err(|err| SearchError::InvalidRequest(err.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoredRequest {
    fields: QueryFields,
    resolved: ResolvedIdentifiers,
    institution_key_override: Option<EntityKey>,
    institution_code: Option<String>,
    collection_code: Option<String>,
    offset: u32,
}

impl TryFrom<StoredRequest> for SearchRequest {
    type Error = SearchError;

    fn try_from(stored: StoredRequest) -> Result<Self, Self::Error> {
        SearchRequest::new(
            &stored.fields,
            stored.resolved,
            stored.institution_key_override,
            stored.institution_code.as_deref(),
            stored.collection_code.as_deref(),
            stored.offset,
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Turns a [`SearchRequest`] into the occurrence search URL.
#[derive(Debug, Clone)]
pub struct SearchUrlBuilder {
    endpoint: String,
}

impl SearchUrlBuilder {
    pub fn new(api_base: &str) -> Self {
        Self {
            endpoint: format!("{}/occurrence/search", api_base.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build(&self, request: &SearchRequest) -> String {
        format!("{}?{}", self.endpoint, request.query_string())
    }
}
