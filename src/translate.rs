use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{QueryFields, QueryKey};
use crate::error::SearchError;

/// Opaque text-to-text service. One request, one response, no retries.
pub trait Oracle: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, SearchError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn complete(&self, prompt: &str) -> Result<String, SearchError> {
        (**self).complete(prompt)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsOracle {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatCompletionsOracle {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbif-nl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SearchError::OracleHttp(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| SearchError::InvalidSetting("API key is not a valid header".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SearchError::OracleHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }
}

impl Oracle for ChatCompletionsOracle {
    fn complete(&self, prompt: &str) -> Result<String, SearchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| SearchError::OracleHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "language model request failed".to_string());
            return Err(SearchError::OracleStatus { status, message });
        }
        let parsed: ChatResponse = response
            .json()
            .map_err(|err| SearchError::Translation(format!("unreadable model response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SearchError::Translation("model returned no content".to_string()))
    }
}

pub struct QueryTranslator<O: Oracle> {
    oracle: O,
}

impl<O: Oracle> QueryTranslator<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    pub fn translate(&self, user_text: &str) -> Result<QueryFields, SearchError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let raw = self.oracle.complete(&build_prompt(text))?;
        debug!(raw = %raw, "model output");
        parse_fields(&raw)
    }
}

pub fn build_prompt(user_text: &str) -> String {
    format!(
        r#"You convert natural language specimen searches into Global Biodiversity Information Facility (GBIF) occurrence search fields.

Extract the taxon (scientificName), location (locality), continent (continent), country (country), state or province (stateProvince), collector (recordedBy), collection date (eventDate), collector number (recordNumber), media type (mediaType), institution name (institution) and collection name (collection) from this query: '{user_text}'.

Return a single JSON object whose keys are only the following, and only when mentioned:
    "scientificName", "locality", "continent", "country", "stateProvince", "recordedBy", "eventDate", "recordNumber", "mediaType", "institution", "collection"

Rules:
    - Output valid JSON only, with string values and no other text.
    - Use "locality" only for geographic places such as lakes, cities and landmarks. Never put an institution or collection there.
    - Use "recordedBy" only for names of people.
    - Put the name of a collection in "collection" and the name of an institution in "institution", as written by the user.
    - If there is a range, separate the two values with a comma.
    - If a country is given, use its two letter ISO code in capital letters.
    - If a common name is given, such as "Sparrow", use the scientific name that best fits it."#
    )
}

/// Parses model output into [`QueryFields`]. Unknown keys are dropped.
pub fn parse_fields(raw: &str) -> Result<QueryFields, SearchError> {
    let payload = strip_code_fence(raw);
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| SearchError::Translation(format!("model output is not JSON: {err}")))?;
    let Value::Object(map) = value else {
        return Err(SearchError::Translation(
            "model output is not a JSON object".to_string(),
        ));
    };

    let mut fields = QueryFields::new();
    let mut recognized = 0usize;
    let mut unrecognized = Vec::new();
    for (name, value) in map {
        let key = match name.parse::<QueryKey>() {
            Ok(key) => key,
            Err(_) => {
                warn!(key = %name, "dropping unrecognized field");
                unrecognized.push(name);
                continue;
            }
        };
        recognized += 1;
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            other => {
                return Err(SearchError::Translation(format!(
                    "field {key} has non-text value {other}"
                )));
            }
        };
        if !fields.insert(key, &text) && !text.trim().is_empty() {
            warn!(%key, value = %text, "dropping unusable value");
        }
    }

    if recognized == 0 {
        return Err(SearchError::Translation(format!(
            "model output has no recognized search keys (got: {})",
            if unrecognized.is_empty() {
                "an empty object".to_string()
            } else {
                unrecognized.join(", ")
            }
        )));
    }
    if fields.is_empty() {
        return Err(SearchError::Translation(
            "model output has no usable values for its search keys".to_string(),
        ));
    }
    Ok(fields)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop the language tag line, e.g. ```json
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}
