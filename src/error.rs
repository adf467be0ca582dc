use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("search text is empty")]
    #[diagnostic(help("describe the specimens you are looking for, e.g. \"Blue Jays from Toronto\""))]
    EmptyQuery,

    #[error("could not interpret the query: {0}")]
    #[diagnostic(help("rephrase the query and try again"))]
    Translation(String),

    #[error("language model request failed: {0}")]
    OracleHttp(String),

    #[error("language model returned status {status}: {message}")]
    OracleStatus { status: u16, message: String },

    #[error("GBIF rejected the request with status {status}: {body}")]
    #[diagnostic(help("check the search parameters; repeating the same request will not help"))]
    FetchStatus { status: u16, body: String },

    #[error("GBIF request failed after {attempts} attempts: {message}")]
    #[diagnostic(help("the service may be temporarily unavailable, try again later"))]
    FetchExhausted { attempts: u32, message: String },

    #[error("GBIF request failed: {0}")]
    FetchFailed(String),

    #[error("unexpected GBIF response: {0}")]
    Decode(String),

    #[error("page offset {0} is not a multiple of the page size")]
    InvalidOffset(u32),

    #[error("invalid stored search request: {0}")]
    #[diagnostic(help("pass the request printed by `gbif-nl --non-interactive search`"))]
    InvalidRequest(String),

    #[error("there is no {0} page")]
    NoSuchPage(&'static str),

    #[error("missing language model API key (set GBIF_CHAT_OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

impl SearchError {
    /// Failures worth retrying later without changing anything.
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            SearchError::FetchExhausted { .. }
                | SearchError::OracleHttp(_)
                | SearchError::FetchFailed(_)
        ) || matches!(self, SearchError::OracleStatus { status, .. } if *status >= 500)
    }

    /// Failures that need different input from the user.
    pub fn is_client_input(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyQuery
                | SearchError::Translation(_)
                | SearchError::FetchStatus { .. }
                | SearchError::InvalidOffset(_)
                | SearchError::InvalidRequest(_)
                | SearchError::NoSuchPage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable() {
        let err = SearchError::FetchStatus {
            status: 400,
            body: "bad country".to_string(),
        };
        assert!(err.is_client_input());
        assert!(!err.is_retryable_later());
    }

    #[test]
    fn exhausted_fetch_is_retryable_later() {
        let err = SearchError::FetchExhausted {
            attempts: 4,
            message: "status 503".to_string(),
        };
        assert!(err.is_retryable_later());
        assert!(!err.is_client_input());
    }
}
