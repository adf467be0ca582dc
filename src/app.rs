use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::{EntityKey, EntityKind, QueryFields};
use crate::error::SearchError;
use crate::fetch::Fetcher;
use crate::page::{PageAssembler, ResultPage};
use crate::resolve::EntityResolver;
use crate::search::{SearchRequest, SearchUrlBuilder};
use crate::translate::{Oracle, QueryTranslator};

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub institution_code: Option<String>,
    pub collection_code: Option<String>,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub fields: QueryFields,
    pub request: SearchRequest,
    pub url: String,
    pub page: ResultPage,
}

/// A page fetched for an already built request.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutcome {
    pub request: SearchRequest,
    pub url: String,
    pub page: ResultPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Stay,
    Next,
    Previous,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs one query through translate, resolve, build and fetch, strictly in
/// that order. Holds no state between calls.
pub struct App<O: Oracle, F: Fetcher> {
    translator: QueryTranslator<O>,
    fetcher: F,
    builder: SearchUrlBuilder,
    api_base: String,
    institution_key: Option<EntityKey>,
    timeout: Duration,
}

impl<O: Oracle, F: Fetcher> App<O, F> {
    pub fn new(
        oracle: O,
        fetcher: F,
        api_base: &str,
        institution_key: Option<EntityKey>,
        timeout: Duration,
    ) -> Self {
        Self {
            translator: QueryTranslator::new(oracle),
            fetcher,
            builder: SearchUrlBuilder::new(api_base),
            api_base: api_base.to_string(),
            institution_key,
            timeout,
        }
    }

    pub fn translate(
        &self,
        user_text: &str,
        sink: &dyn ProgressSink,
    ) -> Result<QueryFields, SearchError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: "phase=Translate; interpreting query".to_string(),
            elapsed: None,
        });
        let fields = self.translator.translate(user_text)?;
        sink.event(ProgressEvent {
            message: format!("phase=Translate; {} field(s)", fields.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(fields)
    }

    pub fn resolve(&self, kind: EntityKind, name: &str) -> Option<EntityKey> {
        self.resolver().resolve(kind, name)
    }

    /// Resolves entity names and builds the first request at `options.offset`.
    pub fn prepare(
        &self,
        fields: &QueryFields,
        options: &SearchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SearchRequest, SearchError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: "phase=Resolve; looking up institution/collection".to_string(),
            elapsed: None,
        });
        let resolved = self.resolver().resolve_fields(fields);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; institution={} collection={}",
                resolved.institution.is_some(),
                resolved.collection.is_some()
            ),
            elapsed: Some(started.elapsed()),
        });
        SearchRequest::new(
            fields,
            resolved,
            self.institution_key.clone(),
            options.institution_code.as_deref(),
            options.collection_code.as_deref(),
            options.offset,
        )
    }

    pub fn url(&self, request: &SearchRequest) -> String {
        self.builder.build(request)
    }

    pub fn page(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ResultPage, SearchError> {
        self.pager().page(request, sink)
    }

    pub fn turn(
        &self,
        request: &SearchRequest,
        turn: PageTurn,
        sink: &dyn ProgressSink,
    ) -> Result<PageOutcome, SearchError> {
        self.pager().turn(request, turn, sink)
    }

    pub fn search(
        &self,
        user_text: &str,
        options: &SearchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SearchOutcome, SearchError> {
        let fields = self.translate(user_text, sink)?;
        let request = self.prepare(&fields, options, sink)?;
        let url = self.url(&request);
        let page = self.page(&request, sink)?;
        Ok(SearchOutcome {
            fields,
            request,
            url,
            page,
        })
    }

    fn resolver(&self) -> EntityResolver<&F> {
        EntityResolver::new(&self.fetcher, self.api_base.as_str(), self.timeout)
    }

    fn pager(&self) -> Pager<&F> {
        Pager::new(&self.fetcher, self.api_base.as_str(), self.timeout)
    }
}

/// Moves between pages of a stored request. Talks only to the search API,
/// so no language model is needed.
pub struct Pager<F: Fetcher> {
    fetcher: F,
    builder: SearchUrlBuilder,
    timeout: Duration,
}

impl<F: Fetcher> Pager<F> {
    pub fn new(fetcher: F, api_base: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            builder: SearchUrlBuilder::new(api_base),
            timeout,
        }
    }

    pub fn page(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ResultPage, SearchError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; offset {}", request.offset()),
            elapsed: None,
        });
        let page = PageAssembler::new(&self.fetcher, self.timeout).fetch(&self.builder, request)?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} record(s)", page.rows.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(page)
    }

    /// Builds the neighbouring request and fetches its page. `request` itself
    /// is left as it was.
    pub fn turn(
        &self,
        request: &SearchRequest,
        turn: PageTurn,
        sink: &dyn ProgressSink,
    ) -> Result<PageOutcome, SearchError> {
        let request = match turn {
            PageTurn::Stay => request.clone(),
            PageTurn::Next => request.next_page().ok_or(SearchError::NoSuchPage("next"))?,
            PageTurn::Previous => request
                .previous_page()
                .ok_or(SearchError::NoSuchPage("previous"))?,
        };
        let url = self.builder.build(&request);
        let page = self.page(&request, sink)?;
        Ok(PageOutcome { request, url, page })
    }
}
