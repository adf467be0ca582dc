//! Natural-language specimen search over the GBIF occurrence API.
//!
//! A query flows through [`translate`] (language model to structured fields),
//! [`resolve`] (institution/collection names to GUIDs), [`search`] (canonical
//! URL) and [`page`] (resilient fetch and normalization via [`fetch`]).

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod output;
pub mod page;
pub mod resolve;
pub mod retry;
pub mod search;
pub mod translate;
