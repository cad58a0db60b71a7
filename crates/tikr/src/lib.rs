#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Statements pipeline for the TIKR data provider.
//!
//! This crate re-exports the core types, the credential stores, the provider
//! client and the report exporter, and ties them together in a [`Pipeline`]
//! that runs one ticker (or a batch) from resolution to a written workbook.
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance as the secondary quote source

// Core types and traits
pub use tikr_core::*;

// Credentials
pub use tikr_auth::{
    CredentialState, FileTokenStore, InMemoryTokenStore, NoopTokenStore, TokenProvider, store_for,
};

// Provider client
pub use tikr_api::{
    CompanyResolver, Normalized, RawPayload, RawQuote, RawStatement, StatementFetcher, TikrClient,
    align_statements, denormalize, normalize, normalize_quote,
};

// Report
pub use tikr_report::{
    BindingMode, CellValue, MarketData, Report, ReportExporter, SalesToCapital, Sheet,
    SheetContent, TemplateBinder, TemplateCell,
};

// Quote sources
#[cfg(feature = "yahoo")]
pub use tikr_yahoo::YahooQuoteSource;

mod enrich;
mod pipeline;
/// Logging setup.
pub mod telemetry;

pub use enrich::MarketDataEnricher;
pub use pipeline::{Pipeline, RunOutcome};
