//! progresslens-core: record model, filtering, scoring, and report
//! aggregation for teacher progress analytics.
//!
//! The store backends live in `progresslens-store`; everything here talks to
//! them through the [`store::RecordStore`] trait.

pub mod engine;
pub mod error;
pub mod filter;
pub mod live;
pub mod model;
pub mod record;
pub mod report;
pub mod scoring;
pub mod store;
