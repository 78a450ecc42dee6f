//! Batch aggregation of raw visitor events into page and visitor rollups,
//! the dashboard read API over those rollups, retention and backfill.
//!
//! The engine owns no clock: every operation takes the dates it works on,
//! and scheduling lives in the `visitstats-scheduler` crate.

use std::sync::Arc;

use visitstats_core::store::{AggregateStore, EventStore};

pub mod backfill;
pub mod dashboard;
pub mod day;
pub mod error;
pub mod page;
pub mod report;
pub mod retention;
pub mod rollup;
mod snapshot;
pub mod visitor;

pub use error::{EngineError, EngineResult};

pub struct Engine {
    pub(crate) events: Arc<dyn EventStore>,
    pub(crate) aggregates: Arc<dyn AggregateStore>,
}

impl Engine {
    pub fn new(events: Arc<dyn EventStore>, aggregates: Arc<dyn AggregateStore>) -> Self {
        Self { events, aggregates }
    }

    /// Build an engine whose event and aggregate stores are the same backend.
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: EventStore + AggregateStore,
    {
        let events: Arc<dyn EventStore> = backend.clone();
        let aggregates: Arc<dyn AggregateStore> = backend;
        Self { events, aggregates }
    }
}
