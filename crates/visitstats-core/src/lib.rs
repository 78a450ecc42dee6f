pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod period;
pub mod store;
