//! Hardware price oracle
//!
//! Continuously fuses marketplace listings for a fixed catalog of GPU and
//! DDR5 assets (plus cloud GPU rental rates) into canonical price feeds,
//! and serves them over HTTP as convenience JSON and an oracle-adapter
//! envelope.

pub mod adapters;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod history;
pub mod rental;
pub mod scheduler;
pub mod server;
pub mod strategies;
pub mod twap;
pub mod types;
