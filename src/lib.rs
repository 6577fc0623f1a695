//! rosterops — bulk scheduling operations engine.
//!
//! The core behind bulk shift mutations: conflict-aware expansion of
//! duplication/bulk-create requests, a chunked batch processor with bounded
//! concurrency and per-item retry, a bounded LRU template cache, and a
//! latency monitor with percentile stats. Persistence, HTTP, and auth live
//! in the surrounding service — this crate only talks to them through the
//! collaborator traits in [`engine`].

pub mod audit;
pub mod cache;
pub mod engine;
pub mod limits;
pub mod model;
pub mod monitor;
pub mod observability;
