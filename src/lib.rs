//! Two-phase payment verification engine.
//!
//! A `FastPoller` checks each freshly started transaction every few
//! seconds for the first part of its window, then hands off to a single
//! engine-wide `SlowSweeper` that batches the rest at a coarser interval,
//! with a companion `ExpirySweeper` closing out anything that never
//! clears. See [`engine::VerificationEngine`] for the public surface.

pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod http_api;
pub mod logging;
pub mod middleware;
pub mod notify;
pub mod provider;
pub mod store;

pub use config::EngineConfig;
pub use engine::VerificationEngine;
pub use error::EngineError;
