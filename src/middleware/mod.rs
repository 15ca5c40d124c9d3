//! Middleware modules for the verification engine
//!
//! Provides request/response logging middleware.

pub mod logging;
