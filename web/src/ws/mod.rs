//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the Axum upgrade handler. The hub itself
//! (coordinator, client loops, envelope type) lives in the `hub` crate.

pub mod handler;
