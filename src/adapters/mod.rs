//! Adapters Layer
//!
//! Port implementations backed by reqwest.

pub mod outbound;
