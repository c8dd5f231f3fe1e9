//! Shared test utilities for the Setlist workspace
//!
//! Mock servers for the external inference endpoints, so tests never
//! need a real provider.

mod inference;

pub use inference::{MockEmbeddingServer, MockRerankServer};
