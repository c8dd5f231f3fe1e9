//! HTTP route handlers
//!
//! One router per surface, each with its own state struct:
//! - `search` - POST /search, the ranking pipeline
//! - `feedback` - POST /feedback/{output_id}, GET /feedback/{output_id}/stats
//! - `health` - liveness and readiness probes

mod feedback;
mod health;
mod search;

pub use feedback::{feedback_router, FeedbackState};
pub use health::{health_router, HealthState};
pub use search::{search_router, SearchState};
