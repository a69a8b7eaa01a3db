// HTTP API routes
//
// Each submodule handles a specific resource type with its own AppState.

pub mod areas;
pub mod common;
pub mod places;
pub mod queues;

// Re-export common types
pub use common::{ErrorResponse, ListResponse};
