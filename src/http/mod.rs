//! HTTP API for driving the recording controller from the dashboard
//!
//! - POST /recordings/start - Start a session for a meeting
//! - POST /recordings/stop - Stop and wait for finalization
//! - GET /recordings/status - Query controller status
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
