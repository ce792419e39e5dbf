//! HTTP control API for the user-facing controls
//!
//! - GET /health - Health check
//! - GET /session/status - Session status and statistics
//! - POST /session/toggle - Start the session, or stop it if connected
//! - GET /history - Recent conversation turns
//! - DELETE /history?confirm=true - Clear history (confirmation required)

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
