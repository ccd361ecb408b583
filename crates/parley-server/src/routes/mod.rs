//! API routes.

pub mod health;
pub mod sessions;
pub mod ws;

pub use health::health_routes;
pub use sessions::{
    IssueSessionRequest, ListSessionsResponse, SessionResponse, delete_all_sessions_handler,
    delete_session_handler, issue_session_handler, list_sessions_handler, renew_session_handler,
    validate_session_handler,
};
pub use ws::{Admission, HandshakeError, HandshakeParams, ServerMessage, admit, ws_handler};
