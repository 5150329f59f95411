use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use crate::sync::EventSink;

/// Dispatches one request. Handlers that stream progress write it to
/// `events` before returning their final response.
pub fn handle_request(
    state: &mut AppState,
    req: Request,
    events: &mut dyn EventSink,
) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sync::try_handle(state, &req, events) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
