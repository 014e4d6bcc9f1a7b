use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::accounts::try_handle,
    handlers::students::try_handle,
    handlers::fees::try_handle,
    handlers::results::try_handle,
    handlers::notices::try_handle,
    handlers::subjects::try_handle,
    handlers::exams::try_handle,
    handlers::admit_cards::try_handle,
    handlers::documents::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
