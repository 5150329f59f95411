mod error;
mod handlers;
mod notify;
mod router;
mod types;

pub use notify::Notifier;
pub use router::handle_request;
pub use types::{AppState, Request};
