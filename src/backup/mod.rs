//! Backup reconciliation: state machine, handlers and their collaborators
pub mod backoff;
pub mod client;
pub mod errors;
pub mod events;
mod finalizer;
pub mod handler;
pub mod http_client;
pub mod item;
pub mod locks;
pub mod refresher;
pub mod state;
mod states;
pub mod status;
pub mod store;

pub use handler::{Handler, HandlerConfig, Outcome};
