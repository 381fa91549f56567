//! CLI command handlers.

mod request;
mod run;
pub(crate) mod status;

pub use request::run_request;
pub use run::run_daemon;
pub use status::run_status;
