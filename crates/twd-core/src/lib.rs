pub mod config;
pub mod logging;

pub mod catalog;
pub mod control;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod history;
pub mod locks;
pub mod notify;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod transfer;
pub mod url_model;
pub mod watcher;

pub use error::WatchError;
pub use watcher::{Collaborators, Watcher};
