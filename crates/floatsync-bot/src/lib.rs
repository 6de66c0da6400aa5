//! floatsync: marketplace sales to Steam trade offers.
//!
//! Wires the marketplace client, the Steam web client, the offer watcher and
//! the reconciler together:
//! - Web session check (fatal if the cookies are not logged in)
//! - Reconciler actor, offer watcher and market poller tasks
//! - Ctrl-C shutdown

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
