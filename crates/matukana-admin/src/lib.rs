//! Matukana Admin
//!
//! Headless version of the admin dashboard: every collection the site editor
//! touches, kept in sync through a [`matukana_sync::Reconciler`], driven by a
//! line-oriented command protocol.

pub mod command;
pub mod config;
pub mod dashboard;
pub mod error;

pub use command::{Command, Response, USAGE};
pub use config::{load_seed, AdminConfig, DEFAULT_LOG_FILTER};
pub use dashboard::Dashboard;
pub use error::{Error, Result};
