//! toolbox-core - Core library for Toolbox
//!
//! This crate contains the sync core shared by every Toolbox front end: the
//! local cache adapter, the remote document store abstraction, the sync
//! gateway and controller, and the session-scoped application state.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use models::{DataType, LinkItem, Preferences};
pub use session::SessionManager;
