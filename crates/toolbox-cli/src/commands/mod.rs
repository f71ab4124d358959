mod auth_cmd;
mod common;
mod links;
mod prefs;
mod sync;

pub use auth_cmd::run_auth;
pub use common::open_session;
pub use links::run_links;
pub use prefs::run_prefs;
pub use sync::run_sync;
