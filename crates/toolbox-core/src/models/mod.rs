//! Data models for Toolbox

mod data_type;
mod identity;
mod link;
mod preferences;
mod sync_status;

pub use data_type::DataType;
pub use identity::{Identity, ProfileUpdate};
pub use link::{LinkCollection, LinkItem, LINKS_FIELD};
pub use preferences::{PreferenceKey, PreferenceUpdate, Preferences, ThemeColor};
pub use sync_status::SyncStatus;
