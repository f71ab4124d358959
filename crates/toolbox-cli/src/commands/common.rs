use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use toolbox_core::cache::{FileStorage, LocalCache};
use toolbox_core::config::ToolboxConfig;
use toolbox_core::remote::LibSqlDocumentStore;
use toolbox_core::sync::SyncReport;
use toolbox_core::SessionManager;

use crate::auth::CliIdentity;
use crate::error::CliError;
use crate::paths::{default_config_path, profile_data_dir, resolve_profile_name};

pub type CliSession = SessionManager<CliIdentity, LibSqlDocumentStore>;

pub fn load_config(path: Option<&Path>) -> Result<ToolboxConfig, CliError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    Ok(ToolboxConfig::load_from_path(path)?.with_env_overrides())
}

/// Open the profile's cache and document store and restore its session.
pub async fn open_session(
    config_path: Option<&Path>,
    profile: Option<&str>,
) -> Result<CliSession, CliError> {
    let config = load_config(config_path)?;
    let profile = resolve_profile_name(profile);
    let data_dir = profile_data_dir(&profile)?;

    let storage = FileStorage::open(config.cache_path_in(&data_dir))?;
    let cache = LocalCache::new(Arc::new(storage));
    let documents = open_documents(&config, &data_dir).await?;
    let identity = CliIdentity::from_config(&config, &profile)?;

    let session = SessionManager::new(
        identity,
        Arc::new(documents),
        cache,
        config.session_options(),
    );
    session.start().await;
    Ok(session)
}

async fn open_documents(
    config: &ToolboxConfig,
    data_dir: &Path,
) -> Result<LibSqlDocumentStore, CliError> {
    let path = config.database_path_in(data_dir);
    match config.replica()? {
        Some(sync_config) => {
            tracing::debug!("Opening replicated document store at {}", path.display());
            Ok(LibSqlDocumentStore::open_with_sync(path, sync_config).await?)
        }
        None => Ok(LibSqlDocumentStore::open(path).await?),
    }
}

pub fn require_signed_in(session: &CliSession) -> Result<(), CliError> {
    if session.state().read(|store| store.is_logged_in()) {
        Ok(())
    } else {
        Err(CliError::NotSignedIn)
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print one line per data type and fail when any type failed.
pub fn report_outcome(action: &str, report: &SyncReport) -> Result<(), CliError> {
    for (data_type, ok) in report.outcomes() {
        let status = if *ok { "ok" } else { "failed" };
        println!("{action} {data_type}: {status}");
    }
    let failed = report
        .failed()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::SyncFailed(failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbox_core::DataType;

    #[test]
    fn failed_types_turn_into_an_error() {
        let report: SyncReport = [(DataType::Preferences, true), (DataType::Links, false)]
            .into_iter()
            .collect();
        let error = report_outcome("push", &report).unwrap_err();
        assert_eq!(error.to_string(), "Sync failed for: links");

        let report: SyncReport = [(DataType::Preferences, true)].into_iter().collect();
        assert!(report_outcome("push", &report).is_ok());
    }
}
