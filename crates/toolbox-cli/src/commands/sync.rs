use toolbox_core::DataType;

use crate::cli::{DataTypeArg, SyncCommands};
use crate::commands::common::{print_json, report_outcome, require_signed_in, CliSession};
use crate::error::CliError;

pub async fn run_sync(command: SyncCommands, session: &CliSession) -> Result<(), CliError> {
    match command {
        SyncCommands::Status { json } => {
            let status = session.snapshot().sync_status;
            if json {
                return print_json(&status);
            }
            println!("Sync: {}", if status.enabled { "on" } else { "off" });
            match status.last_synced_at {
                Some(at) => println!("Last synced: {}", format_timestamp(at)),
                None => println!("Last synced: never"),
            }
            if status.has_pending_changes {
                let pending = status
                    .pending
                    .iter()
                    .map(DataType::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("Pending: {pending}");
            }
        }
        SyncCommands::Now { data_type } => {
            require_signed_in(session)?;
            let data_type = to_data_type(data_type);
            if !session.sync_now(&data_type).await {
                return Err(CliError::SyncFailed(data_type.to_string()));
            }
            println!("push {data_type}: ok");
        }
        SyncCommands::All => {
            require_signed_in(session)?;
            if let Some(report) = session.sync_all().await {
                report_outcome("push", &report)?;
            }
        }
        SyncCommands::Enable => match session.toggle_sync(true).await {
            Some(report) => report_outcome("push", &report)?,
            None => println!("Sync enabled; local data will be pushed after sign-in"),
        },
        SyncCommands::Disable => {
            session.toggle_sync(false).await;
            println!("Sync disabled");
        }
        SyncCommands::Pull => {
            require_signed_in(session)?;
            if session.documents().is_replicated() {
                let changed = session.documents().refresh().await?;
                tracing::debug!("Replica refresh changed {} watched document(s)", changed);
            }
            if let Some(report) = session.pull_all().await {
                report_outcome("pull", &report)?;
            }
        }
    }
    Ok(())
}

const fn to_data_type(arg: DataTypeArg) -> DataType {
    match arg {
        DataTypeArg::Preferences => DataType::Preferences,
        DataTypeArg::Links => DataType::Links,
    }
}

fn format_timestamp(unix_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(unix_millis)
        .map_or_else(|| unix_millis.to_string(), |at| at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
