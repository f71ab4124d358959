use toolbox_core::models::{PreferenceKey, PreferenceUpdate};

use crate::cli::PrefsCommands;
use crate::commands::common::{print_json, CliSession};
use crate::error::CliError;

pub async fn run_prefs(command: PrefsCommands, session: &CliSession) -> Result<(), CliError> {
    match command {
        PrefsCommands::Show { json } => {
            let preferences = session.snapshot().preferences;
            if json {
                return print_json(&preferences);
            }
            for key in PreferenceKey::ALL {
                println!("{key}: {}", preferences.value_of(key));
            }
        }
        PrefsCommands::Set { key, value } => {
            let key: PreferenceKey = key.parse()?;
            let update = PreferenceUpdate::parse(key, &value)?;
            if session.set_preference(&update).await {
                println!("{key} set to {}", update.to_json());
            } else {
                println!("{key} unchanged");
            }
        }
    }
    Ok(())
}
