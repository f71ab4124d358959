use toolbox_core::models::ProfileUpdate;

use crate::cli::AuthCommands;
use crate::commands::common::{print_json, require_signed_in, CliSession};
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, session: &CliSession) -> Result<(), CliError> {
    match command {
        AuthCommands::Register {
            email,
            password,
            name,
        } => {
            let identity = session
                .register(&email, &password, name.as_deref())
                .await?;
            let label = identity.email.as_deref().unwrap_or(&identity.id);
            println!("Account created; signed in as {label}");
        }
        AuthCommands::Login { email, password } => {
            session.login(&email, &password).await?;
            println!("Signed in as {}", session.snapshot().display_name);
        }
        AuthCommands::Logout => {
            if !session.snapshot().is_logged_in {
                println!("Not signed in.");
                return Ok(());
            }
            session.logout().await;
            println!("Signed out");
        }
        AuthCommands::Reset { email } => {
            session.reset_password(&email).await?;
            println!("Password reset email sent to {email}");
        }
        AuthCommands::Status { json } => {
            let snapshot = session.snapshot();
            if json {
                return print_json(&serde_json::json!({
                    "loggedIn": snapshot.is_logged_in,
                    "identity": snapshot.identity,
                    "displayName": snapshot.display_name,
                }));
            }
            if !snapshot.is_logged_in {
                println!("Not signed in.");
                return Ok(());
            }
            let email = session
                .state()
                .read(|store| store.user_email().map(str::to_string));
            println!(
                "Signed in as {} ({})",
                snapshot.display_name,
                email.as_deref().unwrap_or("no email")
            );
        }
        AuthCommands::Profile { name, photo_url } => {
            require_signed_in(session)?;
            let update = ProfileUpdate {
                display_name: name,
                photo_url,
            };
            if update.is_empty() {
                return Err(CliError::Config(
                    "Nothing to update; pass --name or --photo-url".to_string(),
                ));
            }
            session.update_profile(&update).await?;
            println!("Profile updated for {}", session.snapshot().display_name);
        }
    }
    Ok(())
}
