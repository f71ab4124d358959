use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "toolbox")]
#[command(about = "Manage Toolbox preferences and pinned links from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Profile name; each profile keeps its own session and local data
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign up, sign in and manage the account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Manage pinned links
    Links {
        #[command(subcommand)]
        command: LinksCommands,
    },
    /// Inspect and drive remote sync
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account and sign in
    Register {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        /// Display name stored on the profile
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
    /// Sign in and store the session in the keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Send a password reset email
    Reset {
        #[arg(long, value_name = "EMAIL")]
        email: String,
    },
    /// Show who is signed in
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update the signed-in profile
    Profile {
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
        #[arg(long, value_name = "URL")]
        photo_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Print current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set one preference (darkMode, theme, fontSize, language)
    Set {
        key: String,
        /// New value; `system` clears the dark mode override
        value: String,
    },
}

#[derive(Subcommand)]
pub enum LinksCommands {
    /// List pinned links
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pin a link
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Unpin every link with this URL
    Remove { url: String },
    /// Swap a pinned link for another
    Replace {
        old_url: String,
        new_url: String,
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push one data type now
    Now {
        #[arg(value_enum)]
        data_type: DataTypeArg,
    },
    /// Push every synced data type
    All,
    /// Turn sync on and push local data
    Enable,
    /// Turn sync off
    Disable,
    /// Refresh the replica and apply remote data locally
    Pull,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DataTypeArg {
    Preferences,
    Links,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_profile_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["toolbox", "links", "list", "--profile", "work"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("work"));
        assert!(matches!(
            cli.command,
            Commands::Links {
                command: LinksCommands::List { json: false }
            }
        ));
    }

    #[test]
    fn sync_now_requires_a_known_type() {
        assert!(Cli::try_parse_from(["toolbox", "sync", "now", "notes"]).is_err());
        let cli = Cli::try_parse_from(["toolbox", "sync", "now", "links"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sync {
                command: SyncCommands::Now {
                    data_type: DataTypeArg::Links
                }
            }
        ));
    }
}
