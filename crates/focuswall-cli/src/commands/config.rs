//! Machine-wide settings: the filter proxy, elapsed-time flushing and the
//! update check. Per-workspace timer settings live under `workspace set`.

use clap::{Subcommand, ValueEnum};
use focuswall_core::Config;

#[derive(Clone, Copy, ValueEnum)]
pub enum Section {
    Filter,
    Session,
    Update,
}

impl Section {
    fn key(self) -> &'static str {
        match self {
            Section::Filter => "filter",
            Section::Session => "session",
            Section::Update => "update",
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value (e.g. "filter.listening_port", "session.flush_interval_ms")
    Get { key: String },
    /// Change one value; a running session picks it up on its next start or `reload`
    Set { key: String, value: String },
    /// Print all settings, or one section
    List {
        #[arg(long, value_enum)]
        section: Option<Section>,
    },
    /// Print the location of config.toml
    Path,
    /// Restore the defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List { section } => {
            let mut json = serde_json::to_value(Config::load()?)?;
            if let Some(section) = section {
                json = json[section.key()].take();
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
