use clap::Subcommand;
use focuswall_core::{Config, UpdateChecker, UpdateError, UpdateStatus};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Subcommand)]
pub enum UpdateAction {
    /// Compare the running version with the latest release
    Check,
}

pub fn run(action: UpdateAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        UpdateAction::Check => {
            let config = Config::load()?;
            let checker = UpdateChecker::from_config(&config.update)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let json = match runtime.block_on(checker.check(VERSION)) {
                Ok(UpdateStatus::UpToDate) => serde_json::json!({
                    "status": "up_to_date",
                    "current": VERSION,
                }),
                Ok(UpdateStatus::Available { latest }) => serde_json::json!({
                    "status": "available",
                    "current": VERSION,
                    "latest": latest,
                }),
                Err(UpdateError::NetworkUnreachable(message)) => serde_json::json!({
                    "status": "offline",
                    "current": VERSION,
                    "message": message,
                }),
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
