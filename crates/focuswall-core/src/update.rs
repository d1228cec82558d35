//! Remote version check.
//!
//! Fetches the latest release document and compares its tag with the
//! running version. Network failures are reported separately so the front
//! end can show them as a dismissible notice.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::UpdateError;
use crate::events::Event;
use crate::storage::UpdateConfig;

const USER_AGENT: &str = concat!("focuswall/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available { latest: String },
}

impl UpdateStatus {
    /// Event to show for this result, if any.
    pub fn into_event(self, current: &str) -> Option<Event> {
        match self {
            UpdateStatus::UpToDate => None,
            UpdateStatus::Available { latest } => Some(Event::UpdateAvailable {
                current: current.to_string(),
                latest,
                at: Utc::now(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

pub struct UpdateChecker {
    client: Client,
    url: String,
}

impl UpdateChecker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::Failed(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        Self::new(&config.release_url, Duration::from_millis(config.timeout_ms))
    }

    /// Version named by the latest release, without a leading `v`.
    pub async fn latest_version(&self) -> Result<String, UpdateError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(UpdateError::Failed(format!(
                "release server answered HTTP {}",
                resp.status()
            )));
        }
        let release: Release = resp.json().await?;
        let version = release.tag_name.trim().trim_start_matches('v').to_string();
        parse_version(&version)?;
        Ok(version)
    }

    /// Compare the latest release with `current`.
    pub async fn check(&self, current: &str) -> Result<UpdateStatus, UpdateError> {
        let latest = self.latest_version().await?;
        let status = match compare_versions(&latest, current)? {
            Ordering::Greater => UpdateStatus::Available { latest },
            Ordering::Equal | Ordering::Less => UpdateStatus::UpToDate,
        };
        debug!(current, ?status, "update check finished");
        Ok(status)
    }
}

fn parse_version(version: &str) -> Result<Vec<u64>, UpdateError> {
    // Pre-release and build suffixes are ignored.
    let core = version
        .trim_start_matches('v')
        .split(['-', '+'])
        .next()
        .unwrap_or_default();
    core.split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| UpdateError::Failed(format!("malformed version '{version}'")))
        })
        .collect()
}

/// Numeric comparison of dotted versions; missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, UpdateError> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());
    let pad = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
    Ok((0..len)
        .map(|i| pad(&a, i).cmp(&pad(&b, i)))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal))
}
