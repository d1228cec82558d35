//! Address rules and the script injected into the filtering proxy.
//!
//! [`FilterRuleSet::verdict`] and the addon returned by [`rule_script`]
//! implement the same contract: under a blocklist a request is blocked when
//! its URL contains any configured address, under an allowlist when it
//! contains none of them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indoc::formatdoc;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

pub const BLOCK_CONTENT_TYPE: &str = "text/html; charset=utf-8";

pub const BLOCK_PAGE_HTML: &str = "<!DOCTYPE html><html><head><title>Blocked by Focuswall</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 20vh;\">\
<h1>This site is blocked</h1><p>Focuswall is filtering websites during your work session.</p>\
</body></html>";

/// Requesting this URL through the proxy makes the proxy exit.
pub const SHUTDOWN_URL: &str = "http://focuswall.shutdown/";

pub const SHUTDOWN_RESPONSE: &str = "Focuswall filter shutting down";

pub const RULE_SCRIPT_FILE: &str = "focuswall_filter.py";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Blocklist,
    Allowlist,
}

impl FilterMode {
    /// Tag passed to the proxy as `block_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Blocklist => "blocklist",
            FilterMode::Allowlist => "allowlist",
        }
    }
}

impl std::str::FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocklist" => Ok(FilterMode::Blocklist),
            "allowlist" => Ok(FilterMode::Allowlist),
            other => Err(format!("unknown filter mode '{other}' (expected blocklist or allowlist)")),
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Block,
}

/// The active address rules of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRuleSet {
    pub mode: FilterMode,
    pub addresses: BTreeSet<String>,
}

impl FilterRuleSet {
    pub fn new<I, S>(mode: FilterMode, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            mode,
            addresses: addresses
                .into_iter()
                .filter_map(|a| normalize(a.as_ref()))
                .collect(),
        }
    }

    /// Comma-joined address list, as handed to the proxy process.
    pub fn addresses_str(&self) -> String {
        self.addresses
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn insert(&mut self, address: &str) -> bool {
        match normalize(address) {
            Some(a) => self.addresses.insert(a),
            None => false,
        }
    }

    pub fn remove(&mut self, address: &str) -> bool {
        self.addresses.remove(address.trim())
    }

    pub fn verdict(&self, url: &str) -> Verdict {
        let matched = self.addresses.iter().any(|a| url.contains(a.as_str()));
        let blocked = match self.mode {
            FilterMode::Blocklist => matched,
            FilterMode::Allowlist => !matched,
        };
        if blocked {
            Verdict::Block
        } else {
            Verdict::Pass
        }
    }
}

/// Split a comma-joined address string, dropping empty segments.
pub fn parse_addresses(addresses_str: &str) -> BTreeSet<String> {
    addresses_str.split(',').filter_map(normalize).collect()
}

fn normalize(address: &str) -> Option<String> {
    let trimmed = address.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Source of the mitmproxy addon that enforces the rules inside the proxy.
pub fn rule_script() -> String {
    formatdoc! {r#"
        from mitmproxy import ctx, http

        BLOCK_PAGE = """{block_page}"""
        BLOCK_CONTENT_TYPE = "{content_type}"
        SHUTDOWN_URL = "{shutdown_url}"
        SHUTDOWN_RESPONSE = "{shutdown_response}"


        class AddressFilter:
            def load(self, loader):
                loader.add_option(
                    name="addresses_str",
                    typespec=str,
                    default="",
                    help="Comma-joined list of addresses",
                )
                loader.add_option(
                    name="block_type",
                    typespec=str,
                    default="blocklist",
                    help="blocklist or allowlist",
                )

            def request(self, flow):
                url = flow.request.pretty_url
                if url.startswith(SHUTDOWN_URL):
                    flow.response = http.Response.make(
                        200, SHUTDOWN_RESPONSE, {{"Content-Type": "text/plain"}}
                    )
                    ctx.master.shutdown()
                    return

                addresses = [
                    a.strip() for a in ctx.options.addresses_str.split(",") if a.strip()
                ]
                matched = any(address in url for address in addresses)
                if ctx.options.block_type == "allowlist":
                    blocked = not matched
                else:
                    blocked = matched

                if blocked:
                    flow.response = http.Response.make(
                        403, BLOCK_PAGE, {{"Content-Type": BLOCK_CONTENT_TYPE}}
                    )


        addons = [AddressFilter()]
    "#,
        block_page = BLOCK_PAGE_HTML,
        content_type = BLOCK_CONTENT_TYPE,
        shutdown_url = SHUTDOWN_URL,
        shutdown_response = SHUTDOWN_RESPONSE,
    }
}

/// Write the rule script into `dir` and return its path.
pub fn write_rule_script(dir: &Path) -> Result<PathBuf, FilterError> {
    let path = dir.join(RULE_SCRIPT_FILE);
    std::fs::write(&path, rule_script()).map_err(|source| FilterError::Script {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
