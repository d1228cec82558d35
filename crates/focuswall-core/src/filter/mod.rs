//! Website filtering through an external intercepting proxy.

mod command;
mod manager;
mod process;
mod proxy;
mod rules;

pub use command::FilterCommand;
pub use manager::{FilterControl, FilterNotice, FilterProcessManager, FilterRequest};
pub use process::{FilterChild, OsLauncher, ProcessLauncher, TerminationPolicy};
pub use proxy::{deregister_commands, register_commands, CommandProxy, Platform, SystemProxy};
pub use rules::{
    parse_addresses, rule_script, write_rule_script, FilterMode, FilterRuleSet, Verdict,
    BLOCK_CONTENT_TYPE, BLOCK_PAGE_HTML, RULE_SCRIPT_FILE, SHUTDOWN_RESPONSE, SHUTDOWN_URL,
};
