//! Workspace filter lists as seen by the proxy process.

use std::path::PathBuf;

use focuswall_core::filter::{parse_addresses, FilterCommand, Verdict};
use focuswall_core::{Database, FilterMode};

#[test]
fn blocklist_workspace_blocks_listed_sites_only() {
    let db = Database::open_memory().unwrap();
    let mut ws = db.ensure_default_workspace().unwrap();
    ws.blocklist.insert("example.com".into());
    db.update_workspace(&ws).unwrap();

    let rules = db.get_workspace(&ws.id).unwrap().unwrap().rules();
    assert_eq!(rules.verdict("http://example.com/page"), Verdict::Block);
    assert_eq!(rules.verdict("http://other.org/"), Verdict::Pass);
}

#[test]
fn allowlist_workspace_passes_listed_sites_only() {
    let db = Database::open_memory().unwrap();
    let mut ws = db.ensure_default_workspace().unwrap();
    ws.filter_mode = FilterMode::Allowlist;
    ws.allowlist.insert("example.com".into());
    ws.blocklist.insert("other.org".into());
    db.update_workspace(&ws).unwrap();

    let rules = db.get_workspace(&ws.id).unwrap().unwrap().rules();
    assert_eq!(rules.verdict("http://example.com/page"), Verdict::Pass);
    assert_eq!(rules.verdict("http://other.org/"), Verdict::Block);
}

#[test]
fn proxy_sees_the_same_address_set() {
    let mut ws = focuswall_core::Workspace::new("Reading");
    for a in ["b.example", " a.example ", ""] {
        ws.list_mut(FilterMode::Blocklist).insert(a.to_string());
    }
    let rules = ws.rules();
    let command = FilterCommand {
        binary: PathBuf::from("mitmdump"),
        port: 8080,
        script: PathBuf::from("/tmp/focuswall_filter.py"),
        addresses_str: rules.addresses_str(),
        mode: rules.mode,
    };
    let arg = command
        .args()
        .into_iter()
        .find_map(|a| a.strip_prefix("addresses_str=").map(str::to_string))
        .unwrap();
    assert_eq!(arg, "a.example,b.example");
    assert_eq!(rules.verdict("http://c.example/"), Verdict::Pass);
    assert_eq!(
        parse_addresses(&arg).into_iter().collect::<Vec<_>>(),
        vec!["a.example", "b.example"]
    );
}
