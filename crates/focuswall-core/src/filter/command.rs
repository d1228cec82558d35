use std::path::PathBuf;

use super::rules::FilterMode;

/// Command line of the external filtering proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCommand {
    pub binary: PathBuf,
    pub port: u16,
    pub script: PathBuf,
    pub addresses_str: String,
    pub mode: FilterMode,
}

impl FilterCommand {
    /// Logical argument vector, identical on every platform.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--set".into(),
            "allow_remote=true".into(),
            "-p".into(),
            self.port.to_string(),
            "--showhost".into(),
            "-s".into(),
            self.script.display().to_string(),
            "--set".into(),
            format!("addresses_str={}", self.addresses_str),
            "--set".into(),
            format!("block_type={}", self.mode.as_str()),
        ]
    }

    /// Shell-style rendering for logs and `filter command`.
    pub fn display_posix(&self) -> String {
        std::iter::once(self.binary.display().to_string())
            .chain(self.args())
            .map(|arg| quote_posix(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Windows command-line rendering (CommandLineToArgvW rules).
    pub fn display_windows(&self) -> String {
        std::iter::once(self.binary.display().to_string())
            .chain(self.args())
            .map(|arg| quote_windows(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn display_native(&self) -> String {
        if cfg!(windows) {
            self.display_windows()
        } else {
            self.display_posix()
        }
    }
}

fn quote_posix(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn quote_windows(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut out = String::from('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.push_str(&"\\".repeat(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.push_str(&"\\".repeat(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.push_str(&"\\".repeat(backslashes * 2));
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(addresses: &str) -> FilterCommand {
        FilterCommand {
            binary: PathBuf::from("mitmdump"),
            port: 8080,
            script: PathBuf::from("/tmp/focuswall_filter.py"),
            addresses_str: addresses.to_string(),
            mode: FilterMode::Allowlist,
        }
    }

    #[test]
    fn args_follow_proxy_contract() {
        let args = command("a.com,b.org").args();
        assert_eq!(
            args,
            vec![
                "--set",
                "allow_remote=true",
                "-p",
                "8080",
                "--showhost",
                "-s",
                "/tmp/focuswall_filter.py",
                "--set",
                "addresses_str=a.com,b.org",
                "--set",
                "block_type=allowlist",
            ]
        );
    }

    #[test]
    fn posix_rendering_quotes_only_when_needed() {
        let rendered = command("a.com,b.org").display_posix();
        assert!(rendered.starts_with("mitmdump --set allow_remote=true -p 8080"));
        assert!(rendered.contains("addresses_str=a.com,b.org"));

        let rendered = command("it's here").display_posix();
        assert!(rendered.contains(r"'addresses_str=it'\''s here'"));
    }

    #[test]
    fn windows_rendering_wraps_spaces_and_escapes_quotes() {
        assert_eq!(quote_windows("plain"), "plain");
        assert_eq!(quote_windows("a b"), "\"a b\"");
        assert_eq!(quote_windows("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_windows(r"C:\Program Files\"), "\"C:\\Program Files\\\\\"");
    }
}
