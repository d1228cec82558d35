//! OS-level proxy registration.
//!
//! Points the desktop's HTTP/HTTPS proxy settings at the local filtering
//! proxy and removes the setting again. Each platform is driven through its
//! own settings tool; every command is bounded by a timeout.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::FilterError;

const PROXY_HOST: &str = "127.0.0.1";
const WINDOWS_INTERNET_SETTINGS: &str =
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings";

/// Registers and removes the local proxy with the operating system.
pub trait SystemProxy: Send {
    fn register(&self, port: u16) -> Result<(), FilterError>;
    fn deregister(&self) -> Result<(), FilterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// Commands that point the system proxy at `127.0.0.1:port`.
pub fn register_commands(platform: Platform, service: &str, port: u16) -> Vec<Vec<String>> {
    let port = port.to_string();
    match platform {
        Platform::Linux => vec![
            gsettings("org.gnome.system.proxy", "mode", "manual"),
            gsettings("org.gnome.system.proxy.http", "host", PROXY_HOST),
            gsettings("org.gnome.system.proxy.http", "port", &port),
            gsettings("org.gnome.system.proxy.https", "host", PROXY_HOST),
            gsettings("org.gnome.system.proxy.https", "port", &port),
        ],
        Platform::MacOs => vec![
            argv(&["networksetup", "-setwebproxy", service, PROXY_HOST, &port]),
            argv(&["networksetup", "-setsecurewebproxy", service, PROXY_HOST, &port]),
        ],
        Platform::Windows => vec![
            reg_add("ProxyEnable", "REG_DWORD", "1"),
            reg_add("ProxyServer", "REG_SZ", &format!("{PROXY_HOST}:{port}")),
        ],
        Platform::Other => Vec::new(),
    }
}

/// Commands that turn the system proxy back off.
pub fn deregister_commands(platform: Platform, service: &str) -> Vec<Vec<String>> {
    match platform {
        Platform::Linux => vec![gsettings("org.gnome.system.proxy", "mode", "none")],
        Platform::MacOs => vec![
            argv(&["networksetup", "-setwebproxystate", service, "off"]),
            argv(&["networksetup", "-setsecurewebproxystate", service, "off"]),
        ],
        Platform::Windows => vec![reg_add("ProxyEnable", "REG_DWORD", "0")],
        Platform::Other => Vec::new(),
    }
}

fn gsettings(schema: &str, key: &str, value: &str) -> Vec<String> {
    argv(&["gsettings", "set", schema, key, value])
}

fn reg_add(name: &str, kind: &str, data: &str) -> Vec<String> {
    argv(&[
        "reg",
        "add",
        WINDOWS_INTERNET_SETTINGS,
        "/v",
        name,
        "/t",
        kind,
        "/d",
        data,
        "/f",
    ])
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// [`SystemProxy`] backed by the platform's settings commands.
#[derive(Debug, Clone)]
pub struct CommandProxy {
    platform: Platform,
    service: String,
    timeout: Duration,
}

impl CommandProxy {
    /// `service` names the macOS network service (e.g. "Wi-Fi"); other
    /// platforms ignore it.
    pub fn new(service: impl Into<String>, timeout: Duration) -> Self {
        Self {
            platform: Platform::current(),
            service: service.into(),
            timeout,
        }
    }

    fn run_all(&self, commands: Vec<Vec<String>>) -> Result<(), FilterError> {
        if commands.is_empty() {
            return Err(FilterError::ProxyUnsupported);
        }
        for argv in commands {
            self.run(&argv)?;
        }
        Ok(())
    }

    fn run(&self, argv: &[String]) -> Result<(), FilterError> {
        let rendered = argv.join(" ");
        let fail = |message: String| FilterError::ProxyCommand {
            command: rendered.clone(),
            message,
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| fail("empty command".into()))?;

        debug!(command = %rendered, "running proxy command");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(e.to_string()))?;

        // Drained while waiting so a chatty tool cannot fill the pipe and stall.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(command = %rendered, "proxy command timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(fail(format!("timed out after {}ms", self.timeout.as_millis())));
            }
            Err(e) => return Err(fail(e.to_string())),
        };

        if status.success() {
            return Ok(());
        }
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        Err(fail(format!("{status} {}", stderr.trim())))
    }
}

impl SystemProxy for CommandProxy {
    fn register(&self, port: u16) -> Result<(), FilterError> {
        self.run_all(register_commands(self.platform, &self.service, port))
    }

    fn deregister(&self) -> Result<(), FilterError> {
        self.run_all(deregister_commands(self.platform, &self.service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_registration_sets_manual_mode_and_both_schemes() {
        let cmds = register_commands(Platform::Linux, "ignored", 8080);
        assert_eq!(cmds[0], argv(&["gsettings", "set", "org.gnome.system.proxy", "mode", "manual"]));
        assert!(cmds.iter().any(|c| c[2] == "org.gnome.system.proxy.https" && c[4] == "8080"));
        assert_eq!(
            deregister_commands(Platform::Linux, "ignored"),
            vec![argv(&["gsettings", "set", "org.gnome.system.proxy", "mode", "none"])]
        );
    }

    #[test]
    fn macos_commands_target_the_configured_service() {
        let cmds = register_commands(Platform::MacOs, "Ethernet", 9090);
        assert_eq!(
            cmds[1],
            argv(&["networksetup", "-setsecurewebproxy", "Ethernet", "127.0.0.1", "9090"])
        );
        assert_eq!(deregister_commands(Platform::MacOs, "Ethernet").len(), 2);
    }

    #[test]
    fn windows_registration_writes_proxy_server() {
        let cmds = register_commands(Platform::Windows, "", 8080);
        assert!(cmds[1].contains(&"127.0.0.1:8080".to_string()));
        assert!(deregister_commands(Platform::Windows, "")[0].contains(&"0".to_string()));
    }

    #[test]
    fn unsupported_platform_reports_error() {
        let proxy = CommandProxy {
            platform: Platform::Other,
            service: String::new(),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(proxy.register(8080), Err(FilterError::ProxyUnsupported)));
    }

    #[test]
    fn missing_tool_is_a_command_error() {
        let proxy = CommandProxy::new("Wi-Fi", Duration::from_secs(1));
        let err = proxy
            .run(&argv(&["focuswall-definitely-missing-tool", "--version"]))
            .unwrap_err();
        assert!(matches!(err, FilterError::ProxyCommand { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn verbose_stderr_does_not_stall_the_command() {
        let proxy = CommandProxy::new("Wi-Fi", Duration::from_secs(5));
        proxy
            .run(&argv(&["sh", "-c", "head -c 262144 /dev/zero >&2"]))
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_status_and_stderr() {
        let proxy = CommandProxy::new("Wi-Fi", Duration::from_secs(5));
        let err = proxy
            .run(&argv(&["sh", "-c", "printf '%s-%s' schema missing >&2; exit 3"]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("schema-missing"), "{message}");
        assert!(message.contains('3'), "{message}");
        assert!(!message.contains("timed out"), "{message}");
    }
}
