use std::{path::PathBuf, str::FromStr, sync::OnceLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::utils;

static CONFIG: OnceLock<Configuration> = OnceLock::new();

#[cfg(unix)]
static CONFIG_PATHS: [&str; 2] = ["/etc/wireguard-rs/config.ron", "~/.config/wireguard-rs.ron"];
#[cfg(windows)]
static CONFIG_PATHS: [&str; 0] = [];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Configuration {
    /// Where the ring log lives. Defaults to a per-platform system directory.
    pub state_dir: Option<PathBuf>,
    /// Capacity of a newly created ring log, in lines.
    pub log_lines: u32,
    pub manager_service_name: String,
    /// Prepended to the tunnel name to form its service name.
    pub tunnel_service_prefix: String,
    #[cfg(target_os = "linux")]
    pub systemd_unit_dir: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            state_dir: None,
            log_lines: crate::ringlog::DEFAULT_LINES,
            #[cfg(windows)]
            manager_service_name: "WireGuardManager".into(),
            #[cfg(windows)]
            tunnel_service_prefix: "WireGuardTunnel$".into(),
            #[cfg(not(windows))]
            manager_service_name: "wireguard-rs-manager".into(),
            #[cfg(not(windows))]
            tunnel_service_prefix: "wireguard-rs-tunnel-".into(),
            #[cfg(target_os = "linux")]
            systemd_unit_dir: PathBuf::from("/etc/systemd/system"),
        }
    }
}

impl Configuration {
    pub fn state_dir(&self) -> PathBuf {
        match self.state_dir {
            Some(ref dir) => dir.to_owned(),
            None => default_state_dir(),
        }
    }

    pub fn tunnel_service_name(&self, tunnel: &str) -> String {
        format!("{}{tunnel}", self.tunnel_service_prefix)
    }
}

#[cfg(windows)]
fn default_state_dir() -> PathBuf {
    let program_data =
        std::env::var_os("ProgramData").unwrap_or_else(|| "C:\\ProgramData".into());
    PathBuf::from(program_data).join("WireGuard")
}

#[cfg(not(windows))]
fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/wireguard-rs")
}

pub fn parse_from_path(path: &PathBuf) -> Result<Configuration> {
    Ok(match std::fs::read_to_string(path) {
        Ok(content) => ron::from_str::<Configuration>(&content)?,
        Err(_) => Configuration::default(),
    })
}

fn candidate_paths() -> Result<Vec<PathBuf>> {
    if let Some(path) = std::env::var_os("WIREGUARD_RS_CONFIG") {
        return Ok(vec![PathBuf::from(path)]);
    }

    let mut paths = Vec::new();
    for path in CONFIG_PATHS.iter() {
        paths.push(match path.strip_prefix("~/") {
            Some(path) => utils::home_dir().join(path),
            None => PathBuf::from_str(path)?,
        });
    }

    #[cfg(windows)]
    paths.push(default_state_dir().join("config.ron"));

    Ok(paths)
}

fn load() -> Result<Configuration> {
    for path in candidate_paths()? {
        if std::fs::metadata(&path).is_err() {
            continue;
        }

        log::debug!("Reading configuration from {}", path.display());
        return parse_from_path(&path);
    }

    Ok(Configuration::default())
}

/// Loads the configuration on first use. Only the system collaborators call
/// this, so a broken file surfaces as their error.
pub fn read() -> Result<&'static Configuration> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = load()?;
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(log_lines: 64, state_dir: Some(\"/tmp/wg\"))")?;

        let config = parse_from_path(&path)?;
        assert_eq!(config.log_lines, 64);
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/wg"));
        assert_eq!(
            config.manager_service_name,
            Configuration::default().manager_service_name
        );

        Ok(())
    }

    #[test]
    fn missing_file_is_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = parse_from_path(&dir.path().join("absent.ron"))?;
        assert_eq!(config, Configuration::default());
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(log_lines: \"many\")")?;
        assert!(parse_from_path(&path).is_err());
        Ok(())
    }

    #[test]
    fn tunnel_service_names_use_prefix() {
        let config = Configuration {
            tunnel_service_prefix: "tun-".into(),
            ..Configuration::default()
        };
        assert_eq!(config.tunnel_service_name("wg0"), "tun-wg0");
    }
}
