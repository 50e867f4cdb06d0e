use crate::{config, l18n, platform::ServiceManager, utils};
use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use platform::*;

static TUNNEL_NAME: OnceLock<Regex> = OnceLock::new();
static CONFIG_SUFFIXES: [&str; 2] = [".conf.dpapi", ".conf"];

pub fn validate_tunnel_name(name: &str) -> Result<()> {
    let pattern = TUNNEL_NAME.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_=+.-]{1,32}$").expect("tunnel name pattern to compile")
    });

    if !pattern.is_match(name) {
        anyhow::bail!(l18n::sprintf("Tunnel name is not valid: {}", &[&name]))
    }

    Ok(())
}

/// `wg0.conf` and `wg0.conf.dpapi` both name the tunnel `wg0`.
pub fn tunnel_name_from_path(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();

    let Some(name) = CONFIG_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
    else {
        anyhow::bail!(l18n::sprintf(
            "Configuration file must end in .conf or .conf.dpapi: {}",
            &[&path.display()],
        ))
    };

    validate_tunnel_name(name)?;
    Ok(name.to_string())
}

fn executable() -> Result<PathBuf> {
    Ok(std::env::current_exe()?)
}

/// Absolute so the service does not depend on the installer's working directory.
fn absolute_config_path(config_path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(config_path) {
        Ok(path) => Ok(path),
        Err(_) => anyhow::bail!(l18n::sprintf(
            "Unable to read tunnel configuration {}",
            &[&config_path.display()],
        )),
    }
}

/// Services registered with the init system of the host.
pub struct SystemServices;

impl ServiceManager for SystemServices {
    fn install_manager(&self) -> Result<()> {
        platform::install_manager(config::read()?)
    }

    fn uninstall_manager(&self) -> Result<()> {
        platform::uninstall_manager(config::read()?)
    }

    fn install_tunnel(&self, config_path: &Path) -> Result<()> {
        let name = tunnel_name_from_path(config_path)?;
        let config_path = absolute_config_path(config_path)?;
        platform::install_tunnel(config::read()?, &name, &config_path)
    }

    fn uninstall_tunnel(&self, tunnel_name: &str) -> Result<()> {
        validate_tunnel_name(tunnel_name)?;
        platform::uninstall_tunnel(config::read()?, tunnel_name)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;
    use crate::config::Configuration;
    use askama::Template;

    #[derive(Template)]
    #[template(path = "systemd-manager.service", escape = "none")]
    pub struct ManagerUnit {
        pub bin: String,
    }

    #[derive(Template)]
    #[template(path = "systemd-tunnel.service", escape = "none")]
    pub struct TunnelUnit {
        pub bin: String,
        pub tunnel: String,
        pub config_path: String,
        pub manager: String,
    }

    mod filters {
        /// One `ExecStart=` word, whatever spaces, quotes or specifiers it holds.
        pub fn systemd_quote<T: std::fmt::Display>(value: T) -> askama::Result<String> {
            let mut quoted = String::from("\"");
            for c in value.to_string().chars() {
                match c {
                    '"' | '\\' => quoted.extend(['\\', c]),
                    '%' => quoted.push_str("%%"),
                    '$' => quoted.push_str("$$"),
                    _ => quoted.push(c),
                }
            }
            quoted.push('"');
            Ok(quoted)
        }
    }

    fn unit_path(config: &Configuration, service: &str) -> PathBuf {
        config.systemd_unit_dir.join(format!("{service}.service"))
    }

    fn systemctl(args: &[&str]) -> Result<()> {
        utils::Cmd::new("systemctl").args(args).exec()
    }

    fn write_unit(path: &Path, contents: &str) -> Result<()> {
        if std::fs::write(path, contents).is_err() {
            anyhow::bail!("Unable to install service unit file at {:?}", path)
        }

        Ok(())
    }

    fn remove_unit(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => anyhow::bail!("Unable to remove service unit file at {:?}: {err}", path),
        }
    }

    pub fn install_manager(config: &Configuration) -> Result<()> {
        let service = config.manager_service_name.as_str();
        let path = unit_path(config, service);

        if path.exists()
            && utils::Cmd::new("systemctl")
                .args(["is-active", "--quiet", service])
                .succeeds()
        {
            anyhow::bail!(l18n::tr("Manager service is already installed and running"))
        }

        let unit = ManagerUnit {
            bin: executable()?.display().to_string(),
        };
        write_unit(&path, &unit.render()?)?;
        log::info!("Wrote {}", path.display());

        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", "--now", service])
    }

    pub fn uninstall_manager(config: &Configuration) -> Result<()> {
        let service = config.manager_service_name.as_str();
        systemctl(&["disable", "--now", service])?;
        remove_unit(&unit_path(config, service))?;
        systemctl(&["daemon-reload"])
    }

    pub fn install_tunnel(config: &Configuration, name: &str, config_path: &Path) -> Result<()> {
        let service = config.tunnel_service_name(name);
        let path = unit_path(config, &service);

        if path.exists() {
            log::info!("Replacing existing tunnel service {service}");
            if let Err(err) = systemctl(&["disable", "--now", service.as_str()]) {
                log::debug!("Unable to stop {service}: {err}");
            }
        }

        let unit = TunnelUnit {
            bin: executable()?.display().to_string(),
            tunnel: name.to_string(),
            config_path: config_path.display().to_string(),
            manager: config.manager_service_name.clone(),
        };
        write_unit(&path, &unit.render()?)?;
        log::info!("Wrote {}", path.display());

        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", "--now", service.as_str()])
    }

    pub fn uninstall_tunnel(config: &Configuration, name: &str) -> Result<()> {
        let service = config.tunnel_service_name(name);
        systemctl(&["disable", "--now", service.as_str()])?;
        remove_unit(&unit_path(config, &service))?;
        systemctl(&["daemon-reload"])
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use crate::config::Configuration;

    fn sc() -> utils::Cmd<'static> {
        utils::Cmd::new("sc.exe")
    }

    fn is_running(service: &str) -> bool {
        match sc().args(["query", service]).output() {
            Ok(out) => out.contains("RUNNING"),
            Err(_) => false,
        }
    }

    fn exists(service: &str) -> bool {
        sc().args(["query", service]).succeeds()
    }

    fn remove(service: &str) -> Result<()> {
        if is_running(service) {
            sc().args(["stop", service]).exec()?;
        }
        sc().args(["delete", service]).exec()
    }

    pub fn install_manager(config: &Configuration) -> Result<()> {
        let service = config.manager_service_name.as_str();

        if exists(service) {
            if is_running(service) {
                anyhow::bail!(l18n::tr("Manager service is already installed and running"))
            }
            sc().args(["delete", service]).exec()?;
        }

        let bin = format!("\"{}\" /managerservice", executable()?.display());
        sc().args(["create", service, "start=", "auto", "type=", "own"])
            .args(["binPath=", bin.as_str(), "DisplayName=", "WireGuard Manager"])
            .exec()?;
        sc().args(["start", service]).exec()
    }

    pub fn uninstall_manager(config: &Configuration) -> Result<()> {
        remove(&config.manager_service_name)
    }

    pub fn install_tunnel(config: &Configuration, name: &str, config_path: &Path) -> Result<()> {
        let service = config.tunnel_service_name(name);

        if exists(&service) {
            log::info!("Replacing existing tunnel service {service}");
            remove(&service)?;
        }

        let bin = format!(
            "\"{}\" /tunnelservice \"{}\"",
            executable()?.display(),
            config_path.display()
        );
        let display_name = format!("WireGuard Tunnel: {name}");
        sc().args(["create", service.as_str(), "start=", "auto", "type=", "own"])
            .args(["depend=", "Nsi/TcpIp", "binPath=", bin.as_str()])
            .args(["DisplayName=", display_name.as_str()])
            .exec()?;
        sc().args(["start", service.as_str()]).exec()
    }

    pub fn uninstall_tunnel(config: &Configuration, name: &str) -> Result<()> {
        remove(&config.tunnel_service_name(name))
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use super::*;
    use crate::config::Configuration;

    fn unsupported() -> Result<()> {
        anyhow::bail!("Service installation is not supported on this platform")
    }

    pub fn install_manager(_config: &Configuration) -> Result<()> {
        executable()?;
        unsupported()
    }

    pub fn uninstall_manager(_config: &Configuration) -> Result<()> {
        unsupported()
    }

    pub fn install_tunnel(_config: &Configuration, _name: &str, _path: &Path) -> Result<()> {
        unsupported()
    }

    pub fn uninstall_tunnel(_config: &Configuration, _name: &str) -> Result<()> {
        unsupported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_names() {
        let longest = "x".repeat(32);
        let too_long = "x".repeat(33);
        for name in ["wg0", "office_vpn", "a=b+c.d-e", longest.as_str()] {
            assert!(validate_tunnel_name(name).is_ok(), "{name}");
        }
        for name in ["", "with space", "slash/name", "ünï", too_long.as_str()] {
            assert!(validate_tunnel_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn names_from_config_paths() -> Result<()> {
        assert_eq!(tunnel_name_from_path(Path::new("/etc/wg/wg0.conf"))?, "wg0");
        assert_eq!(
            tunnel_name_from_path(Path::new("office.conf.dpapi"))?,
            "office"
        );
        assert!(tunnel_name_from_path(Path::new("wg0.txt")).is_err());
        assert!(tunnel_name_from_path(Path::new(".conf")).is_err());
        assert!(tunnel_name_from_path(Path::new("bad name.conf")).is_err());
        Ok(())
    }

    #[test]
    fn missing_config_is_reported() {
        let err = absolute_config_path(Path::new("/nonexistent/wg0.conf")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/wg0.conf"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn tunnel_unit_runs_tunnel_service() -> Result<()> {
        use askama::Template;

        let unit = TunnelUnit {
            bin: "/usr/bin/wireguard".into(),
            tunnel: "wg0".into(),
            config_path: "/etc/wireguard/wg0.conf".into(),
            manager: "wireguard-rs-manager".into(),
        }
        .render()?;

        assert!(unit.contains(
            r#"ExecStart="/usr/bin/wireguard" /tunnelservice "/etc/wireguard/wg0.conf""#
        ));
        assert!(unit.contains("After=network-online.target wireguard-rs-manager.service"));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn manager_unit_runs_manager_service() -> Result<()> {
        use askama::Template;

        let unit = ManagerUnit {
            bin: "/usr/bin/wireguard".into(),
        }
        .render()?;

        assert!(unit.contains(r#"ExecStart="/usr/bin/wireguard" /managerservice"#));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unit_paths_with_spaces_stay_single_words() -> Result<()> {
        use askama::Template;

        let unit = TunnelUnit {
            bin: "/opt/Wire Guard/wireguard".into(),
            tunnel: "wg0".into(),
            config_path: "/home/u/My VPN/wg0.conf".into(),
            manager: "wireguard-rs-manager".into(),
        }
        .render()?;

        assert!(unit.contains(
            r#"ExecStart="/opt/Wire Guard/wireguard" /tunnelservice "/home/u/My VPN/wg0.conf""#
        ));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unit_escapes_quotes_and_specifiers() -> Result<()> {
        use askama::Template;

        let unit = ManagerUnit {
            bin: r#"/opt/100% "vpn"/wire$guard\bin"#.into(),
        }
        .render()?;

        assert!(
            unit.contains(r#"ExecStart="/opt/100%% \"vpn\"/wire$$guard\\bin" /managerservice"#),
            "{unit}"
        );
        Ok(())
    }
}
