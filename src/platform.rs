//! Seams between the dispatcher and the operating system.
//!
//! Every privileged effect the dispatcher can trigger goes through one of these
//! traits. The binary wires in the system implementations from their own
//! modules, tests wire in recording fakes.

use anyhow::Result;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    arch::SystemArch, daemon::SystemHost, elevation::SystemElevator, reporter::Dialogs,
    ringlog::ConfiguredRingLog, service::SystemServices,
};

pub trait ArchProbe {
    /// `true` when a 32-bit process runs emulated on a 64-bit OS.
    fn is_emulated_process(&self) -> io::Result<bool>;
}

/// The only user-facing failure channel. Implementations must not exit the process.
pub trait Reporter {
    fn fatal(&self, message: &str);
    fn info(&self, title: &str, message: &str);
}

pub trait Elevator {
    fn current_exe(&self) -> io::Result<PathBuf>;

    /// Requests the OS to start `program` with administrative privileges.
    fn shell_execute(&self, program: &Path, arguments: &str) -> Result<()>;
}

pub trait ServiceManager {
    fn install_manager(&self) -> Result<()>;
    fn uninstall_manager(&self) -> Result<()>;
    fn install_tunnel(&self, config_path: &Path) -> Result<()>;
    fn uninstall_tunnel(&self, tunnel_name: &str) -> Result<()>;
}

pub trait LogDumper {
    fn dump_to(&self, out: &mut dyn Write, include_all: bool) -> Result<()>;
}

/// Long-running service entry points. Returning means the service stopped.
pub trait ServiceHost {
    fn run_manager(&self) -> Result<()>;
    fn run_tunnel(&self, config_path: &Path) -> Result<()>;
}

pub struct Context<'a> {
    pub arch: &'a dyn ArchProbe,
    pub reporter: &'a dyn Reporter,
    pub elevator: &'a dyn Elevator,
    pub services: &'a dyn ServiceManager,
    pub logs: &'a dyn LogDumper,
    pub host: &'a dyn ServiceHost,
}

impl Context<'static> {
    pub fn system() -> Self {
        Self {
            arch: &SystemArch,
            reporter: &Dialogs,
            elevator: &SystemElevator,
            services: &SystemServices,
            logs: &ConfiguredRingLog,
            host: &SystemHost,
        }
    }
}
