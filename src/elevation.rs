use anyhow::Result;
use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{cli, error::Error, platform::Elevator};

/// Relaunches this executable elevated with `/installmanagerservice`.
///
/// On success the caller must end the current process: the elevated child is
/// the one that performs the install. The child verb never elevates again.
pub fn relaunch_elevated(elevator: &dyn Elevator) -> Result<(), Error> {
    let path = elevator.current_exe().map_err(Error::ExecutablePath)?;

    log::info!(
        "Relaunching {} elevated with {}",
        path.display(),
        cli::ELEVATED_VERB
    );

    elevator
        .shell_execute(&path, cli::ELEVATED_VERB)
        .map_err(Error::Elevation)
}

/// Meaning of a `ShellExecuteW` result of 32 or less.
#[cfg(any(windows, test))]
fn shell_execute_failure(code: usize) -> &'static str {
    match code {
        0 | 8 => "The operating system is out of memory or resources",
        2 => "The specified file was not found",
        3 => "The specified path was not found",
        5 => "The request was declined or access was denied",
        11 => "The executable file is invalid",
        26 => "A sharing violation occurred",
        27 | 31 => "No application is associated with the file",
        28..=30 => "The DDE transaction could not be completed",
        32 => "The specified DLL was not found",
        _ => "The launch request failed",
    }
}

pub struct SystemElevator;

impl Elevator for SystemElevator {
    fn current_exe(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    /// Shown normally, inheriting the working directory.
    #[cfg(windows)]
    fn shell_execute(&self, program: &Path, arguments: &str) -> Result<()> {
        use crate::{l18n, utils::to_wide};
        use std::ffi::OsStr;
        use windows_sys::Win32::UI::{Shell::ShellExecuteW, WindowsAndMessaging::SW_SHOW};

        let operation = to_wide(OsStr::new("runas"));
        let file = to_wide(program.as_os_str());
        let parameters = to_wide(OsStr::new(arguments));

        let instance = unsafe {
            ShellExecuteW(
                std::ptr::null_mut(),
                operation.as_ptr(),
                file.as_ptr(),
                parameters.as_ptr(),
                std::ptr::null(),
                SW_SHOW,
            )
        };

        // Values above 32 mean the launch was accepted.
        let code = instance as usize;
        if code > 32 {
            return Ok(());
        }

        anyhow::bail!(
            "{}: {} (code {code})",
            l18n::sprintf(
                "Unable to launch {} with administrative privileges",
                &[&program.display()],
            ),
            shell_execute_failure(code)
        )
    }

    /// Replaces the current process, going through `sudo` unless already root.
    #[cfg(unix)]
    fn shell_execute(&self, program: &Path, arguments: &str) -> Result<()> {
        use crate::l18n;
        use anyhow::Context;
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        let mut command = match elevate::check() {
            elevate::RunningAs::Root => Command::new(program),
            _ => {
                let mut sudo = Command::new("sudo");
                sudo.arg(program);
                sudo
            }
        };
        command.args(arguments.split_whitespace());

        log::debug!("Executing {command:?}");
        let err = command.exec();

        Err(err).with_context(|| {
            l18n::sprintf(
                "Unable to launch {} with administrative privileges",
                &[&program.display()],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_execute_codes_have_their_own_text() {
        assert!(shell_execute_failure(5).contains("declined"));
        assert!(shell_execute_failure(2).contains("file was not found"));
        assert!(shell_execute_failure(31).contains("No application"));
        assert_eq!(shell_execute_failure(0), shell_execute_failure(8));
        assert_eq!(shell_execute_failure(17), "The launch request failed");
    }
}
