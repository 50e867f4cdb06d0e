use std::io;

use crate::{error::Error, platform::ArchProbe};

/// Refuses to continue inside an emulated 32-bit process on a 64-bit host.
pub fn check(probe: &dyn ArchProbe) -> Result<(), Error> {
    match probe.is_emulated_process() {
        Ok(false) => Ok(()),
        Ok(true) => Err(Error::EmulatedProcess),
        Err(err) => Err(Error::ArchitectureQuery(err)),
    }
}

pub struct SystemArch;

#[cfg(windows)]
impl ArchProbe for SystemArch {
    fn is_emulated_process(&self) -> io::Result<bool> {
        use windows_sys::Win32::{
            Foundation::BOOL,
            System::Threading::{GetCurrentProcess, IsWow64Process},
        };

        let mut wow64: BOOL = 0;
        if unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64) } == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(wow64 != 0)
    }
}

#[cfg(not(windows))]
impl ArchProbe for SystemArch {
    fn is_emulated_process(&self) -> io::Result<bool> {
        if cfg!(target_pointer_width = "64") {
            return Ok(false);
        }

        let machine = crate::utils::Cmd::new("uname")
            .arg("-m")
            .output()
            .map_err(io::Error::other)?;

        Ok(is_64bit_machine(machine.trim()))
    }
}

#[cfg_attr(windows, allow(dead_code))]
fn is_64bit_machine(machine: &str) -> bool {
    matches!(
        machine,
        "x86_64" | "amd64" | "aarch64" | "arm64" | "ppc64" | "ppc64le" | "s390x" | "riscv64"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<bool>);

    impl ArchProbe for Fixed {
        fn is_emulated_process(&self) -> io::Result<bool> {
            self.0
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "query denied"))
        }
    }

    #[test]
    fn native_process_passes() {
        assert!(check(&Fixed(Some(false))).is_ok());
    }

    #[test]
    fn emulated_process_is_rejected() {
        assert!(matches!(
            check(&Fixed(Some(true))),
            Err(Error::EmulatedProcess)
        ));
    }

    #[test]
    fn query_failure_keeps_os_error_text() {
        let err = check(&Fixed(None)).unwrap_err();
        assert!(matches!(err, Error::ArchitectureQuery(_)));
        assert!(err.to_string().contains("query denied"));
    }

    #[test]
    fn machine_names() {
        assert!(is_64bit_machine("x86_64"));
        assert!(is_64bit_machine("aarch64"));
        assert!(!is_64bit_machine("i686"));
        assert!(!is_64bit_machine("armv7l"));
    }

    #[test]
    fn this_build_is_not_emulated() -> io::Result<()> {
        if cfg!(target_pointer_width = "64") {
            assert!(!SystemArch.is_emulated_process()?);
        }
        Ok(())
    }
}
