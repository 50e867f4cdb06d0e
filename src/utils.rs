use anyhow::Result;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Command;

pub fn home_dir() -> PathBuf {
    #[allow(deprecated)] // deprecated because of windows support.
    match std::env::home_dir() {
        Some(path) => path,
        None => std::env::temp_dir(),
    }
}

/// Null-terminated UTF-16 for the wide Win32 APIs.
#[cfg(windows)]
pub fn to_wide(value: &OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    value.encode_wide().chain(std::iter::once(0)).collect()
}

pub struct Cmd<'a> {
    program: &'a str,
    args: Vec<OsString>,
}

impl<'a> Cmd<'a> {
    pub fn new(program: &'a str) -> Self {
        Cmd {
            program,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Runs to completion and returns stdout, failing on a non-zero exit status.
    pub fn output(self) -> Result<String> {
        log::trace!("Running {} {:?}", self.program, self.args);
        let output = Command::new(self.program).args(&self.args).output()?;

        match output.status.success() {
            true => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                Ok(stdout)
            }
            false => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = match stderr.trim() {
                    "" => stdout.trim().to_owned(),
                    stderr => stderr.to_owned(),
                };
                anyhow::bail!("`{}` failed ({}): {detail}", self.program, output.status)
            }
        }
    }

    pub fn exec(self) -> Result<()> {
        self.output().map(|_| ())
    }

    /// Like `output`, but only reports whether the command succeeded.
    pub fn succeeds(self) -> bool {
        self.output().is_ok()
    }
}
