use std::{fmt, io};

use crate::l18n;

/// Failures that end an invocation with a fatal report.
#[derive(Debug)]
pub enum Error {
    ArchitectureQuery(io::Error),
    EmulatedProcess,
    ExecutablePath(io::Error),
    Elevation(anyhow::Error),
    Collaborator(anyhow::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchitectureQuery(err) => f.write_str(&l18n::sprintf(
                "Unable to determine whether the process is running under WOW64: {}",
                &[err],
            )),
            Self::EmulatedProcess => f.write_str(&l18n::tr(
                "You must use the 64-bit version of WireGuard on this computer.",
            )),
            Self::ExecutablePath(err) => write!(f, "{err}"),
            // Alternate formatting keeps the whole context chain.
            Self::Elevation(err) | Self::Collaborator(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ArchitectureQuery(err) | Self::ExecutablePath(err) => Some(err),
            Self::Elevation(err) | Self::Collaborator(err) => Some(&**err),
            Self::EmulatedProcess => None,
        }
    }
}
