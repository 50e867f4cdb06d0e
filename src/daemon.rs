use crate::{config, l18n, logging, platform::ServiceHost, ringlog::RingLog, service};
use anyhow::Result;
use std::path::Path;

/// Runs the service entry points in the foreground, recording into the ring log.
pub struct SystemHost;

impl ServiceHost for SystemHost {
    fn run_manager(&self) -> Result<()> {
        let config = config::read()?;
        serve("MGR", "manager", &config.manager_service_name)
    }

    fn run_tunnel(&self, config_path: &Path) -> Result<()> {
        let name = service::tunnel_name_from_path(config_path)?;
        if std::fs::metadata(config_path).is_err() {
            anyhow::bail!(l18n::sprintf(
                "Unable to read tunnel configuration {}",
                &[&config_path.display()],
            ))
        }

        let config = config::read()?;
        serve("TUN", &name, &config.tunnel_service_name(&name))
    }
}

#[cfg(unix)]
fn serve(tag: &'static str, name: &str, service: &str) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    logging::attach_ring(RingLog::from_config()?, tag)?;
    log::info!("Starting {name} service ({service})");

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    log::debug!("Waiting for termination signal");

    #[allow(clippy::never_loop)]
    for sig in signals.forever() {
        log::info!("Received signal {sig}, stopping {name} service");
        break;
    }

    Ok(())
}

#[cfg(windows)]
fn serve(tag: &'static str, name: &str, service: &str) -> Result<()> {
    logging::attach_ring(RingLog::from_config()?, tag)?;
    log::info!("Starting {name} service ({service})");

    scm::run(service)?;

    log::info!("Stopped {name} service");
    Ok(())
}

/// Service control manager handshake for an own-process service.
#[cfg(windows)]
mod scm {
    use crate::utils::to_wide;
    use anyhow::{Context, Result};
    use parking_lot::{Condvar, Mutex};
    use std::{
        ffi::{c_void, OsStr},
        io,
        sync::OnceLock,
    };
    use windows_sys::Win32::{
        Foundation::{ERROR_CALL_NOT_IMPLEMENTED, NO_ERROR},
        System::Services::{
            RegisterServiceCtrlHandlerExW, SetServiceStatus, StartServiceCtrlDispatcherW,
            SERVICE_ACCEPT_SHUTDOWN, SERVICE_ACCEPT_STOP, SERVICE_CONTROL_INTERROGATE,
            SERVICE_CONTROL_SHUTDOWN, SERVICE_CONTROL_STOP, SERVICE_RUNNING, SERVICE_STATUS,
            SERVICE_STATUS_CURRENT_STATE, SERVICE_STATUS_HANDLE, SERVICE_STOPPED,
            SERVICE_TABLE_ENTRYW, SERVICE_WIN32_OWN_PROCESS,
        },
    };

    static SERVICE_NAME: OnceLock<Vec<u16>> = OnceLock::new();
    static STOP: (Mutex<bool>, Condvar) = (Mutex::new(false), Condvar::new());

    /// Blocks until the service control manager stops the service.
    pub fn run(service: &str) -> Result<()> {
        let mut name = SERVICE_NAME
            .get_or_init(|| to_wide(OsStr::new(service)))
            .clone();

        let table = [
            SERVICE_TABLE_ENTRYW {
                lpServiceName: name.as_mut_ptr(),
                lpServiceProc: Some(service_main),
            },
            SERVICE_TABLE_ENTRYW {
                lpServiceName: std::ptr::null_mut(),
                lpServiceProc: None,
            },
        ];

        if unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) } == 0 {
            return Err(io::Error::last_os_error()).with_context(|| {
                format!("{service} can only be started by the service control manager")
            });
        }

        Ok(())
    }

    unsafe extern "system" fn service_main(_argc: u32, _argv: *mut *mut u16) {
        let Some(name) = SERVICE_NAME.get() else {
            return;
        };

        let handle =
            RegisterServiceCtrlHandlerExW(name.as_ptr(), Some(control_handler), std::ptr::null());
        if handle.is_null() {
            log::error!(
                "Unable to register service control handler: {}",
                io::Error::last_os_error()
            );
            return;
        }

        set_status(handle, SERVICE_RUNNING, SERVICE_ACCEPT_STOP | SERVICE_ACCEPT_SHUTDOWN);
        log::debug!("Waiting for stop request");

        let mut stopped = STOP.0.lock();
        while !*stopped {
            STOP.1.wait(&mut stopped);
        }
        drop(stopped);

        set_status(handle, SERVICE_STOPPED, 0);
    }

    unsafe extern "system" fn control_handler(
        control: u32,
        _event_type: u32,
        _event_data: *mut c_void,
        _context: *mut c_void,
    ) -> u32 {
        match control {
            SERVICE_CONTROL_STOP | SERVICE_CONTROL_SHUTDOWN => {
                log::info!("Stop requested by the service control manager");
                *STOP.0.lock() = true;
                STOP.1.notify_all();
                NO_ERROR
            }
            SERVICE_CONTROL_INTERROGATE => NO_ERROR,
            _ => ERROR_CALL_NOT_IMPLEMENTED,
        }
    }

    fn set_status(
        handle: SERVICE_STATUS_HANDLE,
        state: SERVICE_STATUS_CURRENT_STATE,
        controls: u32,
    ) {
        let status = SERVICE_STATUS {
            dwServiceType: SERVICE_WIN32_OWN_PROCESS,
            dwCurrentState: state,
            dwControlsAccepted: controls,
            dwWin32ExitCode: NO_ERROR,
            dwServiceSpecificExitCode: 0,
            dwCheckPoint: 0,
            dwWaitHint: 0,
        };

        if unsafe { SetServiceStatus(handle, &status) } == 0 {
            log::error!(
                "Unable to report service state {state}: {}",
                io::Error::last_os_error()
            );
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn refuses_to_run_outside_the_service_control_manager() {
            let err = run("WireGuardManager").unwrap_err();
            assert!(
                err.to_string().contains("service control manager"),
                "{err:#}"
            );
        }
    }
}
