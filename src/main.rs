// No console window: every message goes through a dialog.
#![cfg_attr(windows, windows_subsystem = "windows")]

use std::process::ExitCode;

use wireguard_rs::{dispatch, logging, platform::Context};

fn main() -> ExitCode {
    logging::init();

    let args = std::env::args_os().collect::<Vec<_>>();
    let outcome = dispatch::run(&args, &Context::system());

    log::debug!("Exiting with {outcome:?}");
    outcome.into()
}
