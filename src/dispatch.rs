use anyhow::{Context as _, Result};
use std::{
    ffi::{OsStr, OsString},
    fs::File,
    path::Path,
    process::ExitCode,
};

use crate::{arch, cli, elevation, error::Error, l18n, platform::Context};

/// How an invocation ended. `main` turns this into the process exit code;
/// nothing else in the crate exits the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// An elevated child or a service runtime took over.
    HandedOff,
    /// One dialog has already been shown.
    Failed,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Completed | Self::HandedOff => 0,
            Self::Failed => 1,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}

pub fn run(args: &[OsString], ctx: &Context) -> Outcome {
    if let Err(err) = arch::check(ctx.arch) {
        return fail(ctx, err);
    }

    if args.len() <= 1 {
        log::debug!("No verb given, elevating to install the manager service");
        return match elevation::relaunch_elevated(ctx.elevator) {
            Ok(()) => Outcome::HandedOff,
            Err(err) => fail(ctx, err),
        };
    }

    let invocation = match cli::parse(args) {
        Ok(invocation) => invocation,
        Err(err) => {
            log::debug!("Rejecting {args:?}: {err}");
            let (title, text) = cli::usage(&args[0]);
            ctx.reporter.info(&title, &text);
            return Outcome::Failed;
        }
    };

    log::info!("Dispatching {}", invocation.verb.name);

    match invocation.invoke(ctx) {
        Ok(outcome) => {
            log::debug!("{} finished: {outcome:?}", invocation.verb.name);
            outcome
        }
        Err(err) => fail(ctx, Error::Collaborator(err)),
    }
}

fn fail(ctx: &Context, err: Error) -> Outcome {
    log::error!("{err}");
    ctx.reporter.fatal(&err.to_string());
    Outcome::Failed
}

pub fn install_manager(ctx: &Context) -> Result<Outcome> {
    ctx.services.install_manager()?;
    Ok(Outcome::Completed)
}

pub fn uninstall_manager(ctx: &Context) -> Result<Outcome> {
    ctx.services.uninstall_manager()?;
    Ok(Outcome::Completed)
}

pub fn install_tunnel(ctx: &Context, config_path: &OsStr) -> Result<Outcome> {
    ctx.services.install_tunnel(Path::new(config_path))?;
    Ok(Outcome::Completed)
}

pub fn uninstall_tunnel(ctx: &Context, tunnel_name: &OsStr) -> Result<Outcome> {
    ctx.services
        .uninstall_tunnel(&tunnel_name.to_string_lossy())?;
    Ok(Outcome::Completed)
}

pub fn run_manager(ctx: &Context) -> Result<Outcome> {
    ctx.host.run_manager()?;
    Ok(Outcome::HandedOff)
}

pub fn run_tunnel(ctx: &Context, config_path: &OsStr) -> Result<Outcome> {
    ctx.host.run_tunnel(Path::new(config_path))?;
    Ok(Outcome::HandedOff)
}

/// The file is closed before returning, whether or not the dump succeeded.
pub fn dump_log(ctx: &Context, output_path: &OsStr) -> Result<Outcome> {
    let path = Path::new(output_path);

    let result = {
        let mut file = File::create(path)
            .with_context(|| l18n::sprintf("Unable to create {}", &[&path.display()]))?;
        ctx.logs.dump_to(&mut file, true)
    };
    result?;

    log::info!("Dumped log to {}", path.display());
    Ok(Outcome::Completed)
}
