use anyhow::Result;
use clap::{command, value_parser, Arg, ArgMatches, Command};
use std::ffi::{OsStr, OsString};

use crate::{
    dispatch::{self, Outcome},
    l18n,
    platform::Context,
};

/// Verb the elevated child is started with. It must never elevate again.
pub const ELEVATED_VERB: &str = "/installmanagerservice";

pub type BareHandler = fn(&Context) -> Result<Outcome>;
pub type OperandHandler = fn(&Context, &OsStr) -> Result<Outcome>;

#[derive(Clone, Copy)]
pub enum Handler {
    Bare(BareHandler),
    /// Takes exactly one trailing argument, named by the placeholder.
    WithOperand(&'static str, OperandHandler),
}

pub struct Verb {
    pub name: &'static str,
    pub handler: Handler,
}

pub static VERBS: &[Verb] = &[
    Verb {
        name: "/installmanagerservice",
        handler: Handler::Bare(dispatch::install_manager),
    },
    Verb {
        name: "/installtunnelservice",
        handler: Handler::WithOperand("CONFIG_PATH", dispatch::install_tunnel),
    },
    Verb {
        name: "/uninstallmanagerservice",
        handler: Handler::Bare(dispatch::uninstall_manager),
    },
    Verb {
        name: "/uninstalltunnelservice",
        handler: Handler::WithOperand("TUNNEL_NAME", dispatch::uninstall_tunnel),
    },
    Verb {
        name: "/managerservice",
        handler: Handler::Bare(dispatch::run_manager),
    },
    Verb {
        name: "/tunnelservice",
        handler: Handler::WithOperand("CONFIG_PATH", dispatch::run_tunnel),
    },
    Verb {
        name: "/dumplog",
        handler: Handler::WithOperand("OUTPUT_PATH", dispatch::dump_log),
    },
];

impl Verb {
    pub fn operand(&self) -> Option<&'static str> {
        match self.handler {
            Handler::Bare(_) => None,
            Handler::WithOperand(placeholder, _) => Some(placeholder),
        }
    }

    /// Total token count including the program name.
    pub fn required_args(&self) -> usize {
        match self.operand() {
            Some(_) => 3,
            None => 2,
        }
    }

    pub fn synopsis(&self) -> String {
        match self.operand() {
            Some(placeholder) => format!("{} {placeholder}", self.name),
            None => self.name.to_string(),
        }
    }

    pub fn invoke(&self, ctx: &Context, operand: Option<&OsStr>) -> Result<Outcome> {
        match (self.handler, operand) {
            (Handler::Bare(handler), None) => handler(ctx),
            (Handler::WithOperand(_, handler), Some(operand)) => handler(ctx, operand),
            _ => anyhow::bail!("{} takes {} arguments", self.name, self.required_args()),
        }
    }

    fn init_subcommand(&self) -> Command {
        let subcommand = Command::new(self.name).disable_help_flag(true);

        match self.operand() {
            Some(placeholder) => subcommand.arg(
                Arg::new("operand")
                    .value_name(placeholder)
                    .required(true)
                    .allow_hyphen_values(true)
                    .value_parser(value_parser!(OsString)),
            ),
            None => subcommand,
        }
    }
}

pub fn init() -> Command {
    VERBS.iter().fold(
        command!("wireguard")
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true),
        |cmd, verb| cmd.subcommand(verb.init_subcommand()),
    )
}

/// A verb matched with exactly the arguments it requires.
pub struct Invocation {
    pub verb: &'static Verb,
    pub operand: Option<OsString>,
}

impl Invocation {
    pub fn invoke(&self, ctx: &Context) -> Result<Outcome> {
        self.verb.invoke(ctx, self.operand.as_deref())
    }
}

#[derive(Debug)]
pub struct UsageError(clap::Error);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0.kind())
    }
}

pub fn parse(args: &[OsString]) -> Result<Invocation, UsageError> {
    // Everything after the verb is an operand, even a literal `--`.
    let mut tokens = args.to_vec();
    if tokens.len() > 2 {
        tokens.insert(2, OsString::from("--"));
    }

    let matches = init().try_get_matches_from(tokens).map_err(UsageError)?;
    resolve(&matches).ok_or_else(|| {
        UsageError(clap::Error::new(
            clap::error::ErrorKind::MissingSubcommand,
        ))
    })
}

fn resolve(matches: &ArgMatches) -> Option<Invocation> {
    let (name, args) = matches.subcommand()?;
    let verb = VERBS.iter().find(|verb| verb.name == name)?;
    let operand = match verb.operand() {
        Some(_) => Some(args.get_one::<OsString>("operand")?.to_owned()),
        None => None,
    };

    Some(Invocation { verb, operand })
}

/// Title and body of the usage dialog.
pub fn usage(program: &OsStr) -> (String, String) {
    let mut flags = vec![l18n::tr(
        "(no argument): elevate and install manager service",
    )];
    flags.extend(VERBS.iter().map(Verb::synopsis));

    let builder = flags
        .iter()
        .map(|flag| format!("    {flag}\n"))
        .collect::<String>();

    (
        l18n::tr("Command Line Options"),
        l18n::sprintf(
            "Usage: {} [\n{}]",
            &[&program.to_string_lossy(), &builder],
        ),
    )
}
