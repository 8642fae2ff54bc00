mod actions;
mod cli;
mod error;

use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use mbs_config::{CredentialSources, Overrides};
use mbs_core::{Action, Lifecycle};

use crate::cli::{Cli, GlobalOpts};
use crate::error::{CliError, exit_code};

fn main() {
    // Parse CLI arguments; clap exits with 2 on usage errors
    let registry = actions::load_actions();
    let mut command = registry.augment(Cli::command());
    let matches = match command.try_get_matches_from_mut(std::env::args_os()) {
        Ok(matches) => matches,
        // An unknown action gets the full action list, not just clap's hint
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            let _ = e.print();
            eprintln!();
            let _ = command.print_help();
            std::process::exit(exit_code::USAGE);
        }
        Err(e) => e.exit(),
    };
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if !cli.global.quiet {
        init_tracing(cli.global.debug);
    }

    let action = match registry.resolve(&matches) {
        Ok(Some(action)) => action,
        Ok(None) => {
            let _ = command.print_help();
            std::process::exit(exit_code::USAGE);
        }
        Err(e) => exit_with(e.into()),
    };

    match run(&cli.global, action) {
        Ok(()) => std::process::exit(exit_code::SUCCESS),
        Err(err) => exit_with(err),
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_with(err: CliError) -> ! {
    let code = err.exit_code();
    if err.is_data_error() {
        tracing::error!("Data error - no use in retrying: {err}");
    } else {
        eprintln!("{:?}", miette::Report::new(err));
    }
    std::process::exit(code);
}

fn run(global: &GlobalOpts, mut action: Box<dyn Action>) -> Result<(), CliError> {
    if let Some(path) = &global.config {
        if !path.exists() {
            return Err(CliError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
    }

    let config = mbs_config::load_config(global.config.as_deref())?;
    let session = mbs_config::resolve(&config, overrides(global), CredentialSources::default())?;

    tracing::debug!(api = %session.api_url, router = %session.wamp_url, "resolved session config");
    Lifecycle::new().run(session, action.as_mut())?;
    Ok(())
}

fn overrides(global: &GlobalOpts) -> Overrides {
    Overrides {
        api_url: global.api_url.clone(),
        wamp_url: global.wamp_url.clone(),
        realm: global.realm.clone(),
        user: global.user.clone(),
        password: global.password.clone().map(SecretString::from),
        timeout: global.timeout,
    }
}
