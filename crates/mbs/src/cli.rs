//! Clap structures for the `mbs2` CLI.
//!
//! Global flags are derived. Action subcommands are attached at startup by
//! the action registry; their argument builders live here so `build.rs`
//! can render the full command tree without the rest of the crate.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Args, Command, Parser, value_parser};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// mbs2 -- command-line client for a MyBookshelf2 server
#[derive(Debug, Parser)]
#[command(
    name = "mbs2",
    version,
    about = "Command-line client for a MyBookshelf2 server",
    long_about = "Logs in to the REST API, opens a WAMP session to the router,\n\
        runs one action against both, and shuts everything down again.\n\n\
        Exit codes: 0 success, 1 error, 2 usage, 11 data error (no use in retrying)."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Base URL for REST API [default: http://localhost:6006]
    #[arg(long, env = "MBS_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// WAMP router URL [default: ws://localhost:8080/ws]
    #[arg(long, env = "MBS_WAMP_URL", value_name = "URL")]
    pub wamp_url: Option<String>,

    /// WAMP realm [default: realm1]
    #[arg(long, env = "MBS_REALM")]
    pub realm: Option<String>,

    /// User name
    #[arg(long, short = 'u', env = "MBS_USER")]
    pub user: Option<String>,

    /// Password
    #[arg(long, short = 'p', env = "MBS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// HTTP request timeout in seconds [default: 30]
    #[arg(long, env = "MBS_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long, env = "MBS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// Suppress all log messages
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

// ── Action Schemas ───────────────────────────────────────────────────

/// Name, summary and argument builder of one action subcommand.
#[derive(Clone, Copy)]
pub struct ActionSchema {
    pub name: &'static str,
    pub about: &'static str,
    pub args: fn(Command) -> Command,
}

pub const UPLOAD: ActionSchema = ActionSchema {
    name: "upload",
    about: "Upload ebook files and extract their metadata",
    args: upload_args,
};

pub const GET: ActionSchema = ActionSchema {
    name: "get",
    about: "GET a REST API path and print the JSON response",
    args: get_args,
};

pub const CALL: ActionSchema = ActionSchema {
    name: "call",
    about: "Call a remote procedure over WAMP and print the result",
    args: call_args,
};

fn upload_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("files")
            .value_name("FILE")
            .help("Ebook files to upload")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("no-meta")
            .long("no-meta")
            .help("Upload only; skip metadata extraction")
            .action(ArgAction::SetTrue),
    )
}

fn get_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("path")
            .value_name("PATH")
            .help("API path, resolved against --api-url")
            .required(true),
    )
    .arg(
        Arg::new("query")
            .long("query")
            .value_name("KEY=VALUE")
            .help("Query parameter (repeatable)")
            .action(ArgAction::Append)
            .value_parser(parse_key_value),
    )
}

fn call_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("procedure")
            .value_name("PROCEDURE")
            .help("Procedure URI")
            .required(true),
    )
    .arg(
        Arg::new("args")
            .value_name("ARG")
            .help("Positional arguments as JSON; anything that isn't valid JSON is sent as a string")
            .num_args(0..),
    )
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
