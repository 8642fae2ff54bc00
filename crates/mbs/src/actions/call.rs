//! `call` -- invoke a remote procedure over the pub/sub session.

use clap::ArgMatches;
use mbs_api::wamp::Dict;
use mbs_core::{Action, ActionContext, CoreError};
use serde_json::Value;
use tracing::debug;

use super::print_json;

pub struct Call {
    procedure: String,
    args: Vec<Value>,
}

pub fn build(matches: &ArgMatches) -> Result<Box<dyn Action>, CoreError> {
    let procedure = matches
        .get_one::<String>("procedure")
        .cloned()
        .ok_or_else(|| CoreError::InvalidInput {
            message: "missing PROCEDURE".into(),
        })?;
    let args = matches
        .get_many::<String>("args")
        .map(|raw| raw.map(String::as_str).map(parse_arg).collect())
        .unwrap_or_default();
    Ok(Box::new(Call { procedure, args }))
}

/// JSON if it parses, otherwise the raw string.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

impl Action for Call {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<(), CoreError> {
        debug!(procedure = %self.procedure, args = self.args.len(), "CALL");
        let result = ctx
            .pubsub
            .call(&self.procedure, self.args.clone(), Dict::new())?;
        print_json(&result)
    }
}
