//! `get` -- fetch a REST API path and print its JSON body.

use clap::ArgMatches;
use mbs_core::{Action, ActionContext, CoreError};
use tracing::debug;

use super::print_json;

pub struct Get {
    path: String,
    query: Vec<(String, String)>,
}

pub fn build(matches: &ArgMatches) -> Result<Box<dyn Action>, CoreError> {
    let path = matches
        .get_one::<String>("path")
        .cloned()
        .ok_or_else(|| CoreError::InvalidInput {
            message: "missing PATH".into(),
        })?;
    let query = matches
        .get_many::<(String, String)>("query")
        .map(|pairs| pairs.cloned().collect())
        .unwrap_or_default();
    Ok(Box::new(Get { path, query }))
}

impl Action for Get {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<(), CoreError> {
        debug!(path = %self.path, params = self.query.len(), "GET");
        let params: Vec<(&str, String)> = self
            .query
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        let body = if params.is_empty() {
            ctx.http.get(&self.path)?
        } else {
            ctx.http.get_with_params(&self.path, &params)?
        };
        print_json(&body)
    }
}
