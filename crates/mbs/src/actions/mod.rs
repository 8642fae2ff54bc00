//! Actions shipped with the binary.
//!
//! Static registration list: each entry pairs an argument schema from
//! `cli` with the function that builds the action from parsed matches.

mod call;
mod get;
mod upload;

use mbs_core::action::BuildFn;
use mbs_core::{ActionRegistration, ActionRegistry, CoreError};
use serde_json::Value;

use crate::cli::{self, ActionSchema};

/// Every action, in help order.
pub fn load_actions() -> ActionRegistry {
    let actions: [(ActionSchema, BuildFn); 3] = [
        (cli::UPLOAD, upload::build),
        (cli::GET, get::build),
        (cli::CALL, call::build),
    ];

    let mut registry = ActionRegistry::new();
    for (schema, build) in actions {
        registry.register(ActionRegistration {
            name: schema.name,
            about: schema.about,
            args: schema.args,
            build,
        });
    }
    registry
}

/// Pretty-print a JSON value on stdout.
fn print_json(value: &Value) -> Result<(), CoreError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CoreError::InvalidInput {
        message: format!("cannot render response: {e}"),
    })?;
    println!("{text}");
    Ok(())
}
