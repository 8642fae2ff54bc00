// ── Actions ──
//
// An action is one unit of work selected by the CLI subcommand. Each
// registration contributes its clap argument schema and builds the action
// from the parsed matches; the coordinator invokes it exactly once.

use clap::{ArgMatches, Command};
use mbs_api::{CheckedSession, Interrupt, WampClient};

use crate::error::CoreError;

/// What an action gets to work with.
pub struct ActionContext<'a> {
    pub http: &'a CheckedSession,
    pub pubsub: &'a WampClient,
    /// Raised by Ctrl-C. Pub/sub requests fail on their own once it is;
    /// actions doing several HTTP requests should check it between them.
    pub interrupt: &'a Interrupt,
}

/// A pluggable unit of work.
pub trait Action {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<(), CoreError>;
}

/// Adds an action's arguments to its subcommand.
pub type ArgsFn = fn(Command) -> Command;

/// Builds the action from its parsed arguments.
pub type BuildFn = fn(&ArgMatches) -> Result<Box<dyn Action>, CoreError>;

/// One registered action.
#[derive(Clone)]
pub struct ActionRegistration {
    pub name: &'static str,
    pub about: &'static str,
    pub args: ArgsFn,
    pub build: BuildFn,
}

impl ActionRegistration {
    /// The action's subcommand with its argument schema.
    pub fn command(&self) -> Command {
        (self.args)(Command::new(self.name).about(self.about))
    }
}

/// Name → registration, in registration order.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: Vec<ActionRegistration>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration. A later registration replaces one with the same name.
    pub fn register(&mut self, registration: ActionRegistration) -> &mut Self {
        self.actions.retain(|a| a.name != registration.name);
        self.actions.push(registration);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ActionRegistration> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.iter().map(|a| a.name)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Attach every action as a subcommand of `cmd`.
    pub fn augment(&self, cmd: Command) -> Command {
        self.actions
            .iter()
            .fold(cmd, |cmd, action| cmd.subcommand(action.command()))
    }

    /// Build the action selected in `matches`.
    ///
    /// `Ok(None)` when no subcommand was given.
    pub fn resolve(&self, matches: &ArgMatches) -> Result<Option<Box<dyn Action>>, CoreError> {
        let Some((name, sub)) = matches.subcommand() else {
            return Ok(None);
        };
        let registration = self.get(name).ok_or_else(|| CoreError::UnknownAction {
            name: name.to_owned(),
        })?;
        (registration.build)(sub).map(Some)
    }
}
