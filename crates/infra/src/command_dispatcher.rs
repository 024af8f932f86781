//! Command dispatch: routes each command to the single handler registered
//! for its type.
//!
//! ```text
//! Command → CommandDispatcher::dispatch → handler (load → execute → save)
//! ```
//!
//! Registration happens once, at startup, through [`CommandDispatcherBuilder`];
//! registering the same command type twice is a configuration error. The
//! dispatcher itself is immutable and shareable across threads.

use tracing::{debug, warn};

use ledgerflow_events::Command;

use crate::error::DispatchError;
use crate::mediator::{HandlerRegistry, RegistrationError};

pub struct CommandDispatcher<C, R> {
    handlers: HandlerRegistry<C, R>,
}

pub struct CommandDispatcherBuilder<C, R> {
    handlers: HandlerRegistry<C, R>,
}

impl<C, R> CommandDispatcherBuilder<C, R> {
    pub fn register<F>(mut self, command_type: &'static str, handler: F) -> Result<Self, RegistrationError>
    where
        F: Fn(C) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        self.handlers.register(command_type, handler)?;
        Ok(self)
    }

    pub fn build(self) -> CommandDispatcher<C, R> {
        CommandDispatcher {
            handlers: self.handlers,
        }
    }
}

impl<C, R> CommandDispatcher<C, R> {
    pub fn builder() -> CommandDispatcherBuilder<C, R> {
        CommandDispatcherBuilder {
            handlers: HandlerRegistry::new("command"),
        }
    }

    /// Registered command types, sorted.
    pub fn command_types(&self) -> Vec<&'static str> {
        self.handlers.keys()
    }
}

impl<C, R> CommandDispatcher<C, R>
where
    C: Command,
{
    /// Send a command to its handler.
    ///
    /// Returns `UnregisteredCommand` if no handler exists for the command's type;
    /// otherwise whatever the handler returns.
    pub fn dispatch(&self, command: C) -> Result<R, DispatchError> {
        let command_type = command.command_type();
        let Some(handler) = self.handlers.get(command_type) else {
            warn!(command_type, "no handler registered");
            return Err(DispatchError::UnregisteredCommand(command_type.to_string()));
        };

        debug!(
            command_type,
            aggregate_id = ?command.target_aggregate_id(),
            "dispatching command"
        );
        handler(command)
    }
}

impl<C, R> core::fmt::Debug for CommandDispatcher<C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("handlers", &self.handlers)
            .finish()
    }
}
