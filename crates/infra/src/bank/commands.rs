use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use ledgerflow_accounts::{AccountCommand, BankAccount};
use ledgerflow_core::{Aggregate, AggregateId};
use ledgerflow_events::{Command, EventChannel, execute};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::DispatchError;
use crate::event_sourcing::{EventSourcingHandler, JsonEnvelope};
use crate::event_store::EventStore;
use crate::mediator::RegistrationError;
use crate::projections::{AccountProjector, AccountView};
use crate::read_model::ReadStore;

/// Every command the bank accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankCommand {
    Account(AccountCommand),
    /// Administrative: drop and rebuild the accounts read model.
    RestoreReadModel,
}

impl From<AccountCommand> for BankCommand {
    fn from(value: AccountCommand) -> Self {
        BankCommand::Account(value)
    }
}

impl Command for BankCommand {
    fn command_type(&self) -> &'static str {
        match self {
            BankCommand::Account(c) => c.command_type(),
            BankCommand::RestoreReadModel => "restore-read-model",
        }
    }

    fn target_aggregate_id(&self) -> Option<AggregateId> {
        match self {
            BankCommand::Account(c) => c.target_aggregate_id(),
            BankCommand::RestoreReadModel => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandResult {
    Accepted {
        aggregate_id: AggregateId,
        version: u64,
        published: bool,
    },
    ReadModelRestored {
        events_replayed: u64,
        accounts: usize,
    },
}

/// Build the dispatcher with one handler per bank command type.
pub fn bank_command_dispatcher<S, C, R>(
    es: Arc<EventSourcingHandler<S, C>>,
    projector: Arc<AccountProjector<S, C, R>>,
) -> Result<CommandDispatcher<BankCommand, CommandResult>, RegistrationError>
where
    S: EventStore + 'static,
    C: EventChannel<JsonEnvelope> + 'static,
    R: ReadStore<AggregateId, AccountView> + 'static,
{
    let open = es.clone();
    let deposit = es.clone();
    let withdraw = es.clone();
    let close = es;

    Ok(CommandDispatcher::<BankCommand, CommandResult>::builder()
        .register("open-account", move |cmd| handle_account(&open, cmd))?
        .register("deposit-funds", move |cmd| handle_account(&deposit, cmd))?
        .register("withdraw-funds", move |cmd| handle_account(&withdraw, cmd))?
        .register("close-account", move |cmd| handle_account(&close, cmd))?
        .register("restore-read-model", move |_| {
            let summary = projector.rebuild()?;
            Ok(CommandResult::ReadModelRestored {
                events_replayed: summary.events_replayed,
                accounts: summary.accounts,
            })
        })?
        .build())
}

/// load → execute → save. Only `open-account` may target a stream that does
/// not exist yet.
fn handle_account<S, C>(es: &EventSourcingHandler<S, C>, command: BankCommand) -> Result<CommandResult, DispatchError>
where
    S: EventStore,
    C: EventChannel<JsonEnvelope>,
{
    let command = match command {
        BankCommand::Account(command) => command,
        other => {
            return Err(DispatchError::InvalidRequest(format!(
                "'{}' routed to an account handler",
                other.command_type()
            )));
        }
    };

    let id = command.account_id();
    let mut account = match es.load::<BankAccount>(id) {
        Ok(account) => account,
        Err(DispatchError::NotFound(_)) if matches!(command, AccountCommand::OpenAccount(_)) => {
            BankAccount::empty(id)
        }
        Err(err) => return Err(err),
    };

    let staged = execute(&mut account, &command)?;
    let outcome = es.save(&account, &staged)?;

    info!(
        command_type = command.command_type(),
        aggregate_id = %id,
        version = outcome.version,
        published = outcome.published,
        "command accepted"
    );
    Ok(CommandResult::Accepted {
        aggregate_id: id.0,
        version: outcome.version,
        published: outcome.published,
    })
}
