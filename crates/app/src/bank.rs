//! Composition root: wires the in-memory log, channel, read store, projector
//! and dispatchers into one `Bank` context.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use ledgerflow_core::AggregateId;
use ledgerflow_events::{ChannelError, InMemoryEventChannel};
use ledgerflow_infra::bank::{
    AccountQuery, BankCommand, CommandResult, bank_command_dispatcher, bank_query_dispatcher,
};
use ledgerflow_infra::command_dispatcher::CommandDispatcher;
use ledgerflow_infra::event_store::InMemoryEventStore;
use ledgerflow_infra::mediator::RegistrationError;
use ledgerflow_infra::projections::{AccountProjector, AccountView};
use ledgerflow_infra::query_dispatcher::QueryDispatcher;
use ledgerflow_infra::read_model::InMemoryReadStore;
use ledgerflow_infra::workers::{ChannelConsumer, ConsumerHandle};
use ledgerflow_infra::{CqrsConfig, EventSourcingHandler, JsonEnvelope};

use crate::request::{CommandRequest, QueryRequest, Request, RequestError, Response};

pub type Store = Arc<InMemoryEventStore>;
pub type Channel = Arc<InMemoryEventChannel<JsonEnvelope>>;
pub type Rows = Arc<InMemoryReadStore<AggregateId, AccountView>>;

pub struct Bank {
    config: CqrsConfig,
    es: Arc<EventSourcingHandler<Store, Channel>>,
    channel: Channel,
    projector: Arc<AccountProjector<Store, Channel, Rows>>,
    commands: CommandDispatcher<BankCommand, CommandResult>,
    queries: QueryDispatcher<AccountQuery, Vec<AccountView>>,
    consumer: Mutex<Option<ConsumerHandle>>,
}

impl Bank {
    pub fn in_memory(config: CqrsConfig) -> Result<Self, RegistrationError> {
        let channel: Channel = Arc::new(InMemoryEventChannel::new(config.partitions));
        let es = Arc::new(EventSourcingHandler::new(
            Arc::new(InMemoryEventStore::new()),
            channel.clone(),
            config.publish_retry,
        ));
        let rows: Rows = Arc::new(InMemoryReadStore::new());
        let projector = Arc::new(AccountProjector::new(es.clone(), rows.clone()));

        let commands = bank_command_dispatcher(es.clone(), projector.clone())?;
        let queries = bank_query_dispatcher(rows)?;
        info!(
            partitions = config.partitions,
            commands = ?commands.command_types(),
            queries = ?queries.query_types(),
            "bank wired"
        );

        Ok(Self {
            config,
            es,
            channel,
            projector,
            commands,
            queries,
            consumer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CqrsConfig {
        &self.config
    }

    pub fn event_sourcing(&self) -> &Arc<EventSourcingHandler<Store, Channel>> {
        &self.es
    }

    /// Run the projector on background partition threads.
    pub fn start_consumer(&self) -> std::io::Result<()> {
        let mut slot = self
            .consumer
            .lock()
            .map_err(|_| std::io::Error::other("consumer slot poisoned"))?;
        if slot.is_some() {
            return Ok(());
        }
        let projector = self.projector.clone();
        let handle = ChannelConsumer::spawn(
            "accounts-projector",
            self.channel.clone(),
            self.config.consumer_group.clone(),
            self.config.consumer_poll,
            move |env: &JsonEnvelope| projector.on(env).map(|_| ()),
        )?;
        *slot = Some(handle);
        Ok(())
    }

    /// Project everything published so far on the calling thread.
    ///
    /// No-op while a background consumer owns the partitions. The consumer
    /// slot stays locked for the whole drain, so concurrent catch-ups and
    /// `start_consumer` never read the same partition at once.
    pub fn catch_up(&self) -> Result<usize, ChannelError> {
        let slot = self.consumer.lock().map_err(|_| ChannelError::Poisoned)?;
        if slot.is_some() {
            return Ok(0);
        }
        let applied =
            ChannelConsumer::drain_partitions(&self.channel, &self.config.consumer_group, |env: &JsonEnvelope| {
                self.projector.on(env).map(|_| ())
            });
        drop(slot);
        applied
    }

    pub fn execute(&self, request: CommandRequest) -> Result<CommandResult, RequestError> {
        let command = request.into_command()?;
        Ok(self.commands.dispatch(command)?)
    }

    /// Run a query. Without a background consumer the read model is caught up
    /// first, so a query observes every command accepted before it.
    pub fn query(&self, request: QueryRequest) -> Result<Vec<AccountView>, RequestError> {
        let query = request.into_query()?;
        if let Err(err) = self.catch_up() {
            warn!(error = %err, "read model catch-up failed; answering from current rows");
        }
        Ok(self.queries.dispatch(query)?)
    }

    /// Handle one JSON request line.
    pub fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return RequestError::Malformed(e.to_string()).into(),
        };

        let result = match request {
            Request::Command(req) => self.execute(req).map(Response::ok),
            Request::Query(req) => self.query(req).map(Response::ok),
        };
        result.unwrap_or_else(|err| {
            warn!(code = err.code(), error = %err, "request failed");
            Response::from(err)
        })
    }

    /// Stop the background consumer (if any) and retry unpublished events once.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.consumer.lock() {
            if let Some(handle) = slot.take() {
                handle.shutdown();
            }
        }
        if self.es.pending_count() > 0 {
            if let Err(err) = self.es.republish_pending() {
                warn!(error = %err, pending = self.es.pending_count(), "unpublished events remain at shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};
    use std::time::{Duration, Instant};

    fn bank() -> Bank {
        Bank::in_memory(CqrsConfig::default().with_partitions(2).with_consumer_poll(Duration::from_millis(5))).unwrap()
    }

    fn call(bank: &Bank, request: JsonValue) -> JsonValue {
        bank.handle_line(&request.to_string()).to_json()
    }

    fn open(bank: &Bank, holder: &str, opening: u64) -> String {
        let response = call(
            bank,
            json!({"operation": "open-account", "payload": {"holder": holder, "accountType": "SAVINGS", "openingBalance": opening}}),
        );
        assert_eq!(response["ok"], true, "{response}");
        response["result"]["aggregateId"].as_str().unwrap().to_string()
    }

    #[test]
    fn json_lines_round_trip_scenario() {
        let bank = bank();
        let a = open(&bank, "Alice", 1000);
        let b = open(&bank, "Bob", 900);

        let deposit = call(
            &bank,
            json!({"operation": "deposit-funds", "aggregateId": a, "payload": {"amount": 300}}),
        );
        assert_eq!(deposit["result"], json!({"result": "accepted", "aggregateId": a, "version": 2, "published": true}));

        let overdraw = call(
            &bank,
            json!({"operation": "withdraw-funds", "aggregateId": b, "payload": {"amount": 901}}),
        );
        assert_eq!(overdraw["error"], "invariant_violation");

        let rich = call(
            &bank,
            json!({"query": "find-with-balance", "payload": {"comparator": "GREATER_THAN", "threshold": 1000}}),
        );
        let rows = rich["result"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["accountId"], json!(a));
        assert_eq!(rows[0]["balance"], 1300);
        assert_eq!(rows[0]["accountType"], "SAVINGS");
    }

    #[test]
    fn restore_read_model_reports_totals() {
        let bank = bank();
        open(&bank, "Alice", 10);
        let response = call(&bank, json!({"operation": "restore-read-model"}));
        assert_eq!(
            response["result"],
            json!({"result": "readModelRestored", "eventsReplayed": 1, "accounts": 1})
        );
        let all = call(&bank, json!({"query": "list-all"}));
        assert_eq!(all["result"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn malformed_and_unknown_requests_are_reported() {
        let bank = bank();
        assert_eq!(bank.handle_line("not json").to_json()["error"], "malformed_request");
        assert_eq!(
            call(&bank, json!({"operation": "transfer"}))["error"],
            "unregistered_command"
        );
        assert_eq!(call(&bank, json!({"query": "top-ten"}))["error"], "unregistered_query");
        assert_eq!(
            call(&bank, json!({"operation": "deposit-funds", "payload": {"amount": 1}}))["error"],
            "missing_aggregate_id"
        );
    }

    #[test]
    fn concurrent_queries_see_every_accepted_command() {
        let bank = bank();
        let a = open(&bank, "Alice", 100);
        for _ in 0..20 {
            let response = call(
                &bank,
                json!({"operation": "deposit-funds", "aggregateId": a, "payload": {"amount": 10}}),
            );
            assert_eq!(response["ok"], true, "{response}");
        }

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let found = call(&bank, json!({"query": "find-by-id", "payload": {"id": a}}));
                    assert_eq!(found["result"][0]["balance"], 300, "{found}");
                    assert_eq!(found["result"][0]["lastAppliedVersion"], 21, "{found}");
                });
            }
        });
    }

    #[test]
    fn background_consumer_projects_eventually() {
        let bank = bank();
        bank.start_consumer().unwrap();
        let a = open(&bank, "Alice", 42);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let found = call(&bank, json!({"query": "find-by-holder", "payload": {"holder": "Alice"}}));
            if found["ok"] == true && found["result"].as_array().is_some_and(|r| r.len() == 1) {
                assert_eq!(found["result"][0]["accountId"], json!(a));
                break;
            }
            assert!(Instant::now() < deadline, "projection did not catch up");
            std::thread::sleep(Duration::from_millis(5));
        }
        bank.shutdown();
    }
}
