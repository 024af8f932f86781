use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::sync::Arc;

use ledgerflow_accounts::{AccountCommand, AccountId, AccountType, BankAccount, DepositFunds, OpenAccount};
use ledgerflow_core::{Aggregate, AggregateId};
use ledgerflow_events::{InMemoryEventChannel, execute};
use ledgerflow_infra::event_sourcing::{EventSourcingHandler, JsonEnvelope};
use ledgerflow_infra::event_store::{EventStore, InMemoryEventStore};
use ledgerflow_infra::projections::{AccountProjector, AccountView};
use ledgerflow_infra::read_model::InMemoryReadStore;
use ledgerflow_infra::retry::RetryPolicy;

type Es = EventSourcingHandler<Arc<InMemoryEventStore>, Arc<InMemoryEventChannel<JsonEnvelope>>>;

fn handler() -> Arc<Es> {
    Arc::new(EventSourcingHandler::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventChannel::new(4)),
        RetryPolicy::no_retry(),
    ))
}

fn open(es: &Es, id: AccountId) {
    let mut account = BankAccount::empty(id);
    let staged = execute(
        &mut account,
        &AccountCommand::OpenAccount(OpenAccount {
            account_id: id,
            holder: "bench".to_string(),
            account_type: AccountType::Current,
            opening_balance: 0,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    es.save(&account, &staged).unwrap();
}

fn deposit(es: &Es, id: AccountId) {
    let mut account: BankAccount = es.load(id).unwrap();
    let staged = execute(
        &mut account,
        &AccountCommand::DepositFunds(DepositFunds {
            account_id: id,
            amount: 1,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    es.save(&account, &staged).unwrap();
}

fn seeded(accounts: usize, deposits: usize) -> (Arc<Es>, Vec<AccountId>) {
    let es = handler();
    let ids: Vec<_> = (0..accounts).map(|_| AccountId::new(AggregateId::new())).collect();
    for id in &ids {
        open(&es, *id);
        for _ in 0..deposits {
            deposit(&es, *id);
        }
    }
    (es, ids)
}

/// Full command path: load → execute → append → publish.
fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution");
    for history in [0usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, &history| {
            let (es, ids) = seeded(1, history);
            b.iter(|| deposit(&es, black_box(ids[0])));
        });
    }
    group.finish();
}

fn bench_load_and_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_reconstruct");
    for history in [10usize, 100, 1000] {
        let (es, ids) = seeded(1, history);
        group.throughput(Throughput::Elements(history as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(history), &ids[0], |b, id| {
            b.iter(|| {
                let account: BankAccount = es.load(black_box(*id)).unwrap();
                black_box(account.balance())
            });
        });
    }
    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_stream", |b| {
        let es = handler();
        let id = AccountId::new(AggregateId::new());
        open(&es, id);
        b.iter(|| deposit(&es, id));
    });
    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");
    for accounts in [10usize, 100] {
        let (es, _) = seeded(accounts, 10);
        let events = es.store().scan_all().count() as u64;
        let rows: Arc<InMemoryReadStore<AggregateId, AccountView>> = Arc::new(InMemoryReadStore::new());
        let projector = AccountProjector::new(es.clone(), rows);

        group.throughput(Throughput::Elements(events));
        group.bench_with_input(BenchmarkId::from_parameter(accounts), &accounts, |b, _| {
            b.iter(|| projector.rebuild().unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_load_and_reconstruct,
    bench_event_append_throughput,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
