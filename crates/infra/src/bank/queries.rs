use serde::{Deserialize, Serialize};

use ledgerflow_accounts::AccountId;
use ledgerflow_core::AggregateId;
use ledgerflow_events::Query;

use crate::error::DispatchError;
use crate::mediator::RegistrationError;
use crate::projections::AccountView;
use crate::query_dispatcher::QueryDispatcher;
use crate::read_model::ReadStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceComparator {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl BalanceComparator {
    pub fn matches(self, balance: u64, threshold: u64) -> bool {
        match self {
            BalanceComparator::GreaterThan => balance > threshold,
            BalanceComparator::LessThan => balance < threshold,
            BalanceComparator::EqualTo => balance == threshold,
        }
    }
}

/// Read-side queries over the accounts projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountQuery {
    ListAll,
    FindById { account_id: AccountId },
    FindByHolder { holder: String },
    FindWithBalance { comparator: BalanceComparator, threshold: u64 },
}

impl Query for AccountQuery {
    fn query_type(&self) -> &'static str {
        match self {
            AccountQuery::ListAll => "list-all",
            AccountQuery::FindById { .. } => "find-by-id",
            AccountQuery::FindByHolder { .. } => "find-by-holder",
            AccountQuery::FindWithBalance { .. } => "find-with-balance",
        }
    }
}

/// Build the dispatcher with one reader per query type.
pub fn bank_query_dispatcher<R>(store: R) -> Result<QueryDispatcher<AccountQuery, Vec<AccountView>>, RegistrationError>
where
    R: ReadStore<AggregateId, AccountView> + Clone + 'static,
{
    let (all, by_id, by_holder) = (store.clone(), store.clone(), store.clone());

    Ok(QueryDispatcher::<AccountQuery, Vec<AccountView>>::builder()
        .register("list-all", move |_| Ok(all.list()?))?
        .register("find-by-id", move |query| match query {
            AccountQuery::FindById { account_id } => by_id
                .get(&account_id.0)?
                .map(|row| vec![row])
                .ok_or_else(|| DispatchError::NotFound(format!("account {account_id}"))),
            other => Err(misrouted(&other)),
        })?
        .register("find-by-holder", move |query| match query {
            AccountQuery::FindByHolder { holder } => Ok(by_holder.find(&|row| row.holder == holder)?),
            other => Err(misrouted(&other)),
        })?
        .register("find-with-balance", move |query| match query {
            AccountQuery::FindWithBalance { comparator, threshold } => {
                Ok(store.find(&|row| comparator.matches(row.balance, threshold))?)
            }
            other => Err(misrouted(&other)),
        })?
        .build())
}

fn misrouted(query: &AccountQuery) -> DispatchError {
    DispatchError::InvalidRequest(format!("'{}' routed to the wrong handler", query.query_type()))
}
