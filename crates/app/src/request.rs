//! Request/response DTOs and mapping to/from typed commands and queries.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use ledgerflow_accounts::{
    AccountCommand, AccountId, AccountType, CloseAccount, DepositFunds, OpenAccount, WithdrawFunds,
};
use ledgerflow_core::{AggregateId, DomainError};
use ledgerflow_infra::DispatchError;
use ledgerflow_infra::bank::{AccountQuery, BalanceComparator, BankCommand};

// -------------------------
// Request DTOs
// -------------------------

/// `{operation, aggregateId?, payload}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub operation: String,
    #[serde(default)]
    pub aggregate_id: Option<AggregateId>,
    #[serde(default)]
    pub payload: JsonValue,
}

/// `{query, payload}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub payload: JsonValue,
}

/// One line of input: either a command or a query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Request {
    Command(CommandRequest),
    Query(QueryRequest),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAccountPayload {
    holder: String,
    account_type: AccountType,
    #[serde(default)]
    opening_balance: u64,
}

#[derive(Debug, Deserialize)]
struct AmountPayload {
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct FindByIdPayload {
    id: AccountId,
}

#[derive(Debug, Deserialize)]
struct FindByHolderPayload {
    holder: String,
}

#[derive(Debug, Deserialize)]
struct FindWithBalancePayload {
    comparator: BalanceComparator,
    threshold: u64,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("operation '{0}' requires an aggregateId")]
    MissingAggregateId(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl RequestError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Malformed(_) => "malformed_request",
            RequestError::MissingAggregateId(_) => "missing_aggregate_id",
            RequestError::Dispatch(err) => match err {
                DispatchError::Domain(DomainError::Validation(_)) => "validation_error",
                DispatchError::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
                DispatchError::Domain(DomainError::Conflict(_)) => "conflict",
                DispatchError::Domain(DomainError::NotFound) | DispatchError::NotFound(_) => "not_found",
                DispatchError::Domain(DomainError::InvalidId(_)) => "invalid_id",
                DispatchError::ConcurrencyConflict { .. } => "concurrency_conflict",
                DispatchError::UnregisteredCommand(_) => "unregistered_command",
                DispatchError::UnregisteredQuery(_) => "unregistered_query",
                DispatchError::InvalidRequest(_) => "invalid_request",
                DispatchError::TransientInfra(_) => "unavailable",
                DispatchError::CorruptStream(_) => "corrupt_stream",
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Dispatch(err) if err.is_retryable())
    }
}

fn payload<T: serde::de::DeserializeOwned>(value: JsonValue) -> Result<T, RequestError> {
    serde_json::from_value(value).map_err(|e| RequestError::Malformed(e.to_string()))
}

impl CommandRequest {
    /// Map onto a typed command. `open-account` without an `aggregateId`
    /// gets a fresh one; unknown operations are left for the dispatcher to reject.
    pub fn into_command(self) -> Result<BankCommand, RequestError> {
        let occurred_at = Utc::now();
        let operation = self.operation.as_str();
        let require_id = |id: Option<AggregateId>| {
            id.map(AccountId::new)
                .ok_or_else(|| RequestError::MissingAggregateId(operation.to_string()))
        };

        let command = match operation {
            "open-account" => {
                let p: OpenAccountPayload = payload(self.payload)?;
                AccountCommand::OpenAccount(OpenAccount {
                    account_id: AccountId::new(self.aggregate_id.unwrap_or_default()),
                    holder: p.holder,
                    account_type: p.account_type,
                    opening_balance: p.opening_balance,
                    occurred_at,
                })
            }
            "deposit-funds" => {
                let p: AmountPayload = payload(self.payload)?;
                AccountCommand::DepositFunds(DepositFunds {
                    account_id: require_id(self.aggregate_id)?,
                    amount: p.amount,
                    occurred_at,
                })
            }
            "withdraw-funds" => {
                let p: AmountPayload = payload(self.payload)?;
                AccountCommand::WithdrawFunds(WithdrawFunds {
                    account_id: require_id(self.aggregate_id)?,
                    amount: p.amount,
                    occurred_at,
                })
            }
            "close-account" => AccountCommand::CloseAccount(CloseAccount {
                account_id: require_id(self.aggregate_id)?,
                occurred_at,
            }),
            "restore-read-model" => return Ok(BankCommand::RestoreReadModel),
            other => return Err(DispatchError::UnregisteredCommand(other.to_string()).into()),
        };
        Ok(command.into())
    }
}

impl QueryRequest {
    pub fn into_query(self) -> Result<AccountQuery, RequestError> {
        match self.query.as_str() {
            "list-all" => Ok(AccountQuery::ListAll),
            "find-by-id" => {
                let p: FindByIdPayload = payload(self.payload)?;
                Ok(AccountQuery::FindById { account_id: p.id })
            }
            "find-by-holder" => {
                let p: FindByHolderPayload = payload(self.payload)?;
                Ok(AccountQuery::FindByHolder { holder: p.holder })
            }
            "find-with-balance" => {
                let p: FindWithBalancePayload = payload(self.payload)?;
                Ok(AccountQuery::FindWithBalance {
                    comparator: p.comparator,
                    threshold: p.threshold,
                })
            }
            other => Err(DispatchError::UnregisteredQuery(other.to_string()).into()),
        }
    }
}

// -------------------------
// Response
// -------------------------

/// One line of output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success { ok: bool, result: JsonValue },
    Failure {
        ok: bool,
        error: &'static str,
        message: String,
        retryable: bool,
    },
}

impl Response {
    pub fn ok(result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Response::Success { ok: true, result },
            Err(e) => Response::from(RequestError::Malformed(format!("unserializable result: {e}"))),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "ok": false }))
    }
}

impl From<RequestError> for Response {
    fn from(err: RequestError) -> Self {
        Response::Failure {
            ok: false,
            error: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
