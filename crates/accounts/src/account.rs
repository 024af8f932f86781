use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};
use ledgerflow_events::{Command, Event, execute};

/// Account identifier (the aggregate id of the account stream).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl From<AggregateId> for AccountId {
    fn from(value: AggregateId) -> Self {
        Self(value)
    }
}

impl From<AccountId> for AggregateId {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Savings,
    Current,
}

/// Aggregate root: BankAccount.
///
/// Only ever obtained by folding the account's events; there is no stored
/// snapshot. Balances are in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    id: AccountId,
    holder: String,
    account_type: Option<AccountType>,
    balance: u64,
    opened_at: Option<DateTime<Utc>>,
    opened: bool,
    closed: bool,
    version: u64,
}

impl BankAccount {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn account_type(&self) -> Option<AccountType> {
        self.account_type
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Open the account: validates, applies, and returns the staged events.
    pub fn open(&mut self, cmd: OpenAccount) -> DomainResult<Vec<AccountEvent>> {
        execute(self, &AccountCommand::OpenAccount(cmd))
    }

    pub fn deposit(&mut self, cmd: DepositFunds) -> DomainResult<Vec<AccountEvent>> {
        execute(self, &AccountCommand::DepositFunds(cmd))
    }

    pub fn withdraw(&mut self, cmd: WithdrawFunds) -> DomainResult<Vec<AccountEvent>> {
        execute(self, &AccountCommand::WithdrawFunds(cmd))
    }

    pub fn close(&mut self, cmd: CloseAccount) -> DomainResult<Vec<AccountEvent>> {
        execute(self, &AccountCommand::CloseAccount(cmd))
    }
}

impl AggregateRoot for BankAccount {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub account_id: AccountId,
    pub holder: String,
    pub account_type: AccountType,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DepositFunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFunds {
    pub account_id: AccountId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawFunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFunds {
    pub account_id: AccountId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAccount {
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    OpenAccount(OpenAccount),
    DepositFunds(DepositFunds),
    WithdrawFunds(WithdrawFunds),
    CloseAccount(CloseAccount),
}

impl AccountCommand {
    pub fn account_id(&self) -> AccountId {
        match self {
            AccountCommand::OpenAccount(c) => c.account_id,
            AccountCommand::DepositFunds(c) => c.account_id,
            AccountCommand::WithdrawFunds(c) => c.account_id,
            AccountCommand::CloseAccount(c) => c.account_id,
        }
    }
}

impl Command for AccountCommand {
    fn command_type(&self) -> &'static str {
        match self {
            AccountCommand::OpenAccount(_) => "open-account",
            AccountCommand::DepositFunds(_) => "deposit-funds",
            AccountCommand::WithdrawFunds(_) => "withdraw-funds",
            AccountCommand::CloseAccount(_) => "close-account",
        }
    }

    fn target_aggregate_id(&self) -> Option<AggregateId> {
        Some(self.account_id().0)
    }
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOpened {
    pub account_id: AccountId,
    pub holder: String,
    pub account_type: AccountType,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FundsDeposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsDeposited {
    pub account_id: AccountId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FundsWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsWithdrawn {
    pub account_id: AccountId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccountClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClosed {
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Account events. The serde tag is the envelope `type`, the content its `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AccountEvent {
    AccountOpened(AccountOpened),
    FundsDeposited(FundsDeposited),
    FundsWithdrawn(FundsWithdrawn),
    AccountClosed(AccountClosed),
}

impl AccountEvent {
    pub fn account_id(&self) -> AccountId {
        match self {
            AccountEvent::AccountOpened(e) => e.account_id,
            AccountEvent::FundsDeposited(e) => e.account_id,
            AccountEvent::FundsWithdrawn(e) => e.account_id,
            AccountEvent::AccountClosed(e) => e.account_id,
        }
    }
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened(_) => "AccountOpened",
            AccountEvent::FundsDeposited(_) => "FundsDeposited",
            AccountEvent::FundsWithdrawn(_) => "FundsWithdrawn",
            AccountEvent::AccountClosed(_) => "AccountClosed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::AccountOpened(e) => e.occurred_at,
            AccountEvent::FundsDeposited(e) => e.occurred_at,
            AccountEvent::FundsWithdrawn(e) => e.occurred_at,
            AccountEvent::AccountClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BankAccount {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn empty(id: AccountId) -> Self {
        Self {
            id,
            holder: String::new(),
            account_type: None,
            balance: 0,
            opened_at: None,
            opened: false,
            closed: false,
            version: 0,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountOpened(e) => {
                self.id = e.account_id;
                self.holder = e.holder.clone();
                self.account_type = Some(e.account_type);
                self.balance = e.opening_balance;
                self.opened_at = Some(e.occurred_at);
                self.opened = true;
            }
            AccountEvent::FundsDeposited(e) => {
                self.balance = self.balance.saturating_add(e.amount);
            }
            AccountEvent::FundsWithdrawn(e) => {
                self.balance = self.balance.saturating_sub(e.amount);
            }
            AccountEvent::AccountClosed(_) => {
                self.closed = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.account_id() != self.id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        match command {
            AccountCommand::OpenAccount(cmd) => self.handle_open(cmd),
            AccountCommand::DepositFunds(cmd) => self.handle_deposit(cmd),
            AccountCommand::WithdrawFunds(cmd) => self.handle_withdraw(cmd),
            AccountCommand::CloseAccount(cmd) => self.handle_close(cmd),
        }
    }
}

impl BankAccount {
    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        if self.closed {
            return Err(DomainError::invariant("account closed"));
        }
        Ok(())
    }

    fn ensure_positive(amount: u64) -> Result<(), DomainError> {
        if amount == 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.opened {
            return Err(DomainError::conflict("account already opened"));
        }
        if cmd.holder.trim().is_empty() {
            return Err(DomainError::validation("holder cannot be empty"));
        }
        Ok(vec![AccountEvent::AccountOpened(AccountOpened {
            account_id: cmd.account_id,
            holder: cmd.holder.trim().to_string(),
            account_type: cmd.account_type,
            opening_balance: cmd.opening_balance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deposit(&self, cmd: &DepositFunds) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_active()?;
        Self::ensure_positive(cmd.amount)?;
        if self.balance.checked_add(cmd.amount).is_none() {
            return Err(DomainError::invariant("balance overflow"));
        }
        Ok(vec![AccountEvent::FundsDeposited(FundsDeposited {
            account_id: cmd.account_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &WithdrawFunds) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_active()?;
        Self::ensure_positive(cmd.amount)?;
        if cmd.amount > self.balance {
            return Err(DomainError::invariant("insufficient funds"));
        }
        Ok(vec![AccountEvent::FundsWithdrawn(FundsWithdrawn {
            account_id: cmd.account_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        if self.closed {
            return Err(DomainError::invariant("account already closed"));
        }
        Ok(vec![AccountEvent::AccountClosed(AccountClosed {
            account_id: cmd.account_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
