//! Bank account domain module (event-sourced).
//!
//! This crate contains the business rules for accounts, implemented purely as
//! deterministic domain logic (no IO, no storage, no transport).

pub mod account;

pub use account::{
    AccountClosed, AccountCommand, AccountEvent, AccountId, AccountOpened, AccountType,
    BankAccount, CloseAccount, DepositFunds, FundsDeposited, FundsWithdrawn, OpenAccount,
    WithdrawFunds,
};
