//! Bank account command and query handlers, wired onto the generic dispatchers.

pub mod commands;
pub mod queries;

pub use commands::{BankCommand, CommandResult, bank_command_dispatcher};
pub use queries::{AccountQuery, BalanceComparator, bank_query_dispatcher};
