//! Type-keyed handler registry shared by the command and query dispatchers.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::DispatchError;

/// Handler function type: takes the message by value, returns a result.
pub type Handler<M, R> = Box<dyn Fn(M) -> Result<R, DispatchError> + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("a {kind} handler is already registered for '{key}'")]
    Duplicate { kind: &'static str, key: String },
}

/// Exactly one handler per message type key.
pub struct HandlerRegistry<M, R> {
    kind: &'static str,
    handlers: HashMap<&'static str, Handler<M, R>>,
}

impl<M, R> HandlerRegistry<M, R> {
    /// `kind` names the message family in errors ("command", "query").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `key`; a second registration for the same key fails.
    pub fn register<F>(&mut self, key: &'static str, handler: F) -> Result<(), RegistrationError>
    where
        F: Fn(M) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(key) {
            return Err(RegistrationError::Duplicate {
                kind: self.kind,
                key: key.to_string(),
            });
        }
        self.handlers.insert(key, Box::new(handler));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Handler<M, R>> {
        self.handlers.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.handlers.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl<M, R> core::fmt::Debug for HandlerRegistry<M, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kind", &self.kind)
            .field("keys", &self.keys())
            .finish()
    }
}
