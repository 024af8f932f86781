//! Query dispatch: routes each query to the handler registered for its type.
//!
//! Queries read only from the read model; they never touch the event log.

use tracing::{debug, warn};

use ledgerflow_events::Query;

use crate::error::DispatchError;
use crate::mediator::{HandlerRegistry, RegistrationError};

pub struct QueryDispatcher<Q, R> {
    handlers: HandlerRegistry<Q, R>,
}

pub struct QueryDispatcherBuilder<Q, R> {
    handlers: HandlerRegistry<Q, R>,
}

impl<Q, R> QueryDispatcherBuilder<Q, R> {
    pub fn register<F>(mut self, query_type: &'static str, handler: F) -> Result<Self, RegistrationError>
    where
        F: Fn(Q) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        self.handlers.register(query_type, handler)?;
        Ok(self)
    }

    pub fn build(self) -> QueryDispatcher<Q, R> {
        QueryDispatcher {
            handlers: self.handlers,
        }
    }
}

impl<Q, R> QueryDispatcher<Q, R> {
    pub fn builder() -> QueryDispatcherBuilder<Q, R> {
        QueryDispatcherBuilder {
            handlers: HandlerRegistry::new("query"),
        }
    }

    pub fn query_types(&self) -> Vec<&'static str> {
        self.handlers.keys()
    }
}

impl<Q, R> QueryDispatcher<Q, R>
where
    Q: Query,
{
    pub fn dispatch(&self, query: Q) -> Result<R, DispatchError> {
        let query_type = query.query_type();
        let Some(handler) = self.handlers.get(query_type) else {
            warn!(query_type, "no handler registered");
            return Err(DispatchError::UnregisteredQuery(query_type.to_string()));
        };
        debug!(query_type, "dispatching query");
        handler(query)
    }
}

impl<Q, R> core::fmt::Debug for QueryDispatcher<Q, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("handlers", &self.handlers)
            .finish()
    }
}
