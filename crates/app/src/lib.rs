//! Application edge: composition root and the JSON request/response surface.

pub mod bank;
pub mod request;

pub use bank::Bank;
pub use request::{CommandRequest, QueryRequest, Request, RequestError, Response};
