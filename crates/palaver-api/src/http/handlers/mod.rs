//! HTTP request handlers for the REST API.

pub mod chat;
pub mod context;
pub mod history;
pub mod limits;
