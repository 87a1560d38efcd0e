//! Route handlers for the REST API.

pub mod forms;
pub mod health;
