//! formstep - server-rendered multi-step form wizards
//!
//! The [`wizard`] module is the engine: configuration, validation, session
//! state and step transitions. [`rest`] serves wizard definitions over HTTP.

pub mod config;
pub mod logging;
pub mod rest;
pub mod wizard;
