//! Credential lifecycle and list management for Microsoft To Do.
//!
//! The heart of this crate is [`credential::Credential`], which obtains,
//! refreshes and hands out OAuth2 access tokens for the Microsoft identity
//! platform. The remaining modules load and persist the configuration,
//! talk to the To Do lists API and render the results.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod callback;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod opener;
pub mod protocol;
pub mod table;
pub mod todo;
pub mod tokens;
