//! Campaign Core - Shared types library.
//!
//! This crate provides common types used across the campaign back-office:
//! - `admin` - Administrative back-office server (login, guarded pages)
//! - `cli` - Command-line tools for provisioning administrator accounts
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. Both the
//! server and the provisioning CLI speak to the hosted backend, and they
//! agree on the shape of a `users` row through the types defined here.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for identifiers, emails, roles, and profiles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
