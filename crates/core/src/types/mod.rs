//! Core types for the campaign back-office.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod profile;
pub mod role;

pub use email::{Email, EmailError};
pub use id::*;
pub use profile::Profile;
pub use role::{Role, RoleError};
