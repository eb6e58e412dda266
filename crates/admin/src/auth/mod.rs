//! Administrative authentication.
//!
//! - [`ProfileResolver`] maps an identity to its `users` row.
//! - [`SessionStore`] holds one visitor's signed-in profile and loading flag,
//!   and performs sign-in, sign-out and session bootstrap.
//! - [`GuardState`] is the gate evaluated in front of every back-office page.

mod error;
mod guard;
mod profile;
mod session;

pub use error::SignInError;
pub use guard::{DASHBOARD_PATH, GuardState, LOGIN_PATH};
pub use profile::ProfileResolver;
pub use session::{SessionState, SessionStore};
