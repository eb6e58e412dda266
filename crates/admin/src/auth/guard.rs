//! Route guard state machine.

use campaign_core::Profile;

use super::SessionState;

/// Login entry point, where unauthenticated visitors are sent.
pub const LOGIN_PATH: &str = "/admin/login";

/// Landing page after a successful sign-in.
pub const DASHBOARD_PATH: &str = "/admin/dashboard";

/// What a protected page should do for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// A bootstrap is in flight: render a placeholder, never redirect.
    Loading,
    /// An administrator is signed in: render the page.
    Authenticated(Profile),
    /// Nobody is signed in: redirect to [`LOGIN_PATH`].
    Unauthenticated,
}

impl GuardState {
    /// Where to send the visitor instead of rendering, if anywhere.
    #[must_use]
    pub const fn redirect_target(&self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated => Some(LOGIN_PATH),
            Self::Loading | Self::Authenticated(_) => None,
        }
    }
}

impl From<&SessionState> for GuardState {
    fn from(state: &SessionState) -> Self {
        if state.is_loading() {
            return Self::Loading;
        }
        state
            .profile()
            .map_or(Self::Unauthenticated, |profile| {
                Self::Authenticated(profile.clone())
            })
    }
}
