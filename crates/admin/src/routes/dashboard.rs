//! Dashboard route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Router, routing::get};
use tracing::instrument;

use crate::auth::DASHBOARD_PATH;
use crate::backend::Backend;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// A content area of the back-office.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub title: &'static str,
    pub description: &'static str,
    /// CSS modifier for the card accent.
    pub accent: &'static str,
}

/// Content areas, in display order. Their management screens live outside
/// this application.
pub const SECTIONS: [Section; 6] = [
    Section {
        title: "Actualités",
        description: "Gérer les articles et communiqués",
        accent: "news",
    },
    Section {
        title: "Vidéos",
        description: "Gérer les discours et vidéos",
        accent: "videos",
    },
    Section {
        title: "Messages citoyens",
        description: "Modérer les messages reçus",
        accent: "messages",
    },
    Section {
        title: "Dons",
        description: "Suivre les contributions",
        accent: "donations",
    },
    Section {
        title: "Newsletter",
        description: "Gérer les abonnés",
        accent: "newsletter",
    },
    Section {
        title: "Programme",
        description: "Modifier les sections du programme",
        accent: "program",
    },
];

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    /// Name, or email when the profile has no name.
    pub display_name: String,
    pub sections: &'static [Section],
}

/// Build the dashboard router.
pub fn router<B: Backend>() -> Router<AppState<B>> {
    Router::new().route(DASHBOARD_PATH, get(index))
}

/// Display the dashboard.
///
/// GET /admin/dashboard
#[instrument(skip_all)]
async fn index(RequireAdmin(profile): RequireAdmin) -> DashboardTemplate {
    DashboardTemplate {
        display_name: profile.display_name().to_string(),
        sections: &SECTIONS,
    }
}
