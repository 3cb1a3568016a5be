use std::time::Duration;

use civic_core::{ListingQuery, SessionIdentity, UserId, View};
use civic_live::LiveConfig;

/// Terminal client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Push channel endpoint (e.g. `ws://localhost:5000/live`).
    pub push_url: String,
    /// REST API origin (e.g. `http://localhost:5000`).
    pub api_url: String,
    /// Signed-in user, if any.
    pub user_id: Option<String>,
    pub is_admin: bool,
    /// Bearer token for REST calls.
    pub auth_token: Option<String>,
    /// Listing page to open on start.
    pub page: u32,
    /// Handshake timeout for the push channel.
    pub handshake_timeout: Duration,
}

impl WatchConfig {
    /// Load configuration from environment variables, falling back to a
    /// local development server.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        Self {
            push_url: var("CIVIC_PUSH_URL")
                .unwrap_or_else(|| "ws://localhost:5000/live".into()),
            api_url: var("CIVIC_API_URL")
                .unwrap_or_else(|| "http://localhost:5000".into())
                .trim_end_matches('/')
                .to_string(),
            user_id: var("CIVIC_USER_ID"),
            is_admin: var("CIVIC_IS_ADMIN")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            auth_token: var("CIVIC_AUTH_TOKEN"),
            page: var("CIVIC_PAGE").and_then(|v| v.parse().ok()).unwrap_or(1),
            handshake_timeout: Duration::from_secs(20),
        }
    }

    /// Identity the session starts with.
    pub fn identity(&self) -> SessionIdentity {
        match &self.user_id {
            Some(user_id) => SessionIdentity {
                user_id: Some(UserId::new(user_id.clone())),
                is_admin: self.is_admin,
                auth_token: self.auth_token.clone(),
            },
            None => SessionIdentity::anonymous(),
        }
    }

    /// View to open on start: the admin dashboard for admins.
    pub fn initial_view(&self) -> View {
        let query = ListingQuery::page(self.page);
        if self.is_admin && self.user_id.is_some() {
            View::AdminDashboard(query)
        } else {
            View::Listing(query)
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig::new(self.push_url.clone())
    }
}
