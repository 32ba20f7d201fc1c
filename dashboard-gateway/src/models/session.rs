use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::models::user::CanonicalUser;

/// Single key under which the whole session record is stored, so that
/// replacing or invalidating credentials is one write, never two.
pub const SESSION_KEY: &str = "dashboard.session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Landlord,
    Tenant,
    Agent,
    PropertyManager,
    MaintenanceStaff,
}

impl Role {
    /// Dashboard root the role lands on after sign-in.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Tenant => "/dashboard/tenant",
            _ => "/dashboard",
        }
    }

    /// Map the backend's role string, tolerating values this gateway does
    /// not know about. Unknown roles get the landlord dashboard.
    pub fn from_backend(role: &str) -> Self {
        match role {
            "tenant" => Role::Tenant,
            "agent" => Role::Agent,
            "property_manager" => Role::PropertyManager,
            "maintenance_staff" => Role::MaintenanceStaff,
            _ => Role::Landlord,
        }
    }
}

/// Per-user session record persisted in the cookie-backed session store.
///
/// `access_token` is the identity assertion accepted by the property backend
/// as a bearer credential; `token_expiry` mirrors the assertion's `exp`
/// claim in epoch milliseconds. The provider refresh token is echoed here so
/// a fresh assertion can be re-derived without interactive sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: Option<String>,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: Role,
    pub token_expiry: Option<i64>,
    pub provider_refresh_token: Option<String>,
}

impl SessionData {
    pub fn from_sign_in(
        user: CanonicalUser,
        token_expiry: Option<i64>,
        provider_refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: Some(user.access_token),
            user_id: user.id,
            email: user.email,
            name: user.name,
            image: user.image,
            role: user.role,
            token_expiry,
            provider_refresh_token,
        }
    }

    /// Replace the credential fields with freshly-derived values.
    ///
    /// Consumes the old record: the previous token is discarded, never
    /// retried, and there is no state in which only part of the credential
    /// has been swapped.
    pub fn with_refreshed(self, access_token: String, user_id: String, token_expiry: i64) -> Self {
        Self {
            access_token: Some(access_token),
            user_id,
            token_expiry: Some(token_expiry),
            ..self
        }
    }

    /// Drop the credential entirely. Token and expiry always go together:
    /// an expired-but-present token must never survive a failed refresh.
    pub fn invalidated(self) -> Self {
        Self {
            access_token: None,
            token_expiry: None,
            ..self
        }
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Read the session record, tolerating decode failures as absence.
pub async fn load(session: &Session) -> Option<SessionData> {
    session.get(SESSION_KEY).await.ok().flatten()
}

pub async fn store(
    session: &Session,
    data: &SessionData,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(SESSION_KEY, data).await
}
