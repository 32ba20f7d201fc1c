use async_trait::async_trait;

use crate::models::session::SessionData;
use crate::models::user::CanonicalUser;
use crate::services::identity_client::ExchangeError;
use crate::utils::jwt;

/// Refresh this long before the assertion expires, so a request never goes
/// out with a token that dies mid-flight, and the user never sees a 401
/// round trip for a token the gateway knew was about to lapse.
pub const REFRESH_THRESHOLD_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Usable as-is.
    Fresh,
    /// Inside the refresh window (or past expiry): derive a new assertion.
    NearingExpiry,
    /// No expiry recorded: pass through unchanged, never refresh.
    Untracked,
}

pub fn assess(now_ms: i64, token_expiry: Option<i64>) -> TokenState {
    match token_expiry {
        None => TokenState::Untracked,
        Some(expiry) if now_ms > expiry - REFRESH_THRESHOLD_MS => TokenState::NearingExpiry,
        Some(_) => TokenState::Fresh,
    }
}

/// Source of freshly-derived identity assertions.
///
/// Implementations must derive from the live identity-provider session, not
/// replay a stored assertion. `None` means no live session exists.
#[async_trait]
pub trait AssertionSource: Send + Sync {
    async fn live_assertion(&self) -> Option<String>;
}

/// The credential-exchange seam, so the policy can be exercised with fakes.
#[async_trait]
pub trait CredentialExchanger: Send + Sync {
    async fn exchange(&self, identity_assertion: &str)
    -> Result<CanonicalUser, ExchangeError>;
}

/// Evaluate the session's credential and refresh it when it is about to
/// expire.
///
/// Runs on every session read; there is no background timer and no locking.
/// Two concurrent reads inside the refresh window may both derive a new
/// assertion; the provider-side refresh is idempotent, so the second result
/// simply wins. On any failure the credential fields are dropped together;
/// an expired token is never handed back.
pub async fn refresh_if_needed(
    session: SessionData,
    now_ms: i64,
    assertions: &dyn AssertionSource,
    exchanger: &dyn CredentialExchanger,
) -> SessionData {
    match assess(now_ms, session.token_expiry) {
        TokenState::Untracked | TokenState::Fresh => session,
        TokenState::NearingExpiry => {
            let Some(assertion) = assertions.live_assertion().await else {
                tracing::warn!(user_id = %session.user_id, "no live identity session, dropping credentials");
                return session.invalidated();
            };

            let token_expiry = match jwt::expiry_ms(&assertion) {
                Ok(expiry) => expiry,
                Err(error) => {
                    tracing::warn!(error = %error, "fresh assertion has no readable expiry");
                    return session.invalidated();
                }
            };

            match exchanger.exchange(&assertion).await {
                Ok(user) => {
                    tracing::debug!(user_id = %user.id, "credentials refreshed");
                    session.with_refreshed(user.access_token, user.id, token_expiry)
                }
                Err(error) => {
                    tracing::warn!(error = %error, "credential exchange failed during refresh");
                    session.invalidated()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Role;
    use base64::{Engine as _, engine::general_purpose};

    const NOW: i64 = 1_700_000_000_000;

    fn make_token(exp_secs: i64) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"RS256\",\"typ\":\"JWT\"}");
        let body =
            general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{}}}", exp_secs).as_bytes());
        format!("{}.{}.signature", header, body)
    }

    fn session(token_expiry: Option<i64>) -> SessionData {
        SessionData {
            access_token: Some("old-token".to_string()),
            user_id: "7".to_string(),
            email: "a@b.com".to_string(),
            name: "A B".to_string(),
            image: None,
            role: Role::Landlord,
            token_expiry,
            provider_refresh_token: Some("rt".to_string()),
        }
    }

    struct StaticAssertions(Option<String>);

    #[async_trait]
    impl AssertionSource for StaticAssertions {
        async fn live_assertion(&self) -> Option<String> {
            self.0.clone()
        }
    }

    struct FakeExchanger {
        fail: bool,
    }

    #[async_trait]
    impl CredentialExchanger for FakeExchanger {
        async fn exchange(
            &self,
            identity_assertion: &str,
        ) -> Result<CanonicalUser, ExchangeError> {
            if self.fail {
                return Err(ExchangeError::InvalidResponse);
            }
            Ok(CanonicalUser {
                id: "7".to_string(),
                email: "a@b.com".to_string(),
                name: "A B".to_string(),
                image: None,
                role: Role::Landlord,
                access_token: identity_assertion.to_string(),
            })
        }
    }

    #[test]
    fn assessment_matrix() {
        assert_eq!(assess(NOW, None), TokenState::Untracked);
        // Exactly at the threshold boundary: still fresh.
        assert_eq!(
            assess(NOW, Some(NOW + REFRESH_THRESHOLD_MS)),
            TokenState::Fresh
        );
        assert_eq!(
            assess(NOW, Some(NOW + REFRESH_THRESHOLD_MS + 1)),
            TokenState::Fresh
        );
        assert_eq!(
            assess(NOW, Some(NOW + REFRESH_THRESHOLD_MS - 1)),
            TokenState::NearingExpiry
        );
        // Already expired is also a refresh trigger.
        assert_eq!(assess(NOW, Some(NOW - 1)), TokenState::NearingExpiry);
    }

    #[tokio::test]
    async fn untracked_sessions_pass_through_unchanged() {
        let before = session(None);
        let after = refresh_if_needed(
            before.clone(),
            NOW,
            &StaticAssertions(None),
            &FakeExchanger { fail: true },
        )
        .await;
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn fresh_sessions_pass_through_unchanged() {
        let before = session(Some(NOW + 2 * REFRESH_THRESHOLD_MS));
        let after = refresh_if_needed(
            before.clone(),
            NOW,
            &StaticAssertions(None),
            &FakeExchanger { fail: true },
        )
        .await;
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn near_expiry_sessions_get_a_strictly_later_expiry() {
        let old_expiry = NOW + 60_000;
        let new_exp_secs = (NOW / 1000) + 3600;
        let before = session(Some(old_expiry));

        let after = refresh_if_needed(
            before,
            NOW,
            &StaticAssertions(Some(make_token(new_exp_secs))),
            &FakeExchanger { fail: false },
        )
        .await;

        assert_eq!(after.token_expiry, Some(new_exp_secs * 1000));
        assert!(after.token_expiry.unwrap() > old_expiry);
        assert_eq!(after.access_token.as_deref(), Some(make_token(new_exp_secs).as_str()));
        assert_eq!(after.email, "a@b.com");
    }

    #[tokio::test]
    async fn missing_live_session_drops_both_credential_fields() {
        let after = refresh_if_needed(
            session(Some(NOW - 1)),
            NOW,
            &StaticAssertions(None),
            &FakeExchanger { fail: false },
        )
        .await;
        assert!(after.access_token.is_none());
        assert!(after.token_expiry.is_none());
    }

    #[tokio::test]
    async fn undecodable_assertion_drops_both_credential_fields() {
        let after = refresh_if_needed(
            session(Some(NOW - 1)),
            NOW,
            &StaticAssertions(Some("garbled".to_string())),
            &FakeExchanger { fail: false },
        )
        .await;
        assert!(after.access_token.is_none());
        assert!(after.token_expiry.is_none());
    }

    #[tokio::test]
    async fn failed_exchange_drops_both_credential_fields() {
        let after = refresh_if_needed(
            session(Some(NOW - 1)),
            NOW,
            &StaticAssertions(Some(make_token((NOW / 1000) + 3600))),
            &FakeExchanger { fail: true },
        )
        .await;
        assert!(after.access_token.is_none());
        assert!(after.token_expiry.is_none());
        // Identity attributes survive; only the credential is gone.
        assert_eq!(after.user_id, "7");
    }
}
