use base64::{Engine as _, engine::general_purpose};
use dashboard_gateway::config::{
    BackendApiSettings, IdentityProviderSettings, ObservabilitySettings, ServerSettings, Settings,
};
use secrecy::Secret;

pub fn test_settings(backend_url: &str, provider_url: &str) -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: Some("http://app.test".to_string()),
            session_cookie: "pd_session".to_string(),
        },
        backend_api: BackendApiSettings {
            url: backend_url.to_string(),
        },
        identity_provider: IdentityProviderSettings {
            url: provider_url.to_string(),
            token_url: provider_url.to_string(),
            api_key: Secret::new("test-key".to_string()),
        },
        observability: ObservabilitySettings::default(),
    }
}

/// An unsigned JWT carrying just an expiry claim; the gateway never
/// validates signatures, only reads `exp`.
pub fn make_id_token(exp_secs: i64) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"RS256\",\"typ\":\"JWT\"}");
    let payload =
        general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{}}}", exp_secs).as_bytes());
    format!("{}.{}.signature", header, payload)
}
