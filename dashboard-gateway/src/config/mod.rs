use secrecy::Secret;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend_api: BackendApiSettings,
    pub identity_provider: IdentityProviderSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Absolute origin for redirect URLs (required behind reverse proxies,
    /// otherwise redirects would leak the internal hostname). When unset,
    /// the guard derives the origin from forwarded request headers.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Session cookie name. Deployments terminating TLS upstream may see the
    /// `__Secure-`/`__Host-` prefixed variants of this name instead.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

fn default_session_cookie() -> String {
    "pd_session".to_string()
}

#[derive(Deserialize, Clone)]
pub struct BackendApiSettings {
    /// Base URL of the property REST backend (e.g. http://localhost:8000/api/v1).
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct IdentityProviderSettings {
    /// Identity-toolkit base URL for password verification.
    pub url: String,
    /// Secure-token base URL for assertion re-derivation.
    pub token_url: String,
    pub api_key: Secret<String>,
}

#[derive(Deserialize, Clone, Default)]
pub struct ObservabilitySettings {
    /// OTLP collector endpoint. Tracing stays process-local when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");

    // Check if we're already in dashboard-gateway directory or need to navigate to it
    let configuration_directory = if base_path.ends_with("dashboard-gateway") {
        base_path.join("config")
    } else {
        base_path.join("dashboard-gateway").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
