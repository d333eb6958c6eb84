use config::{Config, ConfigError, Map, Value, ValueKind};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::env;
use std::sync::LazyLock;

use crate::server::auth::AuthMethod;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub kubernetes: KubernetesSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,

    /// Directory holding the built frontend (index.html plus assets)
    pub static_assets_dir: String,

    /// One of: error, warn, info, debug, trace. `RUST_LOG` takes precedence when set.
    pub log_level: String,

    /// Origins allowed for CORS. `*` allows any origin; empty disables the CORS layer.
    pub allowed_origins: Vec<String>,

    /// How long in-flight requests may keep running after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_assets_dir: "./static".to_string(),
            log_level: "info".to_string(),
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthSettings {
    /// Strategy used to derive the caller identity from request headers
    pub method: AuthMethod,

    /// Header carrying the bearer token for the `user_token` method
    pub token_header: String,

    /// Prefix stripped from the token header value (note the trailing space in the default)
    pub token_prefix: String,

    /// Header populated by the OAuth proxy sidecar for the `oauth_proxy` method
    pub oauth_proxy_token_header: String,

    /// Header carrying the user id for the `internal` and `mock` methods
    pub user_id_header: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            method: AuthMethod::Internal,
            token_header: "Authorization".to_string(),
            token_prefix: "Bearer ".to_string(),
            oauth_proxy_token_header: "X-forward-access-token".to_string(),
            user_id_header: "kubeflow-userid".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KubernetesSettings {
    /// Optional kubeconfig path (defaults to in-cluster or ~/.kube/config)
    pub kubeconfig: Option<String>,

    /// Skip verification of the API server certificate. Only meant for development clusters.
    pub insecure_skip_tls_verify: bool,

    /// Deadline applied to every call against the Kubernetes API
    pub request_timeout_secs: u64,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            insecure_skip_tls_verify: false,
            request_timeout_secs: 30,
        }
    }
}

/// Command line overrides, applied on top of config files and `LMEVAL__*` variables.
///
/// Every flag can also be set through the environment variable named next to it.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SettingsOverrides {
    /// API server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Frontend static assets root directory
    #[arg(long, env = "STATIC_ASSETS_DIR")]
    pub static_assets_dir: Option<String>,

    /// Server log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Comma separated list of origins allowed for CORS, or * to allow all
    #[arg(long, env = "ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Authentication method (internal, user_token, oauth_proxy, mock)
    #[arg(long, env = "AUTH_METHOD")]
    pub auth_method: Option<AuthMethod>,

    /// Header used to extract the bearer token
    #[arg(long, env = "AUTH_TOKEN_HEADER")]
    pub auth_token_header: Option<String>,

    /// Prefix stripped from the token header value
    #[arg(long, env = "AUTH_TOKEN_PREFIX")]
    pub auth_token_prefix: Option<String>,

    /// Header used by the OAuth proxy sidecar to forward the access token
    #[arg(long, env = "OAUTH_PROXY_TOKEN_HEADER")]
    pub oauth_proxy_token_header: Option<String>,

    /// Header carrying the user id for the internal and mock methods
    #[arg(long, env = "USER_ID_HEADER")]
    pub user_id_header: Option<String>,

    /// Skip TLS verification of the Kubernetes API server
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY")]
    pub insecure_skip_tls_verify: Option<bool>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_assets_dir {
            settings.server.static_assets_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            settings.server.log_level = level.clone();
        }
        if let Some(origins) = &self.allowed_origins {
            settings.server.allowed_origins = parse_origins(origins);
        }
        if let Some(method) = self.auth_method {
            settings.auth.method = method;
        }
        if let Some(header) = &self.auth_token_header {
            settings.auth.token_header = header.clone();
        }
        if let Some(prefix) = &self.auth_token_prefix {
            settings.auth.token_prefix = prefix.clone();
        }
        if let Some(header) = &self.oauth_proxy_token_header {
            settings.auth.oauth_proxy_token_header = header.clone();
        }
        if let Some(header) = &self.user_id_header {
            settings.auth.user_id_header = header.clone();
        }
        if let Some(insecure) = self.insecure_skip_tls_verify {
            settings.kubernetes.insecure_skip_tls_verify = insecure;
        }
    }
}

/// Split a comma separated origin list, dropping blanks
fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// `${NAME}` or `${NAME:-fallback}` inside a configuration string
static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("environment reference pattern is valid")
});

/// Expand environment references; unset variables without a fallback become empty.
fn expand_env(value: &str) -> String {
    ENV_REFERENCE
        .replace_all(value, |caps: &Captures| {
            env::var(&caps[1])
                .ok()
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

fn table_to_json(table: &Map<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        table
            .iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

/// Lower a loaded config value to JSON so `serde_ignored` can see every key
fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match &value.kind {
        ValueKind::Nil => Json::Null,
        ValueKind::Boolean(flag) => Json::Bool(*flag),
        ValueKind::I64(n) => Json::from(*n),
        ValueKind::I128(n) => i64::try_from(*n).map(Json::from).unwrap_or(Json::Null),
        ValueKind::U64(n) => Json::from(*n),
        ValueKind::U128(n) => u64::try_from(*n).map(Json::from).unwrap_or(Json::Null),
        ValueKind::Float(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
        ValueKind::String(text) => Json::String(expand_env(text)),
        ValueKind::Table(table) => table_to_json(table),
        ValueKind::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

impl Settings {
    /// Add `<config_dir>/<name>.{toml,yaml,yml}` if one exists. Returns whether a file was added.
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    /// Load settings from config files and `LMEVAL__*` environment variables.
    ///
    /// All files are optional; without any source the built-in defaults apply.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("LMEVAL_CONFIG_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("LMEVAL_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let mut builder = Config::builder();
        Self::try_add_config_file(&mut builder, &config_dir, "default");
        Self::try_add_config_file(&mut builder, &config_dir, &run_mode);
        Self::try_add_config_file(&mut builder, &config_dir, "local");

        builder = builder.add_source(
            config::Environment::with_prefix("LMEVAL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.allowed_origins"),
        );

        let config = builder.build()?;

        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let json_value = table_to_json(&root_value);

        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        Ok(settings)
    }

    /// Check invariants that serde cannot express. Run after CLI overrides are applied.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let level = self.server.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Message(format!(
                "Invalid log level '{}', valid levels are: {}",
                self.server.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        self.server.log_level = level;

        self.server.allowed_origins = self
            .server
            .allowed_origins
            .iter()
            .flat_map(|origin| parse_origins(origin))
            .collect();

        let required_headers = [
            ("auth.token_header", &self.auth.token_header),
            (
                "auth.oauth_proxy_token_header",
                &self.auth.oauth_proxy_token_header,
            ),
            ("auth.user_id_header", &self.auth.user_id_header),
        ];
        for (field, value) in required_headers {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("'{}' must not be empty", field)));
            }
            if axum::http::HeaderName::from_bytes(value.trim().as_bytes()).is_err() {
                return Err(ConfigError::Message(format!(
                    "'{}' is not a valid header name: '{}'",
                    field, value
                )));
            }
        }

        if self.kubernetes.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "'kubernetes.request_timeout_secs' must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
