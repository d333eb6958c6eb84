use anyhow::{Context, Result};
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::identity::{
    extract_token, header_value, AuthError, AuthMethod, BearerToken, RequestIdentity,
};
use crate::server::kubernetes::{ClusterClient, Credential, KubernetesClient, MockClient};
use crate::server::settings::{KubernetesSettings, Settings};

/// Identity used by the mock method when the request carries no user id header
pub const MOCK_DEFAULT_USER: &str = "user@example.com";

/// Turns request headers into an identity and an identity into a cluster client.
///
/// One implementation per [`AuthMethod`], chosen once at startup.
pub trait ClientFactory: Send + Sync {
    fn method(&self) -> AuthMethod;

    /// Derive the caller identity from request headers. No network calls.
    fn extract_request_identity(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthError>;

    /// Reject identities lacking what this method needs. No network calls.
    fn validate_request_identity(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<(), AuthError>;

    /// Client carrying the credentials appropriate for `identity`
    fn get_client(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<Arc<dyn KubernetesClient>, AuthError>;
}

/// Cluster calls use the server's service account; the caller is known by a user id
/// header set by a trusted gateway.
pub struct InternalClientFactory {
    user_id_header: String,
    client: Arc<ClusterClient>,
}

impl InternalClientFactory {
    pub fn new(user_id_header: impl Into<String>, client: ClusterClient) -> Self {
        Self {
            user_id_header: user_id_header.into(),
            client: Arc::new(client),
        }
    }
}

impl ClientFactory for InternalClientFactory {
    fn method(&self) -> AuthMethod {
        AuthMethod::Internal
    }

    fn extract_request_identity(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthError> {
        header_value(headers, &self.user_id_header)
            .map(RequestIdentity::from_user_id)
            .ok_or_else(|| AuthError::MissingCredential(self.user_id_header.clone()))
    }

    fn validate_request_identity(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<(), AuthError> {
        match identity {
            None => Err(AuthError::InvalidCredential("identity is missing".to_string())),
            Some(identity) if identity.user_id().is_none() => Err(AuthError::InvalidCredential(
                "user id is required".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn get_client(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<Arc<dyn KubernetesClient>, AuthError> {
        let identity = identity.ok_or(AuthError::MissingIdentity)?;
        if identity.user_id().is_none() {
            return Err(AuthError::InvalidIdentity("user id is required".to_string()));
        }
        Ok(self.client.clone())
    }
}

/// Each request gets a client authenticated with the caller's own bearer token.
///
/// Serves both `user_token` (configured header and prefix) and `oauth_proxy`
/// (header filled by the proxy sidecar, no prefix).
pub struct TokenClientFactory {
    method: AuthMethod,
    header: String,
    prefix: String,
    base_config: kube::Config,
    timeout: Duration,
}

impl TokenClientFactory {
    pub fn user_token(
        header: impl Into<String>,
        prefix: impl Into<String>,
        base_config: kube::Config,
        timeout: Duration,
    ) -> Self {
        Self {
            method: AuthMethod::UserToken,
            header: header.into(),
            prefix: prefix.into(),
            base_config,
            timeout,
        }
    }

    pub fn oauth_proxy(
        header: impl Into<String>,
        base_config: kube::Config,
        timeout: Duration,
    ) -> Self {
        Self {
            method: AuthMethod::OauthProxy,
            header: header.into(),
            prefix: String::new(),
            base_config,
            timeout,
        }
    }

    fn client_for(&self, token: &BearerToken) -> Result<Arc<dyn KubernetesClient>, AuthError> {
        let config = kube::Config {
            auth_info: kube::config::AuthInfo {
                token: Some(token.expose().to_string().into()),
                ..Default::default()
            },
            ..self.base_config.clone()
        };
        let client = kube::Client::try_from(config).map_err(|e| AuthError::Client(e.to_string()))?;
        Ok(Arc::new(ClusterClient::new(
            client,
            Credential::Caller,
            self.timeout,
        )))
    }
}

impl ClientFactory for TokenClientFactory {
    fn method(&self) -> AuthMethod {
        self.method
    }

    fn extract_request_identity(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthError> {
        extract_token(headers, &self.header, &self.prefix).map(RequestIdentity::from_token)
    }

    fn validate_request_identity(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<(), AuthError> {
        match identity {
            None => Err(AuthError::InvalidCredential("identity is missing".to_string())),
            Some(identity) if identity.token().is_none() => Err(AuthError::InvalidCredential(
                "token is empty".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn get_client(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<Arc<dyn KubernetesClient>, AuthError> {
        let identity = identity.ok_or(AuthError::MissingIdentity)?;
        let token = identity
            .token()
            .ok_or_else(|| AuthError::InvalidIdentity("bearer token is required".to_string()))?;
        self.client_for(token)
    }
}

/// Fixed identity backed by the in-memory [`MockClient`]; no cluster needed.
pub struct MockClientFactory {
    user_id_header: String,
    client: Arc<MockClient>,
}

impl MockClientFactory {
    pub fn new(user_id_header: impl Into<String>, client: MockClient) -> Self {
        Self {
            user_id_header: user_id_header.into(),
            client: Arc::new(client),
        }
    }
}

impl ClientFactory for MockClientFactory {
    fn method(&self) -> AuthMethod {
        AuthMethod::Mock
    }

    fn extract_request_identity(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthError> {
        let user_id = header_value(headers, &self.user_id_header).unwrap_or(MOCK_DEFAULT_USER);
        Ok(RequestIdentity::from_user_id(user_id))
    }

    fn validate_request_identity(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<(), AuthError> {
        match identity {
            None => Err(AuthError::InvalidCredential("identity is missing".to_string())),
            Some(_) => Ok(()),
        }
    }

    fn get_client(
        &self,
        identity: Option<&RequestIdentity>,
    ) -> Result<Arc<dyn KubernetesClient>, AuthError> {
        identity.ok_or(AuthError::MissingIdentity)?;
        Ok(self.client.clone())
    }
}

/// Load the base cluster configuration: an explicit kubeconfig when configured,
/// otherwise in-cluster or `~/.kube/config`.
pub async fn load_kube_config(settings: &KubernetesSettings) -> Result<kube::Config> {
    let mut config = match &settings.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await
            .context("Failed to load kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    if settings.insecure_skip_tls_verify {
        warn!("TLS verification of the Kubernetes API server is disabled");
    }
    config.accept_invalid_certs = settings.insecure_skip_tls_verify;

    Ok(config)
}

/// Build the factory for the configured auth method.
pub async fn build_client_factory(settings: &Settings) -> Result<Arc<dyn ClientFactory>> {
    let auth = &settings.auth;
    let timeout = Duration::from_secs(settings.kubernetes.request_timeout_secs);
    info!("Using authentication method: {}", auth.method);

    let factory: Arc<dyn ClientFactory> = match auth.method {
        AuthMethod::Mock => Arc::new(MockClientFactory::new(
            &auth.user_id_header,
            MockClient::new(),
        )),
        AuthMethod::Internal => {
            let config = load_kube_config(&settings.kubernetes).await?;
            let client = kube::Client::try_from(config)
                .context("Failed to create Kubernetes client")?;
            Arc::new(InternalClientFactory::new(
                &auth.user_id_header,
                ClusterClient::new(client, Credential::ServiceAccount, timeout),
            ))
        }
        AuthMethod::UserToken => Arc::new(TokenClientFactory::user_token(
            &auth.token_header,
            &auth.token_prefix,
            load_kube_config(&settings.kubernetes).await?,
            timeout,
        )),
        AuthMethod::OauthProxy => Arc::new(TokenClientFactory::oauth_proxy(
            &auth.oauth_proxy_token_header,
            load_kube_config(&settings.kubernetes).await?,
            timeout,
        )),
    };

    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri};

    fn base_config() -> kube::Config {
        kube::Config::new("http://127.0.0.1:9".parse::<Uri>().unwrap())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    fn factories() -> Vec<Box<dyn ClientFactory>> {
        let client = kube::Client::try_from(base_config()).unwrap();
        vec![
            Box::new(InternalClientFactory::new(
                "kubeflow-userid",
                ClusterClient::new(client, Credential::ServiceAccount, Duration::from_secs(30)),
            )),
            Box::new(TokenClientFactory::user_token(
                "Authorization",
                "Bearer ",
                base_config(),
                Duration::from_secs(30),
            )),
            Box::new(TokenClientFactory::oauth_proxy(
                "X-forward-access-token",
                base_config(),
                Duration::from_secs(30),
            )),
        ]
    }

    #[tokio::test]
    async fn test_missing_credential_header_is_rejected() {
        for factory in factories() {
            let result = factory.extract_request_identity(&HeaderMap::new());
            assert!(
                matches!(result, Err(AuthError::MissingCredential(_))),
                "{} accepted empty headers",
                factory.method()
            );
        }
    }

    #[tokio::test]
    async fn test_credential_header_is_extracted() {
        let headers = headers(&[
            ("kubeflow-userid", "alice@example.com"),
            ("authorization", "Bearer user-token"),
            ("x-forward-access-token", " proxy-token "),
        ]);
        let factories = factories();

        let internal = factories[0].extract_request_identity(&headers).unwrap();
        assert_eq!(internal.user_id(), Some("alice@example.com"));

        let user_token = factories[1].extract_request_identity(&headers).unwrap();
        assert_eq!(user_token.token().unwrap().expose(), "user-token");

        let oauth = factories[2].extract_request_identity(&headers).unwrap();
        assert_eq!(oauth.token().unwrap().expose(), "proxy-token");
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_and_empty_identities() {
        for factory in factories() {
            assert!(matches!(
                factory.validate_request_identity(None),
                Err(AuthError::InvalidCredential(_))
            ));
            assert!(factory
                .validate_request_identity(Some(&RequestIdentity::default()))
                .is_err());
        }

        let factories = factories();
        let token_factory = &factories[1];
        let empty = RequestIdentity::from_token(BearerToken::new(""));
        assert!(token_factory.validate_request_identity(Some(&empty)).is_err());
        let valid = RequestIdentity::from_token(BearerToken::new("abc"));
        token_factory.validate_request_identity(Some(&valid)).unwrap();
    }

    #[tokio::test]
    async fn test_get_client_requires_identity() {
        for factory in factories() {
            assert!(matches!(
                factory.get_client(None),
                Err(AuthError::MissingIdentity)
            ));
            assert!(matches!(
                factory.get_client(Some(&RequestIdentity::default())),
                Err(AuthError::InvalidIdentity(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_token_factory_builds_client_per_request() {
        let factory = TokenClientFactory::user_token(
            "Authorization",
            "Bearer ",
            base_config(),
            Duration::from_secs(30),
        );
        let identity = RequestIdentity::from_token(BearerToken::new("abc"));
        assert!(factory.get_client(Some(&identity)).is_ok());
    }

    #[tokio::test]
    async fn test_mock_factory_defaults_identity() {
        let factory = MockClientFactory::new("kubeflow-userid", MockClient::empty());

        let identity = factory.extract_request_identity(&HeaderMap::new()).unwrap();
        assert_eq!(identity.user_id(), Some(MOCK_DEFAULT_USER));

        let identity = factory
            .extract_request_identity(&headers(&[("kubeflow-userid", "admin@example.com")]))
            .unwrap();
        assert_eq!(identity.user_id(), Some("admin@example.com"));
        assert!(factory.get_client(Some(&identity)).is_ok());
        assert!(matches!(factory.get_client(None), Err(AuthError::MissingIdentity)));
    }
}
