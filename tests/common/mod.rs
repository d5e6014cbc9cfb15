//! Common test utilities for E2E tests
//!
//! A single `MockServer` stands in for both the identity provider and the
//! accounting API.

#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use ledgerlink::auth::tokens::TokenSet;
use ledgerlink::auth::{Authorization, Tenant};
use ledgerlink::{AppState, config};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const COOKIE_NAME: &str = "ledgerlink_session";

/// Most recently updated tenant in `tenants_body()`
pub const FIRST_TENANT: &str = "b9a2fb5c-29a4-4a2d-9a2b-3c7c0f0e4a11";
pub const SECOND_TENANT: &str = "45e4708e-d862-4111-ab3a-dd8cd03913e1";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub upstream: MockServer,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let upstream = MockServer::start_async().await;

        // Bind first so the redirect URI can name the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
                static_dir: None,
            },
            provider: config::ProviderConfig {
                client_id: CLIENT_ID.to_string(),
                client_secret: CLIENT_SECRET.to_string(),
                redirect_uri: format!("{addr_str}/callback"),
                display_name: "Xero".to_string(),
                scopes: config::DEFAULT_SCOPES.to_string(),
                authorize_url: "https://login.xero.com/identity/connect/authorize".to_string(),
                token_url: upstream.url("/connect/token"),
                connections_url: upstream.url("/connections"),
                accounting_api_url: upstream.url("/api.xro/2.0/"),
                finance_api_url: upstream.url("/finance.xro/1.0/"),
            },
            session: config::SessionConfig {
                secret: Some("test-secret-key-that-is-32-bytes-long!!".to_string()),
                max_age: 3600,
                cookie_name: COOKIE_NAME.to_string(),
                purge_interval_seconds: 300,
            },
            upstream: config::UpstreamConfig { timeout_seconds: 5 },
            logging: config::LoggingConfig::default(),
        };
        adjust(&mut config);
        config.validate().unwrap();

        let state = AppState::new(config).unwrap();

        // Redirects are asserted, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = ledgerlink::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            upstream,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional session cookie
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        request.send().await.unwrap()
    }

    /// Mock a successful code exchange
    pub async fn mock_token_exchange(&self) -> httpmock::Mock<'_> {
        self.upstream
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/connect/token")
                    .form_urlencoded_tuple("grant_type", "authorization_code");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("access-1", 1800));
            })
            .await
    }

    /// Mock the connections listing with `tenants_body()`
    pub async fn mock_connections(&self) -> httpmock::Mock<'_> {
        self.upstream
            .mock_async(|when, then| {
                when.method(GET).path("/connections");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(tenants_body());
            })
            .await
    }

    /// Start a flow and return the session cookie and the CSRF state
    pub async fn connect(&self) -> (String, String) {
        let response = self.get("/connect", None).await;
        assert_eq!(response.status(), 302);

        let cookie = session_cookie(&response).expect("connect sets the session cookie");
        let location = response.headers()["location"].to_str().unwrap().to_string();
        let location = url::Url::parse(&location).unwrap();
        let state = location
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();

        (cookie, state)
    }

    /// Run `/connect` and `/callback` against mocked provider endpoints
    ///
    /// Returns the session cookie issued by the callback.
    pub async fn login(&self) -> String {
        let _token = self.mock_token_exchange().await;
        let _connections = self.mock_connections().await;

        let (cookie, state) = self.connect().await;
        let response = self
            .get(&format!("/callback?code=abc123&state={state}"), Some(&cookie))
            .await;
        assert_eq!(response.status(), 302);
        assert_eq!(response.headers()["location"], "/organisation");

        session_cookie(&response).expect("callback sets the session cookie")
    }

    /// Store an authorized session directly, bypassing the flow
    ///
    /// `expires_in` may be negative to seed an already-expired token set.
    pub async fn seed_session(&self, expires_in: i64) -> String {
        let access_token = jwt(&access_claims());
        let token_set = TokenSet {
            access_token,
            refresh_token: Some("refresh-1".to_string()),
            id_token: Some(jwt(&id_claims())),
            token_type: "Bearer".to_string(),
            scope: Some(config::DEFAULT_SCOPES.to_string()),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        let mut tenants: Vec<Tenant> = serde_json::from_value(tenants_body()).unwrap();
        ledgerlink::auth::tenant::order_by_recent_connection(&mut tenants);

        let authorization = Authorization::new(
            token_set,
            serde_json::from_value(id_claims()).unwrap(),
            serde_json::from_value(access_claims()).unwrap(),
            tenants,
        )
        .unwrap();

        let mut session = self.state.sessions.create().await;
        session.authorization = Some(authorization);
        let id = session.id.clone();
        self.state.sessions.save(session).await;

        format!("{COOKIE_NAME}={}", self.state.sessions.sign(&id).unwrap())
    }
}

/// `name=value` of the session cookie set by a response
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(COOKIE_NAME))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

/// Unsigned JWT carrying `claims`
pub fn jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn id_claims() -> Value {
    json!({
        "iss": "https://identity.xero.com",
        "sub": "0c2a8d1e2f5b4c6d8e9f0a1b2c3d4e5f",
        "aud": CLIENT_ID,
        "exp": Utc::now().timestamp() + 300,
        "iat": Utc::now().timestamp(),
        "email": "owner@example.com",
        "given_name": "Ada",
        "family_name": "Lovelace"
    })
}

pub fn access_claims() -> Value {
    json!({
        "iss": "https://identity.xero.com",
        "exp": Utc::now().timestamp() + 1800,
        "client_id": CLIENT_ID,
        "sub": "0c2a8d1e2f5b4c6d8e9f0a1b2c3d4e5f",
        "scope": ["openid", "profile", "accounting.transactions", "offline_access"]
    })
}

/// Token endpoint response with fresh id and access tokens
pub fn token_body(refresh_token: &str, expires_in: i64) -> Value {
    json!({
        "id_token": jwt(&id_claims()),
        "access_token": jwt(&access_claims()),
        "expires_in": expires_in,
        "token_type": "Bearer",
        "refresh_token": refresh_token,
        "scope": config::DEFAULT_SCOPES
    })
}

/// Two connections, listed oldest first
pub fn tenants_body() -> Value {
    json!([
        {
            "id": "e1eede29-f875-4a5d-8470-17f6a29a88b1",
            "tenantId": SECOND_TENANT,
            "tenantType": "ORGANISATION",
            "tenantName": "Demo Company (AU)",
            "createdDateUtc": "2019-07-09T23:40:30.1833130",
            "updatedDateUtc": "2020-05-15T01:35:13.8491980"
        },
        {
            "id": "7a5c1ee4-1b51-4d1c-a4a7-2c9b5c1e7d00",
            "tenantId": FIRST_TENANT,
            "tenantType": "ORGANISATION",
            "tenantName": "Demo Company (NZ)",
            "createdDateUtc": "2021-02-01T10:00:00.0000000",
            "updatedDateUtc": "2023-11-20T08:12:45.1234560"
        }
    ])
}
