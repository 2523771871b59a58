#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use opsdesk_api::{
    cache::MemoryCache,
    config::{Config, RateLimitConfig},
    db::{
        memory::{MemorySessionStore, MemoryUserStore},
        UserStore,
    },
    models::user::{NewUser, User, UserRole},
    routes,
    services::{
        auth::AuthService,
        notifications::{Notification, NotificationDispatcher, Notifier},
    },
    state::AppState,
};

pub const PASSWORD: &str = "correct-horse-battery";
pub const CLIENT_IP: &str = "198.51.100.7";

/// Captures every notification so tests can lift tokens out of the links.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Polls until a matching notification shows up.
    pub async fn wait_for<F>(&self, pred: F) -> Notification
    where
        F: Fn(&Notification) -> bool,
    {
        for _ in 0..500 {
            if let Some(found) = self.sent().into_iter().find(|n| pred(n)) {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification never arrived; got {:?}", self.sent());
    }

    /// Lets the worker drain, then returns what was delivered.
    pub async fn settle(&self) -> Vec<Notification> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.sent()
    }
}

pub fn token_from_url(url: &str) -> String {
    url.split("token=")
        .nth(1)
        .expect("link carries a token")
        .to_string()
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        redis_url: "redis://unused".into(),
        host: "127.0.0.1".into(),
        port: 0,
        app_base_url: "https://app.opsdesk.test".into(),
        jwt_secret: "integration-test-secret".into(),
        jwt_issuer: "opsdesk".into(),
        jwt_audience: "opsdesk-portal".into(),
        jwt_expiry_seconds: 900,
        refresh_token_ttl_seconds: 30 * 24 * 60 * 60,
        password_reset_ttl_seconds: 3600,
        verify_email_ttl_seconds: 24 * 60 * 60,
        invitation_ttl_seconds: 7 * 24 * 60 * 60,
        bcrypt_cost: 4,
        rate_limits: RateLimitConfig::default(),
        notification_queue_capacity: 64,
        notification_timeout_seconds: 5,
        session_sweep_interval_seconds: 3600,
        smtp_host: None,
        smtp_port: None,
        smtp_username: None,
        smtp_password: None,
        smtp_from: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub auth: Arc<AuthService>,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub cache: Arc<MemoryCache>,
    pub outbox: Arc<RecordingNotifier>,
    pub workspace_id: Uuid,
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let mut config = test_config();
    tweak(&mut config);

    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let cache = Arc::new(MemoryCache::new());
    let outbox = Arc::new(RecordingNotifier::default());
    let notifications = NotificationDispatcher::start(outbox.clone(), 64, Duration::from_secs(5));

    let auth = Arc::new(AuthService::new(
        &config,
        users.clone(),
        sessions.clone(),
        cache.clone(),
        notifications,
    ));

    let state = AppState {
        auth: auth.clone(),
        config: Arc::new(config),
        db: None,
    };

    TestApp {
        router: routes::router(state),
        auth,
        users,
        sessions,
        cache,
        outbox,
        workspace_id: Uuid::new_v4(),
    }
}

impl TestApp {
    pub async fn seed_user(&self, email: &str, role: UserRole, verified: bool) -> User {
        let password_hash = bcrypt::hash(PASSWORD, 4).unwrap();
        self.users
            .create(NewUser {
                workspace_id: self.workspace_id,
                email: email.to_lowercase(),
                password_hash,
                first_name: "Ana".into(),
                last_name: "Lima".into(),
                role,
                is_email_verified: verified,
            })
            .await
            .unwrap()
    }

    /// A row written before `auth_version` existed.
    pub fn seed_legacy_user(&self, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            email: email.to_string(),
            password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
            first_name: "Old".into(),
            last_name: "Timer".into(),
            role: "user".into(),
            is_email_verified: true,
            auth_version: 0,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.clone());
        user
    }

    pub async fn user(&self, id: Uuid) -> User {
        self.users.find_by_id(id).await.unwrap().expect("user exists")
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> Response {
        self.send_from(CLIENT_IP, method, uri, body, bearer).await
    }

    /// Like [`TestApp::send`], claiming `ip` in `X-Real-IP`.
    pub async fn send_from(
        &self,
        ip: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-real-ip", ip)
            .header(header::USER_AGENT, "integration-tests");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Response { status, body }
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.send(Method::POST, uri, Some(body), None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.post(
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Logs in and returns `(access token, refresh token)`.
    pub async fn login_ok(&self, email: &str) -> (String, String) {
        let res = self.login(email, PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        (
            res.body["token"].as_str().unwrap().to_string(),
            res.body["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}
