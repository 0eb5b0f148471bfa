//! Shared harness for the HTTP integration tests
//!
//! Each test gets its own server on a random port, backed by in-memory stores.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::TcpListener;

use blogapi::configuration::{
    ApplicationSettings, DatabaseSettings, JwtSettings, PasswordSettings, SecuritySettings,
    Settings,
};
use blogapi::startup::{run, Stores};

pub const PASSWORD: &str = "Secur3!Pass";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

pub fn test_settings(login_attempts_per_minute: u32) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "127.0.0.1".to_string(),
            database_name: "blogapi".to_string(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        jwt: JwtSettings {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: "blogapi".to_string(),
            audience: "blogapi-users".to_string(),
        },
        password: PasswordSettings {
            bcrypt_cost: 4,
            ..PasswordSettings::default()
        },
        security: SecuritySettings {
            login_attempts_per_minute,
            ..SecuritySettings::default()
        },
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_settings(1_000))
}

pub fn spawn_app_with(settings: Settings) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, Stores::in_memory(), &settings).expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    TestApp {
        address: format!("http://127.0.0.1:{}/api/v1", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn register(&self, username: &str, email: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "username": username, "email": email, "password": PASSWORD }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Register and log in, returning the login payload's `data`
    pub async fn signed_in(&self, username: &str, email: &str) -> Value {
        assert_eq!(self.register(username, email).await.status().as_u16(), 201);
        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["data"].clone()
    }

    pub async fn authed(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<Value>,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("Failed to execute request")
    }
}

pub fn access_token(session: &Value) -> String {
    session["access_token"].as_str().unwrap().to_string()
}

pub fn refresh_token(session: &Value) -> String {
    session["refresh_token"].as_str().unwrap().to_string()
}
