#![allow(dead_code)]

use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use edoras::auth::password;
use edoras::config::{BootstrapAdmin, Config};
use edoras::seed;

pub const ROOT_EMAIL: &str = "eomer@edoras.test";
pub const PASSWORD: &str = "Westfold-2024";

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Login and return the auth response body + status.
    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Access token for an account created with [`PASSWORD`].
    pub async fn token(&self, email: &str) -> String {
        let (body, status) = self.login(email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed for {email}: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Access token of the bootstrap Rohirrim account.
    pub async fn root_token(&self) -> String {
        self.token(ROOT_EMAIL).await
    }

    pub async fn role_id(&self, name: &str) -> Uuid {
        sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("role lookup failed")
    }

    pub async fn create_company(&self, name: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO companies (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("create company failed")
    }

    /// Insert an active user with [`PASSWORD`], bypassing the API.
    pub async fn create_user(
        &self,
        username: &str,
        role: Option<&str>,
        company_id: Option<Uuid>,
    ) -> (Uuid, String) {
        let email = format!("{username}@edoras.test");
        let role_id = match role {
            Some(name) => Some(self.role_id(name).await),
            None => None,
        };
        let hash = password::hash(PASSWORD).unwrap();
        let id = sqlx::query_scalar(
            "INSERT INTO users (email, username, password_hash, company_id, role_id)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&email)
        .bind(username)
        .bind(hash)
        .bind(company_id)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await
        .expect("create user failed");
        (id, email)
    }

    /// Create a user and log it in, returning `(id, access_token)`.
    pub async fn user_with_token(
        &self,
        username: &str,
        role: Option<&str>,
        company_id: Option<Uuid>,
    ) -> (Uuid, String) {
        let (id, email) = self.create_user(username, role, company_id).await;
        (id, self.token(&email).await)
    }

    /// Make an authenticated GET request.
    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated PUT request with JSON body.
    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated DELETE request.
    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

fn database_url_for(base_url: &str, db_name: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Spawn a test app with a fresh temporary database, seeded permissions and
/// a Rohirrim account at [`ROOT_EMAIL`].
pub async fn spawn_app() -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let db_name = format!("edoras_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url_for(&base_url, "postgres"))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = database_url_for(&base_url, &db_name);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    seed::seed_permissions(&pool)
        .await
        .expect("Failed to seed permissions");

    let bootstrap = BootstrapAdmin {
        email: ROOT_EMAIL.to_string(),
        username: "eomer".to_string(),
        password: PASSWORD.to_string(),
    };
    seed::bootstrap_admin(&pool, &bootstrap)
        .await
        .expect("Failed to create bootstrap admin");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        access_token_ttl_minutes: 60,
        refresh_token_ttl_days: 30,
        max_body_size: 1_048_576,
        cors_origins: vec!["http://localhost:3000".to_string()],
        log_level: "warn".to_string(),
        bootstrap: Some(bootstrap),
    };

    let app = edoras::build_app(pool.clone(), config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url_for(&base_url, "postgres"))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
