//! Shared fixtures for chantiers-api integration tests
//!
//! Each `TestApp` owns a throwaway root folder with its own SQLite file and
//! media directory.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chantiers_api::db::membres::{self, MembreData};
use chantiers_api::{build_router, AppState};
use chantiers_common::api::auth::issue_token;
use chantiers_common::config::ServerConfig;
use chantiers_common::db::{create_user, init_database};
use chantiers_common::domain::RoleMembre;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub state: AppState,
    _dir: TempDir,
}

/// Authenticated caller created by [`TestApp::user`]
pub struct TestUser {
    pub user_id: i64,
    pub membre_id: Option<i64>,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::for_root(dir.path().to_path_buf());
        let pool = init_database(&config.database_path).await.unwrap();
        std::fs::create_dir_all(&config.media_root).unwrap();

        let state = AppState::new(pool.clone(), config);
        let app = build_router(state.clone());

        Self {
            app,
            pool,
            state,
            _dir: dir,
        }
    }

    /// Create a user with a token, optionally linked to a new membre profile
    pub async fn user(&self, username: &str, is_staff: bool, role: Option<RoleMembre>) -> TestUser {
        let user_id = create_user(&self.pool, username, is_staff).await.unwrap();
        let membre_id = match role {
            Some(role) => Some(self.membre(username, role, Some(user_id)).await),
            None => None,
        };
        let token = issue_token(&self.pool, user_id).await.unwrap();
        TestUser {
            user_id,
            membre_id,
            token,
        }
    }

    pub async fn staff(&self) -> TestUser {
        self.user("admin", true, None).await
    }

    /// Insert a membre row directly
    pub async fn membre(&self, name: &str, role: RoleMembre, user: Option<i64>) -> i64 {
        let data = MembreData {
            prenom: name.to_string(),
            nom: "Test".to_string(),
            email: format!("{}@chantiers.test", name),
            telephone: String::new(),
            equipe: None,
            role,
            qualifications: String::new(),
            taux_horaire: None,
            actif: true,
            date_embauche: None,
            user,
        };
        membres::insert(&self.pool, &data).await.unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, extract_json(response).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Create a chantier and return its id
    pub async fn chantier(&self, token: &str, numero: &str, debut: &str, fin: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/v1/chantiers",
                token,
                json!({
                    "numero": numero,
                    "nom": format!("Chantier {}", numero),
                    "ville": "Lyon",
                    "date_debut": debut,
                    "date_fin_prevue": fin,
                    "budget_total": "150000.00",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn lot(&self, token: &str, chantier: i64, numero: i64) -> i64 {
        let (status, body) = self
            .post(
                "/api/v1/lots",
                token,
                json!({
                    "chantier": chantier,
                    "numero": numero,
                    "nom": format!("Lot {}", numero),
                    "date_debut_prevue": "2024-01-01",
                    "date_fin_prevue": "2024-06-30",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn tache(&self, token: &str, lot: i64, numero: &str, status: &str, fin: &str) -> i64 {
        let (code, body) = self
            .post(
                "/api/v1/taches",
                token,
                json!({
                    "lot": lot,
                    "numero": numero,
                    "nom": format!("Tâche {}", numero),
                    "date_debut_prevue": "2024-01-01",
                    "date_fin_prevue": fin,
                    "heures_estimees": 10,
                    "status": status,
                }),
            )
            .await;
        assert_eq!(code, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }
}

/// Collect a response body as JSON (`Value::Null` when empty)
pub async fn extract_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
