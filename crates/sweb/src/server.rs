//! Minimal HTTP front end over the session manager.
//!
//! `GET /` counts visits in the caller's session; `POST /logout` ends it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sweb_session::SessionManager;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::Result;

/// Attribute key holding the visit counter.
const VISITS_KEY: &str = "visits";

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(visit))
        .route("/logout", post(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct VisitResponse {
    session_id: String,
    visits: u64,
    new_session: bool,
}

async fn visit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<VisitResponse>)> {
    let manager = &state.manager;
    let start = manager.start_session(&headers, &addr.to_string()).await?;
    let session = &start.session;

    let visits = session.attributes().get_as::<u64>(VISITS_KEY)?.unwrap_or(0) + 1;
    session.attributes().set(VISITS_KEY, visits).await?;

    let mut response = HeaderMap::new();
    if start.is_new {
        manager.set_session_cookie(&mut response, session.id())?;
    }

    Ok((
        response,
        Json(VisitResponse {
            session_id: session.id().to_string(),
            visits,
            new_session: start.is_new,
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap)> {
    let manager = &state.manager;
    if let Some(sid) = manager.get_session_cookie(&headers) {
        manager.remove_session(&sid).await?;
        debug!(session_id = %sid, "Logged out");
    }

    let mut response = HeaderMap::new();
    manager.delete_session_cookie(&mut response)?;
    Ok((StatusCode::NO_CONTENT, response))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use sweb_session::{CookieConfig, MemoryProvider};
    use tower::ServiceExt;

    use super::*;

    fn app() -> (Router, Arc<SessionManager>) {
        let provider = Arc::new(MemoryProvider::in_memory(Duration::from_secs(60)).unwrap());
        let manager = Arc::new(SessionManager::new(provider, CookieConfig::new("SWEBSID")));
        let router = router(AppState::new(Arc::clone(&manager)))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (router, manager)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session_cookie(response: &axum::response::Response) -> String {
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_visit_counts_per_session() {
        let (app, _manager) = app();

        let first = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = session_cookie(&first);
        let body = json_body(first).await;
        assert_eq!(body["visits"], 1);
        assert_eq!(body["new_session"], true);

        let second = app
            .oneshot(
                Request::get("/")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(second.headers().get(SET_COOKIE).is_none());
        let body = json_body(second).await;
        assert_eq!(body["visits"], 2);
        assert_eq!(body["new_session"], false);
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let (app, manager) = app();

        let first = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = session_cookie(&first);
        let sid = json_body(first).await["session_id"].as_str().unwrap().to_string();
        assert!(manager.provider().has_session(&sid).await);

        let logout = app
            .oneshot(
                Request::post("/logout")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::NO_CONTENT);
        let set_cookie = logout.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(!manager.provider().has_session(&sid).await);
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let (app, _manager) = app();
        let response = app
            .oneshot(Request::post("/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
