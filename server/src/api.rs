//! REST-API fuer Admins (`/api/...`)
//!
//! Alle Endpunkte verlangen `Authorization: Bearer <admin-token>`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use devicehub_auth::CredentialVerifier;
use devicehub_hub::ConnectionHub;
use devicehub_observability::{request_timing_layer, timing_middleware, HubMetrics};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::devices::{geraet_trennen_nach_ip, geraet_trennen_nach_name, online_geraete};

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<ConnectionHub>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

/// Erstellt den `/api`-Router inklusive Auth, Timing und CORS
pub fn api_router(state: ApiState, metriken: HubMetrics, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/api/devices/online", get(geraete_online))
        .route("/api/devices/disconnect", post(geraet_trennen))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(metriken, timing_middleware))
        .layer(request_timing_layer())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

pub fn fehler_antwort(status: StatusCode, nachricht: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": nachricht
            }
        })),
    )
        .into_response()
}

/// Extrahiert Bearer-Token aus Authorization-Header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

async fn auth_middleware(State(state): State<ApiState>, req: Request<Body>, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return fehler_antwort(StatusCode::UNAUTHORIZED, "Authorization-Header fehlt");
    };

    match state.verifier.verifizieren(token).await {
        Ok(identitaet) => {
            tracing::debug!(admin = %identitaet.name, pfad = %req.uri().path(), "REST-Anfrage");
            next.run(req).await
        }
        Err(_) => fehler_antwort(StatusCode::UNAUTHORIZED, "Ungueltiger Token"),
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

async fn geraete_online(State(state): State<ApiState>) -> Response {
    (StatusCode::OK, Json(online_geraete(&state.hub))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct TrennenBody {
    pub ip: Option<String>,
    pub name: Option<String>,
}

async fn geraet_trennen(State(state): State<ApiState>, Json(body): Json<TrennenBody>) -> Response {
    let getrennt = match (body.ip.as_deref(), body.name.as_deref()) {
        (Some(ip), _) => geraet_trennen_nach_ip(&state.hub, ip),
        (None, Some(name)) => geraet_trennen_nach_name(&state.hub, name),
        (None, None) => {
            return fehler_antwort(StatusCode::BAD_REQUEST, "'ip' oder 'name' erforderlich")
        }
    };
    (StatusCode::OK, Json(json!({ "getrennt": getrennt }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicehub_auth::{AdminTokenStore, HashKosten};
    use devicehub_hub::HubConfig;
    use tower::ServiceExt;

    async fn app() -> (Router, String) {
        let store = Arc::new(AdminTokenStore::mit_kosten(HashKosten::GUENSTIG));
        let token = store.erstellen("ops").await.unwrap().token_wert;
        let metriken = HubMetrics::neu().unwrap();
        let hub = ConnectionHub::builder(HubConfig::default(), metriken.clone()).bauen();
        let state = ApiState { hub, verifier: store };
        (api_router(state, metriken, &[]), token)
    }

    #[test]
    fn bearer_token_extrahieren() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer mein_token_123"));
        assert_eq!(bearer_token(&headers), Some("mein_token_123"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn ohne_token_401() {
        let (app, _) = app().await;
        let antwort = app
            .oneshot(Request::builder().uri("/api/devices/online").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn online_liste_mit_token() {
        let (app, token) = app().await;
        let antwort = app
            .oneshot(
                Request::builder()
                    .uri("/api/devices/online")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn trennen_ohne_ziel_400() {
        let (app, token) = app().await;
        let antwort = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/devices/disconnect")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
    }
}
