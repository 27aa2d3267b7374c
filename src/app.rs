use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::{self, Environment};
use crate::database::Store;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{jwt_auth_middleware, require_admin};
use crate::services::{MonitoringService, ProgressService, QuizService};

pub const API_PREFIX: &str = "/api/v1";

/// Shared handler state. Every service holds the same store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub quizzes: QuizService,
    pub progress: ProgressService,
    pub monitoring: MonitoringService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            quizzes: QuizService::new(store.clone()),
            progress: ProgressService::new(store.clone()),
            monitoring: MonitoringService::new(store.clone()),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = protected_routes().merge(elevated_routes());
    let api_config = &config::config().api;

    let router = Router::new()
        // Tier 1: public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .nest(API_PREFIX, api)
        .fallback(public::not_found);

    let router = if api_config.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.layer(cors_layer()).with_state(state)
}

/// Tier 2: any authenticated user
fn protected_routes() -> Router<AppState> {
    use protected::{progress, quiz};

    Router::new()
        .route("/quizzes/start", post(quiz::start))
        .route("/quizzes/submit", post(quiz::submit))
        .route("/quizzes/attempts/me", get(quiz::my_attempts))
        .route("/quizzes/module/:module_id", get(quiz::by_module))
        .route("/quizzes/:id", get(quiz::show))
        .route("/progress/modules", get(progress::modules))
        .route("/progress/modules/:id", get(progress::module))
        .route("/progress/sub-materis/:id", get(progress::sub_material))
        .route("/progress/sub-materis/:id/complete", post(progress::complete_sub_material))
        .route("/progress/materials/:id/access", get(progress::access))
        .route("/progress/poins/:id/complete", post(progress::complete_poin))
        .route("/progress/poins/:id/scroll-complete", post(progress::scroll_complete))
        .route("/progress/poins/:id/scroll-status", get(progress::scroll_status))
        .route("/progress/quiz/:id", get(progress::quiz))
        .route("/progress/stats", get(progress::stats))
        .route_layer(from_fn(jwt_auth_middleware))
}

/// Tier 3: admin and superadmin
fn elevated_routes() -> Router<AppState> {
    use elevated::monitoring;

    Router::new()
        .route("/admin/progress-monitoring/stats", get(monitoring::stats))
        .route("/admin/progress-monitoring/users", get(monitoring::users))
        .route("/admin/progress-monitoring/users/:user_id", get(monitoring::user_detail))
        .route("/admin/progress-monitoring/module-stats", get(monitoring::module_stats))
        .route("/admin/progress-monitoring/stuck-users/:module_id", get(monitoring::stuck_users))
        .route("/admin/progress-monitoring/reading-progress", get(monitoring::reading_progress))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn(jwt_auth_middleware))
}

fn cors_layer() -> CorsLayer {
    let config = config::config();
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims};
    use crate::database::seed::demo_catalog;
    use crate::database::MemoryStore;
    use crate::types::Role;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn app() -> (Router, crate::database::seed::DemoCatalog) {
        let store = Arc::new(MemoryStore::new());
        let demo = demo_catalog(&store).await;
        (router(AppState::new(store)), demo)
    }

    fn bearer(user_id: Uuid, role: Role) -> String {
        let token = generate_jwt(&Claims::new(user_id, None, role)).unwrap();
        format!("Bearer {}", token)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let (app, demo) = app().await;
        let response = app
            .oneshot(
                Request::get(format!("/api/v1/progress/modules/{}", demo.module_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], Value::Bool(false));
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn learners_cannot_reach_admin_routes() {
        let (app, demo) = app().await;
        let response = app
            .oneshot(
                Request::get("/api/v1/admin/progress-monitoring/stats")
                    .header(header::AUTHORIZATION, bearer(demo.learner_id, Role::Learner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_routes_use_the_error_envelope() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_path_ids_are_bad_requests() {
        let (app, demo) = app().await;
        let response = app
            .oneshot(
                Request::get("/api/v1/progress/modules/not-a-uuid")
                    .header(header::AUTHORIZATION, bearer(demo.learner_id, Role::Learner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
