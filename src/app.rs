use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::error::{ApiError, StorageErrorDetail};
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::ordering::{AssociationKind, Relation};
use crate::services::{AuthService, CatalogEntity, CatalogService};

/// Shared request state. Cloned per request; both fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.pool.clone())
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.pool.clone(), self.config.security.clone())
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth_routes())
        .merge(catalog_routes())
        .merge(ordering_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    let app = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Protected API
        .merge(protected)
        // Global middleware
        .layer(middleware::from_fn_with_state(state.clone(), storage_error_detail))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(cors_layer(&state.config));

    let app = if state.config.api.enable_request_logging {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    };
    app.with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
}

fn auth_routes() -> Router<AppState> {
    use protected::auth;

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/session", axum::routing::delete(auth::logout))
}

fn catalog_routes() -> Router<AppState> {
    use protected::{associations, catalog};

    let mut router = Router::new();
    for entity in CatalogEntity::ALL {
        let entity_routes = Router::new()
            .route(
                &format!("/api/{}", entity.table()),
                get(catalog::list).post(catalog::create),
            )
            .route(
                &format!("/api/{}/:id", entity.table()),
                get(catalog::show).put(catalog::update).delete(catalog::delete),
            )
            .layer(Extension(entity));
        router = router.merge(entity_routes);
    }

    // Child-level default associations
    for kind in [
        AssociationKind::TaskSensors,
        AssociationKind::TaskDomains,
        AssociationKind::SubsectionSensors,
    ] {
        let path = format!("/api/{}/:id/{}", kind.relation().child_table(), kind.slug());
        router = router.merge(
            Router::new()
                .route(&path, get(associations::list_defaults).put(associations::replace_defaults))
                .layer(Extension(kind)),
        );
    }

    router
}

fn ordering_routes() -> Router<AppState> {
    use protected::{associations, ordering};

    let mut router = Router::new();
    for relation in Relation::ALL {
        let base = format!("/api/{}/:id/{}", relation.parent_table(), relation.child_table());
        let relation_routes = Router::new()
            .route(
                &base,
                get(ordering::list).post(ordering::insert).put(ordering::reorder),
            )
            .route(
                &format!("{}/:child_id", base),
                axum::routing::patch(ordering::move_position)
                    .put(ordering::update_details)
                    .delete(ordering::remove),
            )
            .layer(Extension(relation));
        router = router.merge(relation_routes);
    }

    router
        .route(
            "/api/memberships/:relation/:membership_id/:kind",
            get(associations::list_membership).put(associations::replace_membership),
        )
        .route("/api/resequence", post(ordering::resequence))
}

/// Outside production, storage errors carry their underlying text
async fn storage_error_detail(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if state.config.is_production() {
        return response;
    }
    match response.extensions().get::<StorageErrorDetail>() {
        Some(StorageErrorDetail(detail)) => ApiError::internal_server_error(detail.clone()).into_response(),
        None => response,
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    if config.security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Protocol API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Protocols, sections and tasks with ordered memberships",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/auth/register, /auth/login, /auth/refresh (public - token acquisition)",
                "auth": "/api/auth/whoami, /api/auth/session (protected)",
                "catalog": "/api/{sensors,domains,tasks,subsections,sections,protocols}[/:id] (protected)",
                "defaults": "/api/tasks/:id/{sensors,domains}, /api/subsections/:id/sensors (protected)",
                "ordering": "/api/protocols/:id/tasks, /api/sections/:id/subsections, /api/protocols/:id/sections[/:child_id] (protected)",
                "memberships": "/api/memberships/:relation/:membership_id/:kind (protected)",
                "resequence": "/api/resequence (protected)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": {
                        "kind": "DatabaseError",
                        "code": "SERVICE_UNAVAILABLE",
                        "message": "database unavailable"
                    }
                })),
            )
        }
    }
}
