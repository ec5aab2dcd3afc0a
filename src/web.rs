//! JSON HTTP boundary over the grant and query services.
//!
//! Handlers are thin: they decode the request, call into the core, and let
//! `PermsError` pick the status code.
use crate::catalog::ResourceTypeCatalog;
use crate::errors::{ErrorKind, PermsError};
use crate::grant::GrantService;
use crate::identity::IdentityResolver;
use crate::models::{
    PermissionGrantRequest, PermissionView, Resource, ResourceIn, ResourceType, Subject, SubjectIn,
};
use crate::query::{PermissionFilter, PermissionList, QueryService};
use crate::settings::Settings;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub catalog: ResourceTypeCatalog,
    pub identities: IdentityResolver,
    pub grants: GrantService,
    pub query: QueryService,
}

impl AppState {
    pub fn new(db: DatabaseConnection, settings: &Settings, catalog: ResourceTypeCatalog) -> Self {
        let identities = IdentityResolver::new(settings.subjects.types.clone(), catalog.clone());
        Self {
            grants: GrantService::new(db.clone(), identities.clone()),
            query: QueryService::new(db.clone(), identities.clone()),
            db,
            catalog,
            identities,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub kind: ErrorKind,
    pub reason: String,
}

impl IntoResponse for PermsError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, reason) = match kind {
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, self.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ErrorKind::StoreUnavailable => {
                tracing::warn!(error = %self, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage is temporarily unavailable".to_string(),
                )
            }
            ErrorKind::ConstraintViolation | ErrorKind::Internal => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        let mut response = (status, Json(ErrorOut { kind, reason })).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<JsonRejection> for PermsError {
    fn from(rejection: JsonRejection) -> Self {
        PermsError::InvalidInput(rejection.body_text())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/resource_types",
            get(list_resource_types).post(add_resource_type),
        )
        .route(
            "/resource_types/{id}",
            put(rename_resource_type).delete(delete_resource_type),
        )
        .route("/subjects", get(list_subjects).put(add_subject))
        .route("/resources", get(list_resources).put(add_resource))
        .route("/permissions", get(list_permissions).put(grant_permission))
        .route("/permissions/revoke", post(revoke_permission))
        .route(
            "/permissions/subjects/{subject_type}/{subject_id}",
            get(list_subject_permissions),
        )
        .route(
            "/permissions/resources/{resource_type}/{resource_name}",
            get(list_resource_permissions),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: Settings, state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Permissions API listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct ResourceTypeIn {
    name: String,
}

async fn list_resource_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResourceType>>, PermsError> {
    Ok(Json(state.catalog.list(&state.db).await?))
}

async fn add_resource_type(
    State(state): State<AppState>,
    payload: Result<Json<ResourceTypeIn>, JsonRejection>,
) -> Result<(StatusCode, Json<ResourceType>), PermsError> {
    let Json(req) = payload?;
    let resource_type = state.catalog.register(&state.db, &req.name).await?;
    Ok((StatusCode::CREATED, Json(resource_type)))
}

async fn rename_resource_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ResourceTypeIn>, JsonRejection>,
) -> Result<Json<ResourceType>, PermsError> {
    let Json(req) = payload?;
    Ok(Json(state.catalog.rename(&state.db, &id, &req.name).await?))
}

async fn delete_resource_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, PermsError> {
    state.catalog.delete(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subjects(State(state): State<AppState>) -> Result<Json<Vec<Subject>>, PermsError> {
    Ok(Json(state.identities.list_subjects(&state.db).await?))
}

async fn add_subject(
    State(state): State<AppState>,
    payload: Result<Json<SubjectIn>, JsonRejection>,
) -> Result<Json<Subject>, PermsError> {
    let Json(req) = payload?;
    let subject = state
        .identities
        .register_subject(&state.db, &req.subject_id, &req.subject_type)
        .await?;
    Ok(Json(subject))
}

async fn list_resources(State(state): State<AppState>) -> Result<Json<Vec<Resource>>, PermsError> {
    Ok(Json(state.identities.list_resources(&state.db).await?))
}

async fn add_resource(
    State(state): State<AppState>,
    payload: Result<Json<ResourceIn>, JsonRejection>,
) -> Result<Json<Resource>, PermsError> {
    let Json(req) = payload?;
    let resource = state
        .identities
        .register_resource(&state.db, &req.name, &req.resource_type)
        .await?;
    Ok(Json(resource))
}

async fn list_permissions(
    State(state): State<AppState>,
    Query(filter): Query<PermissionFilter>,
) -> Result<Json<PermissionList>, PermsError> {
    let permissions = state.query.list(&filter).await?;
    Ok(Json(PermissionList { permissions }))
}

async fn grant_permission(
    State(state): State<AppState>,
    payload: Result<Json<PermissionGrantRequest>, JsonRejection>,
) -> Result<Json<PermissionView>, PermsError> {
    let Json(req) = payload?;
    Ok(Json(state.grants.grant_request(&req).await?))
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    subject: SubjectIn,
    resource: ResourceIn,
}

async fn revoke_permission(
    State(state): State<AppState>,
    payload: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<StatusCode, PermsError> {
    let Json(req) = payload?;
    state
        .grants
        .revoke(
            &req.subject.subject_id,
            &req.subject.subject_type,
            &req.resource.name,
            &req.resource.resource_type,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subject_permissions(
    State(state): State<AppState>,
    Path((subject_type, subject_id)): Path<(String, String)>,
) -> Result<Json<PermissionList>, PermsError> {
    let permissions = state
        .query
        .list_for_subject(&subject_type, &subject_id)
        .await?;
    Ok(Json(PermissionList { permissions }))
}

async fn list_resource_permissions(
    State(state): State<AppState>,
    Path((resource_type, resource_name)): Path<(String, String)>,
) -> Result<Json<PermissionList>, PermsError> {
    let permissions = state
        .query
        .list_for_resource(&resource_type, &resource_name)
        .await?;
    Ok(Json(PermissionList { permissions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (PermsError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (PermsError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                PermsError::StoreUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PermsError::ConstraintViolation("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let retryable = err.is_retryable();
            let response = err.into_response();
            assert_eq!(response.status(), status);
            assert_eq!(
                response.headers().contains_key(header::RETRY_AFTER),
                retryable
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_input() {
        let rejection = axum::Json::<PermissionGrantRequest>::from_request(
            axum::http::Request::builder()
                .method("PUT")
                .header(header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(r#"{"permission_level":"admin"}"#))
                .unwrap(),
            &(),
        )
        .await
        .unwrap_err();

        let err = PermsError::from(rejection);
        assert!(matches!(err, PermsError::InvalidInput(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
