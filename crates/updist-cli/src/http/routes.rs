//! Route handlers

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use updist_core::{GenerateRequest, GeneratedPackage, UploadRequest};
use updist_schema::{EligibilityDecision, PackageId, PackageInfo};

use super::AppState;
use super::auth::AuthCaller;
use super::error::ApiError;

const X_UPDATE_VERSION: HeaderName = HeaderName::from_static("x-update-version");
const X_CHECKSUM: HeaderName = HeaderName::from_static("x-checksum");

fn parse_id(id: &str) -> Result<PackageId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("'{id}' is not a valid update id")))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|_| ApiError::Rejected {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "internal server error".to_string(),
    })
}

/// Route: GET /health
pub(crate) async fn health() -> &'static str {
    "OK"
}

/// Route: POST /admin/update/upload
///
/// Multipart form with a `file` part and an optional `checksum` part.
pub(crate) async fn upload(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PackageInfo>), ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut checksum = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(ApiError::from)?;
                file = Some((filename, bytes));
            }
            Some("checksum") => {
                let text = field.text().await.map_err(ApiError::from)?;
                checksum = Some(text).filter(|c| !c.trim().is_empty());
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(ApiError::BadRequest("missing 'file' part".to_string()));
    };

    let info = state
        .service
        .upload(
            &caller,
            UploadRequest {
                filename,
                bytes,
                checksum,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Route: POST /admin/update/generate
pub(crate) async fn generate(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GeneratedPackage>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let generated = state.generator.generate(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(generated)))
}

/// Route: GET /admin/updates
pub(crate) async fn list(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Vec<PackageInfo>>, ApiError> {
    Ok(Json(state.service.list(&caller).await?))
}

/// Route: GET /admin/update/:id
pub(crate) async fn get_update(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<Json<PackageInfo>, ApiError> {
    Ok(Json(state.service.get(&caller, parse_id(&id)?).await?))
}

/// Route: POST /admin/update/:id/deactivate
pub(crate) async fn deactivate(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<Json<PackageInfo>, ApiError> {
    Ok(Json(state.service.deactivate(&caller, parse_id(&id)?).await?))
}

/// Route: DELETE /admin/update/:id
pub(crate) async fn delete(
    State(state): State<AppState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let version = state.service.delete(&caller, id).await?;
    Ok(Json(json!({ "id": id, "version": version, "deleted": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckParams {
    tenant_id: Option<String>,
    version: Option<String>,
}

/// Route: GET /update/check?tenantId=&version=
pub(crate) async fn check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<EligibilityDecision>, ApiError> {
    let (Some(tenant), Some(version)) = (params.tenant_id, params.version) else {
        return Err(ApiError::BadRequest(
            "'tenantId' and 'version' are required".to_string(),
        ));
    };
    Ok(Json(state.service.check_for_updates(&tenant, &version).await?))
}

/// Route: GET /update/download/:id
///
/// Streams the archive; the body is never buffered whole.
pub(crate) async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.service.download(parse_id(&id)?).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        download.filename.replace(['"', '\\'], "_")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"update.zip\""));
    let version = header_value(download.version.as_str())?;
    let checksum = header_value(download.checksum.as_str())?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(download.content_type)),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
        (X_UPDATE_VERSION, version),
        (X_CHECKSUM, checksum),
    ];
    let body = Body::from_stream(ReaderStream::new(download.stream));
    Ok((headers, body).into_response())
}
