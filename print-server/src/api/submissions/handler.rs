//! Submission Handlers

use std::net::SocketAddr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Multipart, Path, Query, Request, State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, StatusCode, header};
use serde::{Deserialize, Serialize};
use shared::SubmissionId;
use shared::error::{ApiResponse, AppError, AppResult, ErrorCode};

use crate::core::ServerState;
use crate::db::repository::{SubmissionRecord, submission};
use crate::intake::SubmissionRequest;

/// Default page size of the guestbook listing
const DEFAULT_PAGE: i64 = 20;
const MAX_PAGE: i64 = 100;

/// JSON submission body; the image is base64 encoded
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmissionBody {
    pub title: Option<String>,
    pub text: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub identifier: SubmissionId,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionPage {
    pub items: Vec<SubmissionRecord>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct SubmissionCount {
    pub count: i64,
}

/// Originating address: first `X-Forwarded-For` hop, else the peer
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// POST /api/submissions
///
/// Accepts JSON or `multipart/form-data`; answers 202 once the envelope is
/// handed to the broker.
pub async fn create(
    State(state): State<ServerState>,
    request: Request,
) -> AppResult<(StatusCode, Json<ApiResponse<Accepted>>)> {
    let intake = state.intake()?;

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_address(request.headers(), peer);

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let submission = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| body_error(e.status(), format!("Invalid multipart request: {e}")))?;
        read_multipart(multipart).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| body_error(e.status(), format!("Unreadable body: {e}")))?;
        read_json(&body)?
    };

    let identifier = intake.submit(submission, &client).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success_with_message("Accepted", Accepted { identifier })),
    ))
}

fn read_json(body: &[u8]) -> AppResult<SubmissionRequest> {
    let body: SubmissionBody = serde_json::from_slice(body)
        .map_err(|e| AppError::invalid_request(format!("Invalid JSON body: {e}")))?;

    let image = match body.image {
        Some(encoded) => Some(STANDARD.decode(encoded.trim()).map_err(|_| {
            AppError::validation("Submission rejected").with_detail("image", "must be base64 encoded")
        })?),
        None => None,
    };

    Ok(SubmissionRequest {
        title: body.title,
        text: body.text,
        image,
    })
}

async fn read_multipart(mut multipart: Multipart) -> AppResult<SubmissionRequest> {
    let mut request = SubmissionRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), format!("Invalid multipart request: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => request.title = Some(read_text(field).await?),
            "text" => request.text = read_text(field).await?,
            "image" => {
                // Browsers send an empty, unnamed part when no file was picked
                let unnamed = field.file_name().is_none_or(str::is_empty);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| body_error(e.status(), format!("Multipart error: {e}")))?;
                if !(unnamed && data.is_empty()) {
                    request.image = Some(data.to_vec());
                }
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }
    Ok(request)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| body_error(e.status(), format!("Multipart error: {e}")))
}

/// Extractor failures keep their size verdict: 413 past the body cap, 400 otherwise
fn body_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::with_message(ErrorCode::PayloadTooLarge, message)
    } else {
        AppError::invalid_request(message)
    }
}

/// GET /api/submissions
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<SubmissionPage>>> {
    let db = state.db()?;
    let offset = query.offset.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

    let items = submission::list(&db.pool, offset, limit).await?;
    let total = submission::count(&db.pool).await?;

    Ok(Json(ApiResponse::success(SubmissionPage {
        items,
        total,
        offset,
        limit,
    })))
}

/// GET /api/submissions/count
pub async fn count(State(state): State<ServerState>) -> AppResult<Json<ApiResponse<SubmissionCount>>> {
    let db = state.db()?;
    let count = submission::count(&db.pool).await?;
    Ok(Json(ApiResponse::success(SubmissionCount { count })))
}

/// GET /api/submissions/{identifier}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(identifier): Path<String>,
) -> AppResult<Json<ApiResponse<SubmissionRecord>>> {
    let db = state.db()?;
    let identifier: SubmissionId = identifier
        .parse()
        .map_err(|_| AppError::not_found(format!("Submission {identifier}")))?;

    let record = submission::find(&db.pool, &identifier.to_string())
        .await?
        .ok_or_else(|| AppError::not_found(format!("Submission {identifier}")))?;
    Ok(Json(ApiResponse::success(record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_address_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        assert_eq!(client_address(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_address_falls_back_to_peer() {
        let peer: SocketAddr = "192.168.1.20:40000".parse().unwrap();
        assert_eq!(client_address(&HeaderMap::new(), Some(peer)), "192.168.1.20");
        assert_eq!(client_address(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_body_error_keeps_payload_too_large() {
        let err = body_error(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded".into());
        assert_eq!(err.code, ErrorCode::PayloadTooLarge);
        assert_eq!(err.http_status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = body_error(StatusCode::BAD_REQUEST, "boundary missing".into());
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_read_json_decodes_image() {
        let req = read_json(br#"{"text":"hi","image":"AQID"}"#).unwrap();
        assert_eq!(req.image, Some(vec![1, 2, 3]));
        assert!(req.title.is_none());

        let err = read_json(br#"{"text":"hi","image":"***"}"#).unwrap_err();
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert!(read_json(b"not json").is_err());
    }
}
