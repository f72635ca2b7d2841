// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! REST/JSON aliases for the form endpoints.
//!
//! Each JSON request is re-encoded as a form submission and replayed in-process through the
//! matching form endpoint in [`crate::handlers`]. The recorded status, `Content-Type`, and body
//! are then returned to the caller, so both surfaces always behave identically.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, RawQuery, State},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower::ServiceExt;
use tracing::instrument;

use crate::{
    error::GatewayError,
    handlers::{self, CertificateRequest, EditUserForm},
    ocsp,
    server::Gateway,
};

/// The REST endpoints, relative to the root of the server.
pub fn router() -> Router<Arc<Gateway>> {
    Router::new()
        .route(
            "/api/request-cert",
            post(request_cert).fallback(post_only),
        )
        .route("/api/edit-user", post(edit_user).fallback(post_only))
        .route("/api/get-crl", get(get_crl).fallback(get_only))
        .route("/api/ocsp", get(ocsp::download).fallback(get_only))
}

/// The JSON body accepted by `/api/edit-user`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(rename = "subjectDN")]
    pub subject_dn: String,
    pub token_type: Option<String>,
    pub key_recoverable: Option<bool>,
    pub status: Option<i32>,
}

impl From<EditUserRequest> for EditUserForm {
    fn from(request: EditUserRequest) -> Self {
        Self {
            username: request.username,
            password: request.password,
            email: request.email,
            subject_dn: request.subject_dn,
            key_recoverable: request.key_recoverable.map(|flag| flag.to_string()),
            status: request.status.map(|status| status.to_string()),
            token_type: request.token_type,
        }
    }
}

async fn post_only() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Only POST method is allowed")
}

async fn get_only() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Only GET method is allowed")
}

fn parse_json<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, GatewayError> {
    let body = body.map_err(|rejection| {
        tracing::debug!(%rejection, "Unable to read request body");
        GatewayError::BadRequest("Failed to read request body".to_string())
    })?;
    serde_json::from_slice(&body).map_err(|error| {
        tracing::debug!(%error, "Request body is not valid JSON");
        GatewayError::BadRequest("Invalid JSON format".to_string())
    })
}

#[instrument(skip_all)]
async fn request_cert(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let request: CertificateRequest = parse_json(body)?;
    let form = serde_urlencoded::to_string(&request).context("Failed to encode form")?;
    replay(gateway, post_form("/request-cert", form)?).await
}

#[instrument(skip_all)]
async fn edit_user(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let request: EditUserRequest = parse_json(body)?;
    let form = serde_urlencoded::to_string(EditUserForm::from(request))
        .context("Failed to encode form")?;
    replay(gateway, post_form("/edit-user", form)?).await
}

#[instrument(skip_all)]
async fn get_crl(
    State(gateway): State<Arc<Gateway>>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let uri = match query {
        Some(query) => format!("/get-crl?{query}"),
        None => "/get-crl".to_string(),
    };
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .context("Failed to create request")?;
    replay(gateway, request).await
}

fn post_form(path: &str, form: String) -> Result<Request<Body>, GatewayError> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .context("Failed to create request")?)
}

/// Dispatch a request through the form endpoints and relay the recorded response.
async fn replay(gateway: Arc<Gateway>, request: Request<Body>) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();
    let recorded = handlers::router()
        .with_state(gateway)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    tracing::debug!(path, status = %recorded.status(), "Replayed request through form endpoint");

    let (parts, body) = recorded.into_parts();
    let mut response = body.into_response();
    *response.status_mut() = parts.status;
    if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, content_type.clone());
    }

    Ok(response)
}
