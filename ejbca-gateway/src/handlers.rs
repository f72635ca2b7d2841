// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! The plain HTTP form endpoints.
//!
//! Every endpoint accepts any method. Form fields are read from the query string and, for
//! `POST`, `PUT`, and `PATCH` requests, from an `application/x-www-form-urlencoded` body. When
//! a field appears in both, the body wins. Missing fields are treated as empty.

use std::{collections::HashSet, sync::Arc};

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, Method},
    response::Html,
    routing::any,
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::GatewayError,
    server::Gateway,
    soap::{Pkcs12Request, ProfileType, UserData},
};

/// The form endpoints, relative to the root of the server.
pub fn router() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/request-cert", any(request_cert))
        .route("/edit-user", any(edit_user))
        .route("/get-crl", any(get_crl))
        .route("/view-ca", any(view_ca))
        .route("/view-profile", any(view_profile))
}

/// An extractor for form fields from the query string and the request body.
#[derive(Debug, Clone, Default)]
pub struct FormFields<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for FormFields<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = request.uri().query().unwrap_or_default().to_string();
        let body = if has_form_body(&request) {
            Bytes::from_request(request, state)
                .await
                .map_err(|rejection| {
                    tracing::debug!(%rejection, "Unable to read form body");
                    form_error()
                })?
        } else {
            Bytes::new()
        };

        let fields = merge_fields(&query, &body).map_err(|error| {
            tracing::debug!(%error, "Unable to decode form fields");
            form_error()
        })?;
        serde_urlencoded::to_string(&fields)
            .ok()
            .and_then(|encoded| serde_urlencoded::from_str(&encoded).ok())
            .map(FormFields)
            .ok_or_else(form_error)
    }
}

fn has_form_body(request: &Request) -> bool {
    [Method::POST, Method::PUT, Method::PATCH].contains(request.method())
        && request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| {
                mime.trim()
                    .eq_ignore_ascii_case("application/x-www-form-urlencoded")
            })
}

/// Combine body and query fields, keeping the first value of each name. Body fields come first.
fn merge_fields(
    query: &str,
    body: &[u8],
) -> Result<Vec<(String, String)>, serde_urlencoded::de::Error> {
    let mut fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
    fields.extend(serde_urlencoded::from_str::<Vec<(String, String)>>(query)?);
    let mut seen = HashSet::new();
    fields.retain(|(name, _)| seen.insert(name.clone()));
    Ok(fields)
}

/// A request for a new key store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateRequest {
    pub username: String,
    pub password: String,
}

/// Fields accepted by the `/edit-user` endpoint.
///
/// Every field is a string, as submitted; they are validated when the request is handled.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditUserForm {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(rename = "subjectDN")]
    pub subject_dn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_recoverable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Fields accepted by the `/get-crl` endpoint.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrlForm {
    /// Set to `true` to request the delta CRL.
    #[serde(rename = "deltaCRL")]
    pub delta_crl: String,
}

fn form_error() -> GatewayError {
    GatewayError::BadRequest("Failed to parse form".to_string())
}

/// Non-empty values, with empty ones treated as missing.
fn provided(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

#[instrument(skip_all)]
async fn request_cert(
    State(gateway): State<Arc<Gateway>>,
    FormFields(form): FormFields<CertificateRequest>,
) -> Result<String, GatewayError> {
    tracing::info!(username = form.username, "Requesting key store");

    let request = Pkcs12Request {
        username: form.username,
        password: form.password,
        end_entity_profile: gateway.ejbca.end_entity_profile.clone(),
        certificate_profile: gateway.ejbca.certificate_profile.clone(),
        key_algorithm: gateway.ejbca.key_algorithm.clone(),
    };
    Ok(gateway.soap.pkcs12_req(request).await?)
}

#[instrument(skip_all)]
async fn edit_user(
    State(gateway): State<Arc<Gateway>>,
    FormFields(form): FormFields<EditUserForm>,
) -> Result<&'static str, GatewayError> {
    let status = provided(form.status)
        .map(|status| status.trim().parse::<i32>())
        .transpose()
        .map_err(|_| GatewayError::BadRequest("Invalid status".to_string()))?
        .unwrap_or(gateway.ejbca.default_status);
    let key_recoverable = form.key_recoverable.as_deref() == Some("true");
    let token_type = provided(form.token_type).unwrap_or_else(|| gateway.ejbca.token_type.clone());
    tracing::info!(
        username = form.username,
        status,
        key_recoverable,
        token_type,
        "Editing end entity"
    );

    let user = UserData {
        ca_name: gateway.ejbca.ca_name.clone(),
        certificate_profile_name: gateway.ejbca.certificate_profile.clone(),
        email: form.email,
        end_entity_profile_name: gateway.ejbca.end_entity_profile.clone(),
        key_recoverable,
        password: form.password,
        status,
        subject_dn: form.subject_dn,
        token_type,
        username: form.username,
    };
    gateway.soap.edit_user(user).await?;

    Ok("OK")
}

#[instrument(skip_all)]
async fn get_crl(
    State(gateway): State<Arc<Gateway>>,
    FormFields(form): FormFields<CrlForm>,
) -> Result<String, GatewayError> {
    let delta = form.delta_crl == "true";
    let ca_name = gateway.ejbca.crl_ca_name.clone();
    tracing::info!(ca_name, delta, "Fetching latest CRL");

    Ok(gateway.soap.latest_crl(ca_name, delta).await?)
}

#[instrument(skip_all)]
async fn view_ca(State(gateway): State<Arc<Gateway>>) -> Result<Html<String>, GatewayError> {
    let cas = gateway.soap.available_cas().await?;
    Ok(page("Available CAs", &cas))
}

#[instrument(skip_all)]
async fn view_profile(State(gateway): State<Arc<Gateway>>) -> Result<Html<String>, GatewayError> {
    let mut profiles = String::new();
    for profile_type in [ProfileType::EndEntity, ProfileType::Certificate] {
        match gateway.soap.profiles(profile_type).await {
            Ok(response) => {
                tracing::debug!(%profile_type, length = response.len(), "Fetched profiles");
                profiles.push_str(&response);
            }
            Err(error) => {
                tracing::warn!(%profile_type, ?error, "Failed to fetch profiles; skipping");
            }
        }
    }

    if profiles.is_empty() {
        return Err(GatewayError::Upstream(
            "No profiles could be fetched".to_string(),
        ));
    }

    Ok(page("Profiles", &profiles))
}

/// Render a CA response for display in a browser.
fn page(title: &str, content: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
        quick_xml::escape::escape(content)
    ))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{client, config::tests::combined_pem, server};

    fn gateway(dir: &Path) -> anyhow::Result<Arc<Gateway>> {
        let config = server::Config {
            soap: client::Config {
                // Nothing listens here.
                endpoint: "http://127.0.0.1:9/ejbca/ejbcaws/ejbcaws".to_string(),
                credentials: combined_pem(dir, "ejbca-gateway")?,
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(Arc::new(Gateway::new(&config)?))
    }

    #[test]
    fn body_fields_take_precedence() -> anyhow::Result<()> {
        let fields = merge_fields("username=query&deltaCRL=true", b"username=body&password=p%3Dw")?;
        assert_eq!(
            fields,
            vec![
                ("username".to_string(), "body".to_string()),
                ("password".to_string(), "p=w".to_string()),
                ("deltaCRL".to_string(), "true".to_string()),
            ]
        );
        assert!(merge_fields("", b"")?.is_empty());

        Ok(())
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn malformed_input_is_logged_once_at_debug() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/edit-user?username=alice&status=new")
            .body(Body::empty())?;
        let response = router()
            .with_state(gateway(dir.path())?)
            .oneshot(request)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            to_bytes(response.into_body(), usize::MAX).await?.as_ref(),
            b"Invalid status"
        );
        assert!(logs_contain("Rejecting malformed request"));
        assert!(!logs_contain("ERROR"));

        Ok(())
    }

    #[tokio::test]
    async fn unreadable_form_body_is_bad_request() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        // Larger than the default body limit.
        let body = format!("username={}", "a".repeat(3 * 1024 * 1024));
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/request-cert")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?;
        let response = router()
            .with_state(gateway(dir.path())?)
            .oneshot(request)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            to_bytes(response.into_body(), usize::MAX).await?.as_ref(),
            b"Failed to parse form"
        );

        Ok(())
    }

    // Bodies that aren't forms are ignored rather than rejected, so the request reaches the
    // (unreachable) CA.
    #[tokio::test]
    async fn non_form_body_is_ignored() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/get-crl")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"deltaCRL\": true}"))?;
        let response = router()
            .with_state(gateway(dir.path())?)
            .oneshot(request)
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        Ok(())
    }

    #[test]
    fn page_escapes_content() {
        let Html(html) = page("Available CAs", "<return><name>Root & Sub</name></return>");
        assert!(html.contains(
            "<pre>&lt;return&gt;&lt;name&gt;Root &amp; Sub&lt;/name&gt;&lt;/return&gt;</pre>"
        ));
        assert!(html.contains("<title>Available CAs</title>"));
    }

    #[test]
    fn empty_values_are_missing() {
        assert_eq!(provided(Some(String::new())), None);
        assert_eq!(provided(None), None);
        assert_eq!(provided(Some("20".to_string())), Some("20".to_string()));
    }

    #[test]
    fn edit_user_form_field_names() -> anyhow::Result<()> {
        let form: EditUserForm = serde_urlencoded::from_str(
            "username=alice&subjectDN=CN%3Dalice&keyRecoverable=true&status=40&tokenType=USERGENERATED",
        )?;
        assert_eq!(form.username, "alice");
        assert_eq!(form.subject_dn, "CN=alice");
        assert_eq!(form.key_recoverable.as_deref(), Some("true"));
        assert_eq!(form.status.as_deref(), Some("40"));
        assert_eq!(form.token_type.as_deref(), Some("USERGENERATED"));
        assert_eq!(form.email, "");

        Ok(())
    }
}
