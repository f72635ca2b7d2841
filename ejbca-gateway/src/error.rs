// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! Error types for the gateway and its SOAP client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub use crate::soap::Fault;

/// Errors that occur while talking to the CA's SOAP service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SoapError {
    /// The HTTP exchange with the CA failed.
    ///
    /// This covers connection failures, TLS handshake failures (for example, if the CA
    /// rejects the client certificate), timeouts, and failures while reading the response
    /// body. Retrying may succeed if the cause was a transient network issue.
    #[error("failed to exchange SOAP messages with the CA: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request envelope could not be serialized.
    ///
    /// This is almost certainly a bug; retrying will not help.
    #[error("failed to create the SOAP envelope: {0}")]
    Envelope(#[from] std::io::Error),

    /// The CA responded with a SOAP fault.
    ///
    /// Whether retrying helps depends on the fault; most faults are caused by the request
    /// itself (unknown user, wrong password, user in the wrong state) and will never succeed.
    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Errors the [`crate::client::SoapClient`] may return when it is created.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The credentials could not be read from the filesystem.
    #[error("an I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The certificate or private key is invalid, or they do not match.
    #[error("openssl could not load the client credentials: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// The private key does not belong to the certificate.
    #[error("the private key does not match the certificate in {0:?}")]
    KeyMismatch(std::path::PathBuf),

    /// The certificate file contained no PEM-encoded certificates.
    #[error("no certificate found in {0:?}")]
    MissingCertificate(std::path::PathBuf),

    /// The HTTP client could not be configured with the provided credentials.
    #[error("the HTTP client could not be configured: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors returned by the HTTP handlers.
///
/// Each variant maps to a response status; see the [`IntoResponse`] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The caller sent a request the gateway could not make sense of.
    #[error("{0}")]
    BadRequest(String),

    /// The call to the CA failed.
    #[error(transparent)]
    Soap(#[from] SoapError),

    /// A non-SOAP upstream, such as the OCSP responder, failed.
    #[error("{0}")]
    Upstream(String),

    /// Generic error that indicates a bug in the gateway.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Soap(_) | GatewayError::Upstream(_) | GatewayError::Fatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            GatewayError::Soap(SoapError::Fault(fault)) => {
                tracing::warn!(
                    fault_code = %fault.code,
                    internal_error_code = ?fault.internal_error_code,
                    "{fault}"
                );
            }
            GatewayError::BadRequest(reason) => {
                tracing::debug!(reason, "Rejecting malformed request");
            }
            error => tracing::error!(?error, "Request failed"),
        }
        (status, self.to_string()).into_response()
    }
}
