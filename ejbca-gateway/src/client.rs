// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! The client for EJBCA's SOAP web service.

use std::{path::PathBuf, time::Duration};

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::Credentials,
    error::{ClientError, SoapError},
    soap::{
        Fault, Operation, Pkcs12Request, ProfileType, UserData, LATEST_CRL_RESPONSE,
        PKCS12_RESPONSE,
    },
};

/// Configuration for the SOAP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The URL of EJBCA's web service endpoint.
    pub endpoint: String,
    /// Whether to verify the TLS certificate the CA presents.
    ///
    /// This is disabled by default since EJBCA is commonly deployed with a certificate issued
    /// by its own management CA. When enabled, `credentials.ca_certificate` is trusted in
    /// addition to the system's trust store.
    pub verify_upstream: bool,
    /// How long to wait for the CA to respond before failing the request.
    pub request_timeout: Duration,
    /// The credentials to use when authenticating to the CA. The certificate must belong to
    /// an EJBCA administrator allowed to perform the operations the gateway exposes.
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost:8443/ejbca/ejbcaws/ejbcaws".to_string(),
            verify_upstream: false,
            request_timeout: Duration::from_secs(30),
            credentials: Credentials {
                certificate: PathBuf::from("ejbca-gateway.client.pem"),
                private_key: PathBuf::from("ejbca-gateway.client.pem"),
                ca_certificate: None,
            },
        }
    }
}

/// A client for the EJBCA web service.
///
/// The client is cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct SoapClient {
    endpoint: String,
    http: reqwest::Client,
}

impl SoapClient {
    /// Create a new client.
    ///
    /// The credentials are loaded immediately, so any problem with them is reported here
    /// rather than on the first request.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .identity(config.credentials.identity()?)
            .timeout(config.request_timeout);
        if config.verify_upstream {
            if let Some(ca_certificate) = config.credentials.ca_certificate()? {
                builder = builder.add_root_certificate(ca_certificate);
            }
        } else {
            tracing::warn!(
                endpoint = config.endpoint,
                "TLS certificate verification for the CA is disabled"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            endpoint: config.endpoint.clone(),
            http: builder.build()?,
        })
    }

    /// Send an operation to the CA and return the raw response body.
    ///
    /// # Errors
    ///
    /// If the CA responds with a SOAP fault, it is returned as [`SoapError::Fault`].
    #[instrument(
        skip_all,
        err,
        fields(operation = operation.name(), request_id = %Uuid::now_v7())
    )]
    pub async fn call(&self, operation: &Operation) -> Result<String, SoapError> {
        let envelope = operation.envelope()?;
        // Envelopes may include end entity passwords.
        tracing::trace!(%envelope, "Sending SOAP request");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml")
            .body(envelope)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%status, length = body.len(), "Received SOAP response");

        if let Some(fault) = Fault::parse(&body) {
            return Err(fault.into());
        }
        if !status.is_success() {
            tracing::warn!(%status, "CA responded with an error status but no SOAP fault");
        }

        Ok(body)
    }

    /// Generate a key pair and certificate for an end entity.
    ///
    /// Returns the base64-encoded PKCS#12 key store.
    pub async fn pkcs12_req(&self, request: Pkcs12Request) -> Result<String, SoapError> {
        let body = self.call(&Operation::Pkcs12Req(request)).await?;
        Ok(PKCS12_RESPONSE.strip(&body))
    }

    /// Create or update an end entity.
    pub async fn edit_user(&self, user: UserData) -> Result<(), SoapError> {
        self.call(&Operation::EditUser(user)).await?;
        Ok(())
    }

    /// Get the latest CRL (or delta CRL) issued by a CA.
    ///
    /// Returns the base64-encoded CRL.
    pub async fn latest_crl(&self, ca_name: String, delta: bool) -> Result<String, SoapError> {
        let body = self
            .call(&Operation::GetLatestCrl { ca_name, delta })
            .await?;
        Ok(LATEST_CRL_RESPONSE.strip(&body))
    }

    /// List the CAs the gateway's administrator certificate is authorized to use.
    ///
    /// Returns the complete response document.
    pub async fn available_cas(&self) -> Result<String, SoapError> {
        self.call(&Operation::GetAvailableCas).await
    }

    /// List the profiles of the given type.
    ///
    /// Returns the complete response document.
    pub async fn profiles(&self, profile_type: ProfileType) -> Result<String, SoapError> {
        self.call(&Operation::GetProfile(profile_type)).await
    }
}
