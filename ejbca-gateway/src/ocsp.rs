// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! Pass-through download of the CA's OCSP status.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::instrument;

use crate::{
    error::{ClientError, GatewayError},
    server::Gateway,
};

/// Fetches the OCSP status document from the CA's public web.
///
/// This uses a separate, unauthenticated client; the OCSP endpoint is public.
#[derive(Clone, Debug)]
pub struct OcspProxy {
    url: String,
    http: reqwest::Client,
}

impl OcspProxy {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http })
    }

    #[instrument(skip_all, err, fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<Bytes, reqwest::Error> {
        let response = self.http.get(&self.url).send().await?;
        tracing::debug!(status = %response.status(), "OCSP responder replied");
        response.bytes().await
    }
}

/// Serve the OCSP status as a file download.
pub(crate) async fn download(
    State(gateway): State<Arc<Gateway>>,
) -> Result<impl IntoResponse, GatewayError> {
    let status = gateway.ocsp.fetch().await.map_err(|error| {
        tracing::warn!(?error, "Failed to retrieve OCSP status");
        GatewayError::Upstream("Failed to retrieve OCSP status".to_string())
    })?;

    Ok((
        [
            (CONTENT_DISPOSITION, "attachment; filename=ocsp"),
            (CONTENT_TYPE, "application/octet-stream"),
        ],
        status,
    ))
}
