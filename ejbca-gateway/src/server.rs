// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! The gateway's HTTP server.

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{instrument, Instrument};

use crate::{
    client::{self, SoapClient},
    config::Ejbca,
    error::ClientError,
    handlers,
    ocsp::OcspProxy,
    rest,
};

/// Configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The socket address to listen on for incoming HTTP requests.
    ///
    /// The default is to listen on all interfaces on port 4444.
    pub listening_address: SocketAddr,
    /// The URL of the CA's OCSP status, served by `/api/ocsp`.
    pub ocsp_url: String,
    /// How to reach and authenticate with the CA's SOAP web service.
    pub soap: client::Config,
    /// Names and defaults substituted into requests to the CA.
    #[serde(default)]
    pub ejbca: Ejbca,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listening_address: SocketAddr::from_str("[::]:4444")
                .expect("the default should be valid"),
            ocsp_url: "http://localhost:8080/ejbca/publicweb/status/ocsp".to_string(),
            soap: client::Config::default(),
            ejbca: Ejbca::default(),
        }
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            toml::ser::to_string_pretty(&self).unwrap_or_default()
        )
    }
}

/// Everything a request handler needs; shared by all requests.
#[derive(Debug)]
pub struct Gateway {
    pub soap: SoapClient,
    pub ocsp: OcspProxy,
    pub ejbca: Ejbca,
}

impl Gateway {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            soap: SoapClient::new(&config.soap)?,
            ocsp: OcspProxy::new(config.ocsp_url.clone(), config.soap.request_timeout)?,
            ejbca: config.ejbca.clone(),
        })
    }
}

/// Build the complete set of routes the gateway serves.
pub fn router(gateway: Arc<Gateway>) -> Router {
    handlers::router()
        .merge(rest::router())
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

pub struct Listener {
    /// The socket address the gateway is listening on. This is primarily useful for tests
    /// when binding to port 0.
    addr: SocketAddr,
    /// The task serving requests. Once the [`CancellationToken`] has been cancelled, this task
    /// completes after all in-flight requests complete.
    task: tokio::task::JoinHandle<Result<(), anyhow::Error>>,
    halt_token: CancellationToken,
}

impl Listener {
    /// Get the address the gateway is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the port number the gateway is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get a cancellation token which can be used to start the graceful shutdown of this
    /// listener.
    pub fn halt_token(&self) -> CancellationToken {
        self.halt_token.clone()
    }

    pub async fn wait_to_finish(self) -> anyhow::Result<()> {
        self.task.await?
    }

    /// Stop accepting new connections and wait for in-flight requests to complete.
    pub async fn halt(self) -> anyhow::Result<()> {
        self.halt_token.cancel();
        self.task.await??;

        Ok(())
    }
}

/// Serve the gateway on the configured address.
///
/// This function returns once the TCP listener has been established. The client credentials
/// are loaded before binding, so invalid credentials are reported here.
#[instrument(skip_all, err)]
pub async fn listen(config: Config) -> anyhow::Result<Listener> {
    let gateway = Arc::new(Gateway::new(&config)?);
    let listener = TcpListener::bind(config.listening_address).await?;
    let addr = listener.local_addr()?;
    let halt_token = CancellationToken::new();

    let shutdown = halt_token.clone();
    let app = router(gateway);
    let task = tokio::spawn(
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await?;
            tracing::info!("Gateway has shut down");
            Ok::<_, anyhow::Error>(())
        }
        .instrument(tracing::Span::current()),
    );
    tracing::info!(%addr, endpoint = config.soap.endpoint, "Gateway listening");

    Ok(Listener {
        addr,
        task,
        halt_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() -> anyhow::Result<()> {
        let config = Config::default();
        let rendered = config.to_string();
        assert!(rendered.contains("listening_address = \"[::]:4444\""));
        assert!(rendered.contains("[ejbca]"));

        let parsed: Config = toml::from_str(&rendered)?;
        assert_eq!(parsed.listening_address, config.listening_address);
        assert_eq!(parsed.soap.endpoint, config.soap.endpoint);
        assert_eq!(parsed.soap.request_timeout, config.soap.request_timeout);
        assert_eq!(parsed.ejbca.crl_ca_name, "SUBCA_FIX2");

        Ok(())
    }

    // The [ejbca] table is optional; partial configuration files are common.
    #[test]
    fn ejbca_table_is_optional() -> anyhow::Result<()> {
        let config: Config = toml::from_str(
            r#"
            listening_address = "127.0.0.1:8000"
            ocsp_url = "http://ca.example.com/ocsp"

            [soap]
            endpoint = "https://ca.example.com:8443/ejbca/ejbcaws/ejbcaws"
            verify_upstream = true
            request_timeout = { secs = 10, nanos = 0 }

            [soap.credentials]
            certificate = "client.pem"
            private_key = "client.pem"
            ca_certificate = "ca.pem"
            "#,
        )?;
        assert_eq!(config.ejbca.ca_name, "RSA_subCA");
        assert!(config.soap.verify_upstream);
        assert_eq!(config.soap.request_timeout.as_secs(), 10);

        Ok(())
    }
}
