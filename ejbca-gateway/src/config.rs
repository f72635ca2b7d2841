// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

use std::path::{Path, PathBuf};

use openssl::{pkey::PKey, x509::X509};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Credentials used to authenticate with the CA.
///
/// It is highly recommended that you use systemd credentials to ensure the private key is
/// only accessible to the service using it. If the paths provided are relative, it is assumed
/// to be relative to the `$CREDENTIALS_DIRECTORY` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// The path to the PEM-encoded client certificate, optionally followed by its chain.
    ///
    /// The certificate must be authorized as an administrator in EJBCA.
    pub certificate: PathBuf,
    /// The path to the PEM-encoded private key that matches the `certificate`.
    ///
    /// This may be the same file as `certificate`.
    pub private_key: PathBuf,
    /// The path to the certificate authority to use when verifying the CA's TLS certificate.
    ///
    /// This is only used when upstream verification is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<PathBuf>,
}

impl Credentials {
    /// Load the certificate and key into an identity for the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is unreadable, if the files aren't valid PEM, or if the
    /// private key doesn't belong to the certificate.
    pub(crate) fn identity(&self) -> Result<reqwest::Identity, ClientError> {
        let chain = X509::stack_from_pem(&std::fs::read(&self.certificate)?)?;
        let leaf = chain
            .first()
            .ok_or_else(|| ClientError::MissingCertificate(self.certificate.clone()))?;
        let private_key = PKey::private_key_from_pem(&std::fs::read(&self.private_key)?)?;
        if !leaf.public_key()?.public_eq(&private_key) {
            return Err(ClientError::KeyMismatch(self.certificate.clone()));
        }

        let mut chain_pem = Vec::new();
        for certificate in &chain {
            chain_pem.extend(certificate.to_pem()?);
        }
        let key_pem = private_key.private_key_to_pem_pkcs8()?;
        tracing::debug!(
            certificate = %self.certificate.display(),
            chain_length = chain.len(),
            "Loaded client credentials"
        );

        Ok(reqwest::Identity::from_pkcs8_pem(&chain_pem, &key_pem)?)
    }

    /// Load the CA certificate used to verify the upstream, if one is configured.
    pub(crate) fn ca_certificate(&self) -> Result<Option<reqwest::Certificate>, ClientError> {
        self.ca_certificate
            .as_ref()
            .map(|path| -> Result<_, ClientError> {
                Ok(reqwest::Certificate::from_pem(&std::fs::read(path)?)?)
            })
            .transpose()
    }

    /// Fix up any relative paths in the configuration file to use the provided credentials directory.
    ///
    /// # Errors
    ///
    /// If the referenced files don't exist, an error is returned.
    pub fn with_credentials_dir(&mut self, credentials_dir: &Path) -> anyhow::Result<()> {
        if self.private_key.is_absolute() {
            tracing::warn!(
                private_key = self.private_key.display().to_string(),
                "Path to private key file is absolute; consider using systemd credentials"
            );
        } else {
            self.private_key = credentials_dir.join(&self.private_key);
            if !self.private_key.exists() {
                return Err(anyhow::anyhow!(
                    "No private key file named '{}' found in credentials directory",
                    self.private_key.display()
                ));
            }
        }
        if !self.certificate.is_absolute() {
            self.certificate = credentials_dir.join(&self.certificate);
            if !self.certificate.exists() {
                return Err(anyhow::anyhow!(
                    "No certificate file named '{}' found in credentials directory",
                    self.certificate.display()
                ));
            }
        }
        if let Some(ca_certificate) = self.ca_certificate.as_mut() {
            if !ca_certificate.is_absolute() {
                *ca_certificate = credentials_dir.join(&*ca_certificate);
                if !ca_certificate.exists() {
                    return Err(anyhow::anyhow!(
                        "No CA certificate file named '{}' found in credentials directory",
                        ca_certificate.display()
                    ));
                }
            }
        }

        Ok(())
    }
}

/// The EJBCA names and defaults substituted into requests.
///
/// These must match the CA, certificate profile, and end entity profile names configured in
/// EJBCA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ejbca {
    /// The CA that issues certificates for edited end entities.
    pub ca_name: String,
    /// The CA whose CRL is returned by the CRL endpoints.
    pub crl_ca_name: String,
    /// The certificate profile for issued certificates.
    pub certificate_profile: String,
    /// The end entity profile for edited end entities.
    pub end_entity_profile: String,
    /// The key algorithm requested when generating a key store.
    pub key_algorithm: String,
    /// The token type for edited end entities when the request doesn't specify one.
    pub token_type: String,
    /// The end entity status when the request doesn't specify one; 10 is "new".
    pub default_status: i32,
}

impl Default for Ejbca {
    fn default() -> Self {
        Self {
            ca_name: "RSA_subCA".to_string(),
            crl_ca_name: "SUBCA_FIX2".to_string(),
            certificate_profile: "RSA_enduser".to_string(),
            end_entity_profile: "RSA_TTE-Doc".to_string(),
            key_algorithm: "RSA".to_string(),
            token_type: "P12".to_string(),
            default_status: 10,
        }
    }
}

#[cfg(feature = "cli")]
fn private_load_config<T>(path: &Path) -> anyhow::Result<T>
where
    T: Default + std::fmt::Display + serde::de::DeserializeOwned,
{
    use anyhow::Context;

    let config = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read from path {path:?}"))?;
    tracing::info!(path=%path.display(), "Read from configuration file");
    toml::from_str(&config)
        .inspect_err(|error| {
            eprintln!("Failed to parse configuration loaded from {path:?}:\n{error}");
            eprintln!("Example config file:\n\n{}", T::default());
        })
        .context("configuration file is invalid")
}

/// Load the configuration with fallback options.
///
/// If `path` is [`None`], the `default` path, which should be relative to CONFIGURATION_DIRECTORY, is
/// checked.  If the default config doesn't exist, the [`Default`] implementation is returned. It's
/// expected that CONFIGURATION_DIRECTORY is set via systemd.
///
/// # Errors
///
/// In the event that one of the config files exists, but is invalid, an error is returned.
#[cfg(feature = "cli")]
pub fn load_config<T>(path: Option<PathBuf>, default: &Path) -> anyhow::Result<T>
where
    T: Default + std::fmt::Display + serde::de::DeserializeOwned,
{
    path.or_else(|| {
        std::env::var("CONFIGURATION_DIRECTORY")
            .inspect_err(|error| {
                tracing::warn!(
                    ?error,
                    "CONFIGURATION_DIRECTORY environment variable isn't readable"
                );
            })
            .map(PathBuf::from)
            .ok()
            .map(|base_path| base_path.join(default))
            .filter(|path| path.is_file())
    })
    .map_or_else(
        || {
            tracing::warn!("No configuration file found; using defaults");
            Ok(T::default())
        },
        |path| {
            tracing::info!(?path, "Attempting to load configuration");
            private_load_config::<T>(&path)
        },
    )
}
