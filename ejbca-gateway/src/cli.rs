// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! The command line interface for the `ejbca-gateway` binary.

use std::path::PathBuf;

use clap::Parser;

/// A REST/JSON gateway for the EJBCA SOAP web service.
///
/// The gateway accepts plain HTTP form and JSON requests, converts them to SOAP requests,
/// and sends them to EJBCA, authenticating with a client certificate.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// The path to the gateway's configuration file.
    ///
    /// If no path is provided, the defaults are used. To view the service configuration,
    /// run the `config` subcommand.
    #[arg(long, short, env = "EJBCA_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// A set of one or more comma-separated directives to filter logs.
    ///
    /// The general format is "target_name[span_name{field=value}]=level" where level is
    /// one of TRACE, DEBUG, INFO, WARN, ERROR.
    ///
    /// Details: https://docs.rs/tracing-subscriber/0.3.19/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[arg(
        long,
        env = "EJBCA_GATEWAY_LOG",
        default_value = "WARN,ejbca_gateway=INFO,tower_http=INFO"
    )]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run the service.
    Listen {
        /// The directory containing the service's secrets.
        ///
        /// Any file referenced in the configuration that are not absolute paths are
        /// expected to be in this directory.
        ///
        /// When run under systemd, providing a `ImportCredential=`,
        /// `LoadCredentialEncrypted=`, or `LoadCredential=` directive will
        /// set the environment variable automatically for you.
        #[arg(long, env = "CREDENTIALS_DIRECTORY")]
        credentials_directory: Option<PathBuf>,
    },

    /// See the current gateway configuration.
    Config {
        /// The directory containing the service's secrets.
        ///
        /// If provided, the credentials referenced in the configuration are checked.
        #[arg(long, env = "CREDENTIALS_DIRECTORY")]
        credentials_directory: Option<PathBuf>,
    },
}
