// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

/*!
# ejbca-gateway

A small gateway that lets internal applications talk to an [EJBCA][1] certificate authority
without speaking SOAP. It exposes plain HTTP form endpoints and a set of REST/JSON aliases,
turns each request into the SOAP envelope the CA's web service expects, sends it over a
mutually authenticated TLS connection, and relays a lightly cleaned-up version of the reply.

## Components

The HTTP front door ([`server`]) routes a fixed set of paths. The form endpoints
([`handlers`]) drive the SOAP client ([`client`]), which builds envelopes and parses faults
with the helpers in [`soap`]. The REST endpoints ([`rest`]) re-encode JSON bodies as form
submissions and replay them in-process through the form endpoints. OCSP status is proxied as
a plain download ([`ocsp`]).

There is no state beyond a single request: no caching, no retries, and no storage. Errors
from the CA are reported to the caller; they never take down the process.

## Crate features

* **cli** -
  Include the `ejbca-gateway` command line interface. This is a default feature.

[1]: https://www.ejbca.org/
*/

#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ocsp;
pub mod rest;
pub mod server;
pub mod soap;
