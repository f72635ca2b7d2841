// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

//! SOAP envelopes for the EJBCA web service.
//!
//! The gateway only ever sends a handful of operations, each with a fixed set of arguments, so
//! rather than generating bindings from the WSDL the envelopes are written directly. Responses
//! are handled by [`Fault::parse`] and [`Wrapper::strip`].

use std::io::Write;

use quick_xml::{events::BytesText, Writer};

mod fault;
mod response;

pub use fault::Fault;
pub use response::{Wrapper, LATEST_CRL_RESPONSE, PKCS12_RESPONSE};

/// The SOAP 1.1 envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// The namespace of the EJBCA web service operations.
pub const EJBCA_WS_NS: &str = "http://ws.protocol.core.ejbca.org/";

/// Arguments for the `pkcs12Req` operation, which issues a certificate and returns the
/// key store containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkcs12Request {
    pub username: String,
    pub password: String,
    pub end_entity_profile: String,
    pub certificate_profile: String,
    pub key_algorithm: String,
}

/// The end entity sent with `editUser`.
///
/// Fields are serialized in the order EJBCA's schema declares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub ca_name: String,
    pub certificate_profile_name: String,
    pub email: String,
    pub end_entity_profile_name: String,
    pub key_recoverable: bool,
    pub password: String,
    /// The end entity status; 10 is "new", which allows a certificate to be issued.
    pub status: i32,
    pub subject_dn: String,
    pub token_type: String,
    pub username: String,
}

/// The kinds of profile `getProfile` can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    EndEntity,
    Certificate,
}

impl ProfileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::EndEntity => "eep",
            ProfileType::Certificate => "cp",
        }
    }
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation on the EJBCA web service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Pkcs12Req(Pkcs12Request),
    EditUser(UserData),
    GetLatestCrl { ca_name: String, delta: bool },
    GetAvailableCas,
    GetProfile(ProfileType),
}

impl Operation {
    /// The operation's element name in the `ws` namespace.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Pkcs12Req(_) => "pkcs12Req",
            Operation::EditUser(_) => "editUser",
            Operation::GetLatestCrl { .. } => "getLatestCRL",
            Operation::GetAvailableCas => "getAvailableCAs",
            Operation::GetProfile(_) => "getProfile",
        }
    }

    /// Serialize the operation into a complete SOAP envelope.
    ///
    /// All argument values are escaped, so callers can pass user input straight through.
    pub fn envelope(&self) -> std::io::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .create_element("soapenv:Envelope")
            .with_attribute(("xmlns:soapenv", SOAP_ENVELOPE_NS))
            .with_attribute(("xmlns:ws", EJBCA_WS_NS))
            .write_inner_content(|writer| -> std::io::Result<()> {
                writer.create_element("soapenv:Header").write_empty()?;
                writer
                    .create_element("soapenv:Body")
                    .write_inner_content(|writer| -> std::io::Result<()> {
                        self.write_operation(writer)
                    })?;
                Ok(())
            })?;

        String::from_utf8(writer.into_inner())
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    }

    fn write_operation<W: Write>(&self, writer: &mut Writer<W>) -> std::io::Result<()> {
        let element = format!("ws:{}", self.name());
        match self {
            Operation::GetAvailableCas => {
                writer.create_element(element).write_empty()?;
            }
            Operation::Pkcs12Req(request) => {
                writer.create_element(element).write_inner_content(
                    |writer| -> std::io::Result<()> {
                        text_element(writer, "arg0", &request.username)?;
                        text_element(writer, "arg1", &request.password)?;
                        text_element(writer, "arg2", &request.end_entity_profile)?;
                        text_element(writer, "arg3", &request.certificate_profile)?;
                        text_element(writer, "arg4", &request.key_algorithm)
                    },
                )?;
            }
            Operation::EditUser(user) => {
                writer.create_element(element).write_inner_content(
                    |writer| -> std::io::Result<()> {
                        writer.create_element("arg0").write_inner_content(
                            |writer| -> std::io::Result<()> { write_user(writer, user) },
                        )?;
                        Ok(())
                    },
                )?;
            }
            Operation::GetLatestCrl { ca_name, delta } => {
                writer.create_element(element).write_inner_content(
                    |writer| -> std::io::Result<()> {
                        text_element(writer, "arg0", ca_name)?;
                        text_element(writer, "arg1", if *delta { "true" } else { "false" })
                    },
                )?;
            }
            Operation::GetProfile(profile_type) => {
                writer.create_element(element).write_inner_content(
                    |writer| -> std::io::Result<()> {
                        text_element(writer, "arg0", profile_type.as_str())?;
                        text_element(writer, "arg1", "")
                    },
                )?;
            }
        }

        Ok(())
    }
}

fn write_user<W: Write>(writer: &mut Writer<W>, user: &UserData) -> std::io::Result<()> {
    text_element(writer, "caName", &user.ca_name)?;
    text_element(
        writer,
        "certificateProfileName",
        &user.certificate_profile_name,
    )?;
    text_element(writer, "email", &user.email)?;
    text_element(writer, "endEntityProfileName", &user.end_entity_profile_name)?;
    text_element(
        writer,
        "keyRecoverable",
        if user.key_recoverable {
            "true"
        } else {
            "false"
        },
    )?;
    text_element(writer, "password", &user.password)?;
    text_element(writer, "status", &user.status.to_string())?;
    text_element(writer, "subjectDN", &user.subject_dn)?;
    text_element(writer, "tokenType", &user.token_type)?;
    text_element(writer, "username", &user.username)
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> std::io::Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkcs12_request() -> Pkcs12Request {
        Pkcs12Request {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            end_entity_profile: "RSA_TTE-Doc".to_string(),
            certificate_profile: "RSA_enduser".to_string(),
            key_algorithm: "RSA".to_string(),
        }
    }

    #[test]
    fn envelope_declares_namespaces() -> anyhow::Result<()> {
        let envelope = Operation::GetAvailableCas.envelope()?;
        assert!(envelope.starts_with(&format!(
            r#"<soapenv:Envelope xmlns:soapenv="{SOAP_ENVELOPE_NS}" xmlns:ws="{EJBCA_WS_NS}">"#
        )));
        assert!(envelope.contains("<soapenv:Header/>"));
        assert!(envelope.contains("<ws:getAvailableCAs/>"));
        assert!(envelope.trim_end().ends_with("</soapenv:Envelope>"));

        Ok(())
    }

    #[test]
    fn pkcs12_arguments_in_order() -> anyhow::Result<()> {
        let envelope = Operation::Pkcs12Req(pkcs12_request()).envelope()?;
        let positions = [
            "<arg0>alice</arg0>",
            "<arg1>hunter2</arg1>",
            "<arg2>RSA_TTE-Doc</arg2>",
            "<arg3>RSA_enduser</arg3>",
            "<arg4>RSA</arg4>",
        ]
        .iter()
        .map(|needle| envelope.find(needle).expect("argument is present"))
        .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(envelope.contains("<ws:pkcs12Req>"));

        Ok(())
    }

    // User input must never be able to inject elements into the envelope.
    #[test]
    fn values_are_escaped() -> anyhow::Result<()> {
        let mut request = pkcs12_request();
        request.username = "<arg1>evil</arg1>&".to_string();
        let envelope = Operation::Pkcs12Req(request).envelope()?;
        assert!(envelope.contains("<arg0>&lt;arg1&gt;evil&lt;/arg1&gt;&amp;</arg0>"));

        Ok(())
    }

    #[test]
    fn edit_user_nests_user_data() -> anyhow::Result<()> {
        let user = UserData {
            ca_name: "RSA_subCA".to_string(),
            certificate_profile_name: "RSA_enduser".to_string(),
            email: "alice@example.com".to_string(),
            end_entity_profile_name: "RSA_TTE-Doc".to_string(),
            key_recoverable: false,
            password: "hunter2".to_string(),
            status: 10,
            subject_dn: "CN=alice,O=Example".to_string(),
            token_type: "P12".to_string(),
            username: "alice".to_string(),
        };
        let envelope = Operation::EditUser(user).envelope()?;
        let compact = envelope
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("");
        assert!(compact.contains(
            "<ws:editUser><arg0><caName>RSA_subCA</caName>\
             <certificateProfileName>RSA_enduser</certificateProfileName>\
             <email>alice@example.com</email>\
             <endEntityProfileName>RSA_TTE-Doc</endEntityProfileName>\
             <keyRecoverable>false</keyRecoverable>\
             <password>hunter2</password>\
             <status>10</status>\
             <subjectDN>CN=alice,O=Example</subjectDN>\
             <tokenType>P12</tokenType>\
             <username>alice</username></arg0></ws:editUser>"
        ));

        Ok(())
    }

    #[test]
    fn latest_crl_arguments() -> anyhow::Result<()> {
        let envelope = Operation::GetLatestCrl {
            ca_name: "SUBCA_FIX2".to_string(),
            delta: true,
        }
        .envelope()?;
        assert!(envelope.contains("<ws:getLatestCRL>"));
        assert!(envelope.contains("<arg0>SUBCA_FIX2</arg0>"));
        assert!(envelope.contains("<arg1>true</arg1>"));

        Ok(())
    }

    #[test]
    fn profile_type_argument() -> anyhow::Result<()> {
        let envelope = Operation::GetProfile(ProfileType::Certificate).envelope()?;
        assert!(envelope.contains("<ws:getProfile>"));
        assert!(envelope.contains("<arg0>cp</arg0>"));
        assert!(envelope.contains("<arg1></arg1>"));

        Ok(())
    }
}
