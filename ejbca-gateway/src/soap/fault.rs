// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

use quick_xml::{events::Event, Reader};

/// A SOAP fault returned by the CA.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "SOAP Fault: {message}, ErrorCode: {}",
    .internal_error_code.as_deref().unwrap_or_default()
)]
pub struct Fault {
    /// The `faultcode`, for example `soap:Server`.
    pub code: String,
    /// The human-readable `faultstring`.
    pub message: String,
    /// EJBCA's own error code (`detail/EjbcaException/errorCode/internalErrorCode`), if the
    /// fault carried one.
    pub internal_error_code: Option<String>,
}

impl Fault {
    /// Look for a SOAP fault in a response body.
    ///
    /// Returns `None` if the body is not XML, has no `Fault` element, or the fault has an
    /// empty `faultcode`. Namespace prefixes are ignored.
    pub fn parse(body: &str) -> Option<Fault> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut code = String::new();
        let mut message = String::new();
        let mut internal_error_code = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => {
                    path.push(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Text(text)) => {
                    if !path.iter().any(|name| name == "Fault") {
                        continue;
                    }
                    let text = text.unescape().ok()?;
                    match path.last().map(String::as_str) {
                        Some("faultcode") => code.push_str(&text),
                        Some("faultstring") => message.push_str(&text),
                        Some("internalErrorCode")
                            if path.iter().any(|name| name == "errorCode") =>
                        {
                            internal_error_code
                                .get_or_insert_with(String::new)
                                .push_str(&text);
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(error) => {
                    tracing::trace!(?error, "Response is not well-formed XML; not a fault");
                    return None;
                }
            }
        }

        if code.is_empty() {
            None
        } else {
            Some(Fault {
                code,
                message,
                internal_error_code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAULT: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>Got request for status NEW, but user has status GENERATED</faultstring><detail><ns2:EjbcaException xmlns:ns2="http://ws.protocol.core.ejbca.org/"><errorCode><internalErrorCode>USER_WRONG_STATUS</internalErrorCode></errorCode><message>Got request for status NEW</message></ns2:EjbcaException></detail></soap:Fault></soap:Body></soap:Envelope>"#;

    #[test]
    fn parse_ejbca_fault() {
        let fault = Fault::parse(FAULT).expect("the body is a fault");
        assert_eq!(fault.code, "soap:Server");
        assert_eq!(
            fault.message,
            "Got request for status NEW, but user has status GENERATED"
        );
        assert_eq!(
            fault.internal_error_code.as_deref(),
            Some("USER_WRONG_STATUS")
        );
        assert_eq!(
            fault.to_string(),
            "SOAP Fault: Got request for status NEW, but user has status GENERATED, ErrorCode: USER_WRONG_STATUS"
        );
    }

    #[test]
    fn fault_without_detail() {
        let body = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body><S:Fault><faultcode>S:Client</faultcode><faultstring>Cannot find dispatch method</faultstring></S:Fault></S:Body></S:Envelope>"#;
        let fault = Fault::parse(body).expect("the body is a fault");
        assert_eq!(fault.code, "S:Client");
        assert_eq!(fault.internal_error_code, None);
        assert_eq!(
            fault.to_string(),
            "SOAP Fault: Cannot find dispatch method, ErrorCode: "
        );
    }

    #[test]
    fn escaped_fault_string() {
        let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>User &lt;alice&gt; &amp; friends</faultstring></soap:Fault></soap:Body></soap:Envelope>"#;
        let fault = Fault::parse(body).expect("the body is a fault");
        assert_eq!(fault.message, "User <alice> & friends");
    }

    #[test]
    fn successful_response_is_not_a_fault() {
        let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><ns2:getLatestCRLResponse xmlns:ns2="http://ws.protocol.core.ejbca.org/"><return>MIIB</return></ns2:getLatestCRLResponse></soap:Body></soap:Envelope>"#;
        assert_eq!(Fault::parse(body), None);
    }

    // Only elements inside the Fault count.
    #[test]
    fn faultcode_outside_fault_is_ignored() {
        let body = "<Envelope><faultcode>soap:Server</faultcode></Envelope>";
        assert_eq!(Fault::parse(body), None);
    }

    #[test]
    fn not_xml() {
        assert_eq!(Fault::parse("<html><body>502 Bad Gateway</p></html>"), None);
        assert_eq!(Fault::parse("OK"), None);
    }
}
