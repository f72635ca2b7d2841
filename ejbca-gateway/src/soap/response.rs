// SPDX-License-Identifier: MIT
// Copyright (c) Microsoft Corporation.

use quick_xml::{events::Event, Reader};

/// The literal wrapper EJBCA places around a response payload.
///
/// EJBCA serializes its responses without any whitespace, so the markup before and after the
/// payload is byte-for-byte stable and can simply be removed.
#[derive(Debug, Clone, Copy)]
pub struct Wrapper {
    prefix: &'static str,
    suffix: &'static str,
    /// The element holding the payload, used if the literal prefix does not match.
    element: &'static str,
}

/// The wrapper around the base64-encoded key store returned by `pkcs12Req`.
pub const PKCS12_RESPONSE: Wrapper = Wrapper {
    prefix: r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><ns2:pkcs12ReqResponse xmlns:ns2="http://ws.protocol.core.ejbca.org/"><return><type>0</type><keystoreData>"#,
    suffix: "</keystoreData></return></ns2:pkcs12ReqResponse></soap:Body></soap:Envelope>",
    element: "keystoreData",
};

/// The wrapper around the base64-encoded CRL returned by `getLatestCRL`.
pub const LATEST_CRL_RESPONSE: Wrapper = Wrapper {
    prefix: r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><ns2:getLatestCRLResponse xmlns:ns2="http://ws.protocol.core.ejbca.org/"><return>"#,
    suffix: "</return></ns2:getLatestCRLResponse></soap:Body></soap:Envelope>",
    element: "return",
};

impl Wrapper {
    /// Remove the wrapper from a response body, leaving the payload.
    ///
    /// If the body doesn't contain the expected prefix, the text of the first payload element
    /// is returned instead. If there is no such element, the body is returned unchanged.
    pub fn strip(&self, body: &str) -> String {
        if body.contains(self.prefix) {
            return body.replace(self.prefix, "").replace(self.suffix, "");
        }

        match element_text(body, self.element) {
            Some(payload) => {
                tracing::debug!(
                    element = self.element,
                    "Response wrapper did not match; extracted payload element"
                );
                payload
            }
            None => {
                tracing::warn!(
                    element = self.element,
                    "Response wrapper did not match and no payload element was found; \
                    returning the response as-is"
                );
                body.to_string()
            }
        }
    }
}

/// Get the text content of the first element with the given local name.
fn element_text(body: &str, local_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut depth = 0_usize;
    let mut capture: Option<(usize, String)> = None;
    loop {
        match reader.read_event().ok()? {
            Event::Start(element) => {
                depth += 1;
                if capture.is_none() && element.local_name().as_ref() == local_name.as_bytes() {
                    capture = Some((depth, String::new()));
                }
            }
            Event::Empty(element) => {
                if capture.is_none() && element.local_name().as_ref() == local_name.as_bytes() {
                    return Some(String::new());
                }
            }
            Event::End(_) => {
                if let Some((start_depth, text)) = capture.take() {
                    if start_depth == depth {
                        return Some(text);
                    }
                    capture = Some((start_depth, text));
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) => {
                if let Some((_, captured)) = capture.as_mut() {
                    captured.push_str(&text.unescape().ok()?);
                }
            }
            Event::CData(data) => {
                if let Some((_, captured)) = capture.as_mut() {
                    captured.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}
