//! Inbound call webhook: signature verification and the markup response
//! that points the carrier at our media-stream WebSocket.
//!
//! The signature scheme is HMAC-SHA256 over `{url}{sorted form params}`,
//! hex-encoded, checked against a configurable header name — the same
//! shape as the Slack request-signing check this is grounded on, widened
//! from one fixed vendor header to whatever the deployment's carrier uses.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Verify `signature_hex` against `secret`, `url`, and the call's form
/// params. Returns `false` (never panics) on a malformed secret.
pub fn verify_signature(
    url: &str,
    params: &BTreeMap<String, String>,
    signature_hex: &str,
    secret: &str,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    let mut basestring = url.to_string();
    for (key, value) in params {
        basestring.push_str(key);
        basestring.push_str(value);
    }

    mac.update(basestring.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == signature_hex
}

/// Build the markup response connecting the call to our media-stream
/// WebSocket, passing `call_sid` and `caller` through as stream parameters.
pub fn build_stream_response(base_url: &str, call_sid: &str, caller: &str) -> String {
    let ws_url = base_url.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1);
    let ws_url = ws_url.trim_end_matches('/');
    let stream_url = format!("{ws_url}/media-stream/{call_sid}");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{stream_url}">
      <Parameter name="caller" value="{caller}"/>
      <Parameter name="call_sid" value="{call_sid}"/>
    </Stream>
  </Connect>
</Response>"#,
        stream_url = xml_escape(&stream_url),
        caller = xml_escape(caller),
        call_sid = xml_escape(call_sid),
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_with_matching_secret() {
        let mut params = BTreeMap::new();
        params.insert("CallSid".to_string(), "CA123".to_string());
        params.insert("From".to_string(), "+15551234567".to_string());

        let mut mac = HmacSha256::new_from_slice(b"shared-secret").unwrap();
        let mut basestring = "https://example.com/incoming-call".to_string();
        for (k, v) in &params {
            basestring.push_str(k);
            basestring.push_str(v);
        }
        mac.update(basestring.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature("https://example.com/incoming-call", &params, &signature, "shared-secret"));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let params = BTreeMap::new();
        assert!(!verify_signature("https://example.com/incoming-call", &params, "deadbeef", "secret"));
    }

    #[test]
    fn stream_response_converts_scheme_and_escapes_caller() {
        let xml = build_stream_response("https://example.com", "CA1", "+1 555 & friends");
        assert!(xml.contains("wss://example.com/media-stream/CA1"));
        assert!(xml.contains("&amp;"));
    }
}
