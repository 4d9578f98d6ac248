//! Response classification and structured error extraction
//!
//! Turns a completed HTTP response into one of a fixed set of outcomes and
//! digs a human-readable message out of the conventional error shapes the
//! upstream APIs produce. Nothing in this module fails: unparsable bodies
//! degrade to redacted raw previews.

use crate::engine::ApiResponse;
use crate::error::Error;
use crate::redact::redact;
use serde_json::Value;

/// Upper bound on raw-body previews attached to errors
pub const MAX_BODY_PREVIEW: usize = 500;

/// Outcome of inspecting a single response's status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Status < 400
    Success,
    /// Status in the retryable set; eligible for another attempt
    Retryable { status: u16 },
    /// Status ≥ 400 outside the retryable set; never retried
    Fatal { status: u16 },
}

/// Classify a status code into success / retryable / fatal.
pub fn classify_status(status: u16) -> Classification {
    if Error::is_retryable_status(status) {
        Classification::Retryable { status }
    } else if status >= 400 {
        Classification::Fatal { status }
    } else {
        Classification::Success
    }
}

/// Redacted preview of the first [`MAX_BODY_PREVIEW`] characters of a body.
pub(crate) fn body_preview(body: &str) -> String {
    redact(&body.chars().take(MAX_BODY_PREVIEW).collect::<String>())
}

/// Extract a structured error message from a failure response body.
///
/// Conventional shapes are tried in priority order: a list of per-field
/// errors (joined with `; `, capped at five entries), then a single
/// `message` string (prefixed with the error `code` when one is present),
/// then an `error` string. Anything else falls back to a truncated raw
/// preview. The numeric status is attached by [`Error::Api`]'s display.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::Array(errors)) = map.get("errors") {
            let mut parts = Vec::new();
            for entry in errors.iter().take(5) {
                match entry {
                    Value::Object(error) => {
                        let message = error.get("message").and_then(Value::as_str).unwrap_or("");
                        if message.is_empty() {
                            continue;
                        }
                        match error.get("field").and_then(Value::as_str) {
                            Some(field) if !field.is_empty() => {
                                parts.push(format!("{field}: {message}"));
                            }
                            _ => parts.push(message.to_string()),
                        }
                    }
                    Value::String(message) => parts.push(message.clone()),
                    _ => {}
                }
            }
            if !parts.is_empty() {
                return redact(&parts.join("; "));
            }
        }

        if let Some(message) = map.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                return match map.get("code").and_then(Value::as_str) {
                    Some(code) if !code.is_empty() => redact(&format!("[{code}] {message}")),
                    _ => redact(message),
                };
            }
        }

        if let Some(error) = map.get("error").and_then(Value::as_str) {
            if !error.is_empty() {
                return redact(error);
            }
        }
    }

    if body.trim().is_empty() {
        return format!("HTTP {status}");
    }
    body_preview(body)
}

/// Parse a response body as JSON, diagnosing the usual failure modes.
///
/// An empty body and an HTML page both mean the caller is not talking to the
/// JSON API it thinks it is, so they classify as malformed payloads rather
/// than parse errors.
pub fn parse_json(response: &ApiResponse) -> Result<Value, Error> {
    let content_type = response
        .header("content-type")
        .unwrap_or("")
        .to_ascii_lowercase();

    let trimmed = response.body.trim();
    if trimmed.is_empty() {
        return Err(Error::Malformed {
            status: Some(response.status),
            message: "the API returned an empty response where JSON was expected".to_string(),
            body: String::new(),
        });
    }

    if content_type.contains("text/html") {
        return Err(Error::Malformed {
            status: Some(response.status),
            message: format!(
                "the API returned an HTML page instead of JSON; {}",
                html_hint(&response.body)
            ),
            body: body_preview(&response.body),
        });
    }

    serde_json::from_str(trimmed).map_err(|_| Error::Malformed {
        status: Some(response.status),
        message: format!(
            "the response body is not valid JSON: {}",
            body_preview(&response.body)
        ),
        body: body_preview(&response.body),
    })
}

/// Guess why a JSON endpoint served HTML by scanning for telltale markers.
fn html_hint(body: &str) -> &'static str {
    let lowered = body.to_lowercase();
    if lowered.contains("login") {
        "this usually means the credentials were rejected"
    } else if lowered.contains("404") || lowered.contains("not found") {
        "the REST endpoint was not found; check the base URL"
    } else if lowered.contains("403") || lowered.contains("forbidden") {
        "access was denied; check the account's permissions"
    } else {
        "the REST interface may be disabled on the target"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status: u16, content_type: &str, body: &str) -> ApiResponse {
        let mut headers = HashMap::new();
        if !content_type.is_empty() {
            headers.insert("content-type".to_string(), content_type.to_string());
        }
        ApiResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), Classification::Success);
        assert_eq!(classify_status(201), Classification::Success);
        assert_eq!(classify_status(301), Classification::Success);
        assert_eq!(classify_status(429), Classification::Retryable { status: 429 });
        assert_eq!(classify_status(425), Classification::Retryable { status: 425 });
        assert_eq!(classify_status(503), Classification::Retryable { status: 503 });
        assert_eq!(classify_status(400), Classification::Fatal { status: 400 });
        assert_eq!(classify_status(401), Classification::Fatal { status: 401 });
        assert_eq!(classify_status(501), Classification::Fatal { status: 501 });
    }

    #[test]
    fn test_extract_code_and_message() {
        let body = r#"{"code":"rest_forbidden","message":"bad creds","data":{"status":401}}"#;
        assert_eq!(extract_error_message(401, body), "[rest_forbidden] bad creds");
    }

    #[test]
    fn test_extract_message_without_code() {
        let body = r#"{"message":"Post not found"}"#;
        assert_eq!(extract_error_message(404, body), "Post not found");
    }

    #[test]
    fn test_extract_field_errors_joined() {
        let body = r#"{"errors":[
            {"message":"does not contain a valid address","field":"from.email"},
            {"message":"subject is required","field":"subject"}
        ]}"#;
        assert_eq!(
            extract_error_message(400, body),
            "from.email: does not contain a valid address; subject: subject is required"
        );
    }

    #[test]
    fn test_extract_field_errors_without_field() {
        let body = r#"{"errors":[{"message":"something broke"}]}"#;
        assert_eq!(extract_error_message(500, body), "something broke");
    }

    #[test]
    fn test_extract_string_errors() {
        let body = r#"{"errors":["first","second"]}"#;
        assert_eq!(extract_error_message(400, body), "first; second");
    }

    #[test]
    fn test_extract_caps_error_list_at_five() {
        let body = r#"{"errors":[
            {"message":"1"},{"message":"2"},{"message":"3"},
            {"message":"4"},{"message":"5"},{"message":"6"}
        ]}"#;
        assert_eq!(extract_error_message(400, body), "1; 2; 3; 4; 5");
    }

    #[test]
    fn test_extract_error_string_field() {
        let body = r#"{"error":"invalid key"}"#;
        assert_eq!(extract_error_message(403, body), "invalid key");
    }

    #[test]
    fn test_extract_falls_back_to_preview() {
        assert_eq!(extract_error_message(500, "Internal Server Error"), "Internal Server Error");
    }

    #[test]
    fn test_extract_empty_body() {
        assert_eq!(extract_error_message(502, ""), "HTTP 502");
        assert_eq!(extract_error_message(502, "   "), "HTTP 502");
    }

    #[test]
    fn test_extract_redacts_secrets() {
        let body = r#"{"message":"token Bearer AAAAAAAAAABBBBBBBBBBCCCCCCCCCC rejected"}"#;
        let message = extract_error_message(401, body);
        assert!(message.contains("Bearer ***"));
        assert!(!message.contains("AAAAAAAAAA"));
    }

    #[test]
    fn test_parse_json_success() {
        let response = response(200, "application/json", r#"{"id": 42}"#);
        let value = parse_json(&response).unwrap();
        assert_eq!(value["id"], 42);
    }

    #[test]
    fn test_parse_json_empty_body_is_malformed() {
        let response = response(200, "application/json", "");
        let err = parse_json(&response).unwrap_err();
        assert!(matches!(err, Error::Malformed { status: Some(200), .. }));
    }

    #[test]
    fn test_parse_json_html_login_hint() {
        let response = response(200, "text/html; charset=utf-8", "<html><body>Login to continue</body></html>");
        match parse_json(&response) {
            Err(Error::Malformed { message, .. }) => {
                assert!(message.contains("credentials were rejected"));
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_html_not_found_hint() {
        let response = response(200, "text/html", "<html>404 Not Found</html>");
        match parse_json(&response) {
            Err(Error::Malformed { message, .. }) => {
                assert!(message.contains("check the base URL"));
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_html_forbidden_hint() {
        let response = response(200, "text/html", "<html>403 Forbidden</html>");
        match parse_json(&response) {
            Err(Error::Malformed { message, .. }) => {
                assert!(message.contains("permissions"));
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_html_generic_hint() {
        let response = response(200, "text/html", "<html><h1>Welcome</h1></html>");
        match parse_json(&response) {
            Err(Error::Malformed { message, .. }) => {
                assert!(message.contains("disabled"));
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_invalid_body() {
        let response = response(200, "application/json", "definitely not json");
        let err = parse_json(&response).unwrap_err();
        match err {
            Error::Malformed { message, .. } => assert!(message.contains("not valid JSON")),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_body_preview_is_bounded_and_redacted() {
        let body = format!("{} {}", "Bearer AAAAAAAAAABBBBBBBBBBCCCCCCCCCC", "z".repeat(1000));
        let preview = body_preview(&body);
        assert!(preview.starts_with("Bearer ***"));
        assert!(preview.chars().count() <= 200 + "... (truncated)".len());
    }
}
