//! Response assembly: JSON bodies, token-usage headers, CORS merge, and the
//! HTTP mapping for `ProxyError`.

use aws_lambda_events::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::encodings::Body;
use http::{HeaderMap, HeaderValue};
use serde_json::json;

use crate::error::ProxyError;
use crate::openai::Usage;

const CORS_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "*"),
    ("Access-Control-Allow-Methods", "*"),
];

/// Add the permissive CORS set without clobbering anything already present.
pub fn merge_cors(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.entry(name).or_insert(HeaderValue::from_static(value));
    }
}

/// Plain response with the CORS set merged in.
pub fn response(status_code: i64, body: Option<String>) -> ApiGatewayProxyResponse {
    let mut response = ApiGatewayProxyResponse {
        status_code,
        body: body.map(Body::Text),
        ..Default::default()
    };
    merge_cors(&mut response.headers);
    response
}

fn error_body(message: &str) -> Option<String> {
    Some(json!({ "error": message }).to_string())
}

/// 200 response carrying the answer text and the token-usage headers.
pub fn success(answer: &str, usage: &Usage) -> ApiGatewayProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert("usageprompttokens", count_header(usage.prompt_tokens));
    headers.insert("usagecompletiontokens", count_header(usage.completion_tokens));
    headers.insert("usagetotaltokens", count_header(usage.total_tokens));
    merge_cors(&mut headers);
    ApiGatewayProxyResponse {
        status_code: 200,
        headers,
        body: Some(Body::Text(json!({ "answer": answer }).to_string())),
        ..Default::default()
    }
}

fn count_header(value: Option<i64>) -> HeaderValue {
    HeaderValue::from_str(&value.unwrap_or_default().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

impl ProxyError {
    /// Log the failure and produce its fixed HTTP mapping.
    pub fn into_response(self) -> ApiGatewayProxyResponse {
        match &self {
            ProxyError::InvalidInput(detail) => {
                tracing::error!(%detail, "error parsing input");
                response(
                    self.status_code(),
                    error_body("Invalid input. Please provide a valid prompt."),
                )
            }
            ProxyError::MethodNotAllowed(method) => {
                tracing::warn!(%method, "method not allowed");
                response(
                    self.status_code(),
                    Some(json!({ "message": "Method not allowed" }).to_string()),
                )
            }
            ProxyError::PathNotFound(path) => {
                tracing::warn!(%path, "no route matched");
                response(self.status_code(), None)
            }
            ProxyError::NoUpstreamRoute(path) => {
                tracing::warn!(%path, "no upstream endpoint matched");
                response(self.status_code(), error_body("no api url matched."))
            }
            ProxyError::Upstream(error) => {
                tracing::error!(%error, "error communicating with upstream");
                response(
                    self.status_code(),
                    error_body("Failed to communicate with ChatGPT."),
                )
            }
            ProxyError::MissingUsage => {
                tracing::error!("upstream response carried no usage details");
                response(
                    self.status_code(),
                    error_body("No usage details found in the response."),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_merge_does_not_clobber_existing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("text/plain"));
        merge_cors(&mut headers);
        assert_eq!(headers.get("Content-Type").unwrap(), "text/plain");
        assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    }

    #[test]
    fn success_carries_usage_headers_and_answer_body() {
        let usage = Usage {
            prompt_tokens: Some(10),
            completion_tokens: Some(20),
            total_tokens: Some(30),
        };
        let response = success("hello", &usage);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers.get("usageprompttokens").unwrap(), "10");
        assert_eq!(response.headers.get("usagecompletiontokens").unwrap(), "20");
        assert_eq!(response.headers.get("usagetotaltokens").unwrap(), "30");
        assert_eq!(
            response.headers.get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        match response.body {
            Some(Body::Text(body)) => assert_eq!(body, r#"{"answer":"hello"}"#),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn missing_token_counts_render_as_zero() {
        let response = success("hi", &Usage::default());
        assert_eq!(response.headers.get("usagetotaltokens").unwrap(), "0");
    }

    #[test]
    fn not_found_has_no_body() {
        let response = ProxyError::PathNotFound("/nope".into()).into_response();
        assert_eq!(response.status_code, 404);
        assert!(response.body.is_none());
        assert_eq!(
            response.headers.get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn upstream_failures_use_the_generic_error_body() {
        // A reqwest::Error is awkward to construct directly; go through the
        // taxonomy entries that wrap plain data instead.
        let response = ProxyError::MissingUsage.into_response();
        assert_eq!(response.status_code, 400);
        match response.body {
            Some(Body::Text(body)) => {
                assert_eq!(body, r#"{"error":"No usage details found in the response."}"#)
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
