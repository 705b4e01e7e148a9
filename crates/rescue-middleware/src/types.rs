//! Common types used throughout the middleware chain.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use rescue_core::{ErrorValue, Failure};

/// The HTTP request type used in the middleware chain.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware chain.
pub type Response = http::Response<Full<Bytes>>;

/// What a handler or middleware stage produced.
///
/// `Err` means the request terminated abnormally and must be answered by the
/// recovery boundary.
pub type Outcome = Result<Response, Failure>;

/// Body written if serialising an error body ever fails.
const FALLBACK_BODY: &str = r#"{"code":500,"message":"fail"}"#;

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates a JSON response with the given status.
    fn json(status: StatusCode, body: impl Into<Bytes>) -> Response;

    /// Creates the `{"code","message"}` response for an [`ErrorValue`].
    fn from_error(error: &ErrorValue) -> Response;
}

impl ResponseExt for Response {
    fn json(status: StatusCode, body: impl Into<Bytes>) -> Response {
        let mut response = http::Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }

    fn from_error(error: &ErrorValue) -> Response {
        let body = error
            .to_body()
            .to_json()
            .unwrap_or_else(|_| FALLBACK_BODY.to_string());
        Self::json(error.status(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use rescue_core::MessageRegistry;

    #[tokio::test]
    async fn test_error_response() {
        let registry = MessageRegistry::default();
        let error = registry.gen_error(StatusCode::FORBIDDEN, 42, Some("denied"));

        let response = Response::from_error(&error);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"code":42,"message":"denied"}"#);
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::CREATED, r#"{"id":1}"#);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }
}
