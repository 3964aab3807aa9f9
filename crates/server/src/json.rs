// JSON body extractor that fails with the unified error body
//
// axum's own `Json` rejects with plain text 400/415/422. Handlers take this
// one instead so a bad body reads like every other INVALID_ARGUMENT.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonDataError(_) => "Request body does not match the expected shape",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "Expected Content-Type: application/json",
            JsonRejection::BytesRejection(_) => "Failed to read request body",
            _ => "Invalid request body",
        };
        ApiError::invalid_argument(message).with_details(json!({ "reason": rejection.body_text() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::ErrorCode;
    use axum::{body::Body, http::header, http::StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        name: String,
    }

    async fn extract(content_type: Option<&str>, body: &str) -> Result<Json<Payload>, ApiError> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        Json::<Payload>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn test_well_formed_body_extracts() {
        let Json(payload) = extract(Some("application/json"), r#"{"name":"a"}"#).await.unwrap();
        assert_eq!(payload.name, "a");
    }

    #[tokio::test]
    async fn test_every_rejection_is_invalid_argument() {
        let cases = [
            (Some("application/json"), "{not json"),
            (Some("application/json"), r#"{"name": 5}"#),
            (Some("text/plain"), r#"{"name":"a"}"#),
            (None, r#"{"name":"a"}"#),
        ];
        for (content_type, body) in cases {
            let err = extract(content_type, body).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidArgument, "{:?} {}", content_type, body);
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert!(err.details.as_ref().and_then(|d| d.get("reason")).is_some());
        }
    }

    #[tokio::test]
    async fn test_rejection_renders_unified_body() {
        let err = extract(Some("application/json"), "[").await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
        assert_eq!(body["error"]["message"], "Request body is not valid JSON");
    }
}
