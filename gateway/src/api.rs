use std::io::Write;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("schema validation failed: {0}")]
    InvalidEnvelope(String),
    #[error("missing required params: {0}")]
    MissingParams(&'static str),

    #[error("shard not found")]
    ShardNotFound,
    #[error("provider not found")]
    ProviderNotFound,

    #[error("index lookup failed")]
    IndexLookupError,
    #[error("processing failed")]
    ProcessingError,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::RequestDecodingError(_)
            | GatewayError::RequestParsingError(_)
            | GatewayError::InvalidEnvelope(_)
            | GatewayError::MissingParams(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            GatewayError::ShardNotFound | GatewayError::ProviderNotFound => {
                (StatusCode::NOT_FOUND, self.to_string())
            }

            GatewayError::IndexLookupError | GatewayError::ProcessingError => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}

/// Encode a JSON value into the gzip response body the wire contract
/// requires on every 200 from the catalog endpoints.
pub fn gzip_json<T: Serialize>(value: &T) -> Result<Response, GatewayError> {
    let payload = serde_json::to_vec(value)?;
    Ok(gzip_raw(&payload))
}

/// Gzip an already-serialized payload verbatim, for overlay and shard
/// bodies that must not be re-encoded.
pub fn gzip_raw(payload: &[u8]) -> Response {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail
    encoder.write_all(payload).expect("gzip write failed");
    let body = encoder.finish().expect("gzip finish failed");

    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        body,
    )
        .into_response()
}
