use anyhow::Context;
use axum::{http::header, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};

use crate::error::AuthResult;

/// GET /metrics: Prometheus text exposition of the auth counters.
/// Meant to be reachable from the internal network only.
pub async fn metrics_handler() -> AuthResult<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .context("encoding metrics")?;
    let body = String::from_utf8(buffer).context("metrics are not utf-8")?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body))
}
