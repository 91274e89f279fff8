//! HTTP authentication helpers for wiring the coordinator API token into the
//! underlying `jsonrpsee` client builder.

use anyhow::{Context, Result};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

pub(crate) fn build_auth_headers(token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}
