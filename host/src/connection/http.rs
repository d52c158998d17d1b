//! Remote-stream transport: streamable HTTP with static headers.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use crate::error::ConnectionError;

pub(super) async fn connect(
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<RunningService<RoleClient, ()>, ConnectionError> {
    tracing::debug!("Connecting to MCP endpoint: {}", url);

    let endpoint_error = |message: String| ConnectionError::Endpoint {
        url: url.to_string(),
        message,
    };

    let client = reqwest::Client::builder()
        .default_headers(header_map(headers).map_err(endpoint_error)?)
        .build()
        .map_err(|e| endpoint_error(e.to_string()))?;

    let transport = StreamableHttpClientTransport::with_client(
        client,
        StreamableHttpClientTransportConfig::with_uri(url.to_string()),
    );

    ().serve(transport)
        .await
        .map_err(|e| endpoint_error(e.to_string()))
}

/// Header values are never logged; errors only name the header.
fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid header name '{name}'"))?;
        let mut value =
            HeaderValue::from_str(value).map_err(|_| format!("invalid value for header '{name}'"))?;
        value.set_sensitive(true);
        map.insert(key, value);
    }
    Ok(map)
}
