//! HTTP middleware (CORS, 404 handler)

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::response::IntoResponse;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::types::ApiError;
use crate::core::config::is_all_interfaces;

/// Browser origins allowed to call the API
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    origins: Vec<String>,
}

impl AllowedOrigins {
    /// Origins derived from the bind address
    pub fn new(host: &str, port: u16) -> Self {
        // Loopback and wildcard binds are reachable under both local names
        let hosts: Vec<&str> = if is_all_interfaces(host) || host == "127.0.0.1" || host == "localhost"
        {
            vec!["localhost", "127.0.0.1"]
        } else {
            vec![host]
        };

        let origins = hosts
            .iter()
            .flat_map(|h| [format!("http://{h}:{port}"), format!("http://{h}")])
            .collect();
        Self { origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    fn as_header_values(&self) -> Vec<HeaderValue> {
        self.origins.iter().filter_map(|o| o.parse().ok()).collect()
    }
}

/// Create CORS layer
pub fn cors(allowed: &AllowedOrigins, api_key_headers: &[HeaderName]) -> CorsLayer {
    let mut headers = vec![
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::ACCEPT,
        header::ORIGIN,
    ];
    headers.extend(api_key_headers.iter().cloned());

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed.as_header_values()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers)
}

/// Handle 404 Not Found with logging
pub async fn handle_404(req: Request) -> impl IntoResponse {
    tracing::debug!(method = %req.method(), uri = %req.uri(), "[404] No route");
    ApiError::not_found("NOT_FOUND", format!("No route for {}", req.uri().path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_origins() {
        let allowed = AllowedOrigins::new("127.0.0.1", 8087);
        assert!(allowed.is_allowed("http://localhost:8087"));
        assert!(allowed.is_allowed("http://127.0.0.1:8087"));
        assert!(allowed.is_allowed("http://localhost"));
        assert!(!allowed.is_allowed("http://evil.test"));
    }

    #[test]
    fn test_wildcard_bind_uses_local_names() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(is_all_interfaces("[::]"));
        assert!(!is_all_interfaces("10.0.0.5"));

        let allowed = AllowedOrigins::new("0.0.0.0", 9000);
        assert!(allowed.is_allowed("http://127.0.0.1:9000"));
        assert!(!allowed.is_allowed("http://0.0.0.0:9000"));
    }

    #[test]
    fn test_named_host() {
        let allowed = AllowedOrigins::new("auth.internal", 443);
        assert!(allowed.is_allowed("http://auth.internal:443"));
        assert!(!allowed.is_allowed("http://localhost:443"));
        assert_eq!(allowed.as_header_values().len(), 2);
    }
}
