use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::services::CurrentUser;

/// Authentication middleware that checks:
/// 1. `X-Api-Key` header
/// 2. `Authorization: Bearer <api_key>` header
///
/// On success the resolved [`CurrentUser`] is inserted into the request
/// extensions for handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(key) = extract_api_key(&headers)
        && let Ok(Some(user)) = state.store().users().verify_api_key(&key).await
    {
        tracing::Span::current().record("user_id", user.id);
        request.extensions_mut().insert(CurrentUser {
            id: user.id,
            is_admin: user.is_admin,
        });
        return Ok(next.run(request).await);
    }

    Err(ApiError::Unauthorized("Unauthorized".to_string()))
}

/// Extract API key from headers
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    // Check X-Api-Key header
    if let Some(api_key) = headers.get("X-Api-Key")
        && let Ok(key_str) = api_key.to_str()
    {
        return Some(key_str.to_string());
    }

    // Check Authorization: Bearer header
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", HeaderValue::from_static("key-123"));
        assert_eq!(extract_api_key(&headers), Some("key-123".to_string()));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer key-456 "));
        assert_eq!(extract_api_key(&headers), Some("key-456".to_string()));
    }

    #[test]
    fn test_extract_prefers_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", HeaderValue::from_static("from-header"));
        headers.insert("Authorization", HeaderValue::from_static("Bearer other"));
        assert_eq!(extract_api_key(&headers), Some("from-header".to_string()));
    }

    #[test]
    fn test_extract_none_without_credentials() {
        let headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_api_key(&headers), None);
    }
}
