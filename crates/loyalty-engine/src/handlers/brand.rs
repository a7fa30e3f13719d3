//! 调用方品牌
//!
//! 品牌由 `X-Brand` 请求头传入，不做认证

use axum::{extract::FromRequestParts, http::HeaderMap, http::request::Parts};

use crate::error::EngineError;

pub const BRAND_HEADER: &str = "x-brand";

/// 从 `X-Brand` 请求头提取的品牌；缺失或为空时返回 400
#[derive(Debug, Clone, PartialEq)]
pub struct Brand(pub String);

impl<S> FromRequestParts<S> for Brand
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        brand_from_headers(&parts.headers)
            .map(Brand)
            .ok_or_else(|| EngineError::Validation("缺少 X-Brand 请求头".to_string()))
    }
}

/// 读取请求头中的品牌，空白视为缺失
pub fn brand_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(BRAND_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_brand_header_trimmed() {
        let mut headers = HeaderMap::new();
        assert_eq!(brand_from_headers(&headers), None);

        headers.insert("X-Brand", HeaderValue::from_static(" acme "));
        assert_eq!(brand_from_headers(&headers).as_deref(), Some("acme"));

        headers.insert("X-Brand", HeaderValue::from_static("  "));
        assert_eq!(brand_from_headers(&headers), None);
    }
}
