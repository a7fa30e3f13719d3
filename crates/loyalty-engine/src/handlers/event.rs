//! 事件接收 API

use axum::{Json, extract::State, http::HeaderMap};
use serde_json::Value;
use validator::Validate;

use crate::{
    dto::{ApiResponse, SubmitEventRequest},
    error::EngineError,
    handlers::brand::brand_from_headers,
    models::TransactionSource,
    service::{EventReceipt, EventSubmission},
    state::AppState,
};

/// 提交事件
///
/// POST /events
///
/// 请求体未带 brand 时取 X-Brand 请求头；重复的 eventId 返回已有交易
pub async fn submit_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitEventRequest>,
) -> Result<Json<ApiResponse<EventReceipt>>, EngineError> {
    req.validate()?;

    let submission = to_submission(req, brand_from_headers(&headers));
    let receipt = state.gate.submit_event(submission).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

fn to_submission(req: SubmitEventRequest, header_brand: Option<String>) -> EventSubmission {
    let brand = req
        .brand
        .filter(|b| !b.trim().is_empty())
        .or(header_brand)
        .unwrap_or_default();

    EventSubmission {
        brand: brand.trim().to_string(),
        profile_id: req.profile_id.trim().to_string(),
        event_type: req.event_type.trim().to_string(),
        event_id: req.event_id.trim().to_string(),
        source: req.source.unwrap_or(TransactionSource::Api),
        payload: req.payload.unwrap_or_else(|| Value::Object(Default::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> SubmitEventRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_body_brand_wins_over_header() {
        let req = request(json!({"brand": "acme", "profileId": "p1", "eventType": "PURCHASE", "eventId": "e1"}));
        let submission = to_submission(req, Some("other".into()));
        assert_eq!(submission.brand, "acme");
        assert_eq!(submission.source, TransactionSource::Api);
        assert_eq!(submission.payload, json!({}));
    }

    #[test]
    fn test_header_brand_used_when_body_missing() {
        let req = request(json!({"profileId": "p1", "eventType": "PURCHASE", "eventId": "e1", "payload": {"amount": 5}}));
        let submission = to_submission(req, Some("acme".into()));
        assert_eq!(submission.brand, "acme");
        assert_eq!(submission.payload["amount"], 5);
    }

    #[test]
    fn test_missing_brand_left_blank() {
        let req = request(json!({"profileId": "p1", "eventType": "PURCHASE", "eventId": "e1"}));
        let submission = to_submission(req, None);
        assert!(submission.brand.is_empty());
    }
}
