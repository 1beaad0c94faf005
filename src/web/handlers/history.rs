//! Latency history lookups

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::WebError;
use crate::history::HistoryRange;
use crate::web::{AppState, handle_error};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// False until the first snapshot has been written
    pub success: bool,
    pub count: usize,
    pub range: String,
    pub data: Vec<Value>,
}

pub async fn get_history(
    Query(params): Query<HistoryParams>,
    State(state): State<AppState>,
) -> Response {
    let range = match params.range.as_deref() {
        None => HistoryRange::default(),
        Some(raw) => match raw.parse::<HistoryRange>() {
            Ok(range) => range,
            Err(_) => {
                return handle_error(
                    WebError::InvalidRequest {
                        field: "range".to_string(),
                        message: format!("expected one of 1h, 24h, 7d, 30d; got '{raw}'"),
                    }
                    .into(),
                );
            }
        },
    };

    match state.history.query(range, Utc::now()).await {
        Ok(result) => Json(HistoryResponse {
            success: result.available,
            count: result.entries.len(),
            range: range.to_string(),
            data: result.entries,
        })
        .into_response(),
        Err(e) => handle_error(e),
    }
}
