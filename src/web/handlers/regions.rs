//! Probe and exchange listings

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::models::{ProbeDetail, ServerRecord};
use crate::web::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionsResponse {
    pub probes: Vec<ProbeDetail>,
    pub exchanges: Vec<ServerRecord>,
}

pub async fn list_regions(State(state): State<AppState>) -> Json<RegionsResponse> {
    Json(RegionsResponse {
        probes: state.probes.list_probe_details().await,
        exchanges: state.reference.servers().to_vec(),
    })
}
