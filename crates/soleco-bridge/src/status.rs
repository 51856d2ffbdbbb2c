// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;

use soleco_core::{DeviceMonitor, Value};

#[derive(Debug, Clone)]
pub struct StatusState {
    pub monitor: Arc<DeviceMonitor>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub available: bool,
    pub night_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<&'static str, Option<Value>>,
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn status_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let snapshot = state.monitor.snapshot();
    Json(StatusResponse {
        available: snapshot.available,
        night_mode: snapshot.night_mode,
        last_success: snapshot.last_success,
        metrics: snapshot.values.clone(),
    })
}

pub fn router(monitor: Arc<DeviceMonitor>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .with_state(StatusState { monitor })
}
