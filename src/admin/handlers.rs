use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub tracked_destinations: usize,
    pub open_circuits: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let breakers = state.client.breakers().snapshot();
    let open_circuits = breakers
        .iter()
        .filter(|b| b.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_destinations: breakers.len(),
        open_circuits,
    })
}

/// One entry per tracked destination, most failures first.
pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    let mut breakers = state.client.breakers().snapshot();
    breakers.sort_by(|a, b| {
        b.failure_count
            .cmp(&a.failure_count)
            .then_with(|| a.destination.cmp(&b.destination))
    });
    Json(breakers)
}
