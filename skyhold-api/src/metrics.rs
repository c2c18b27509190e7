use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use skyhold_shared::LifecycleEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::state::AppState;

/// Prometheus counters for the booking core.
pub struct Metrics {
    registry: Registry,
    pub transitions: IntCounterVec,
    pub payment_attempts: IntCounterVec,
    pub seat_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let transitions = IntCounterVec::new(
            Opts::new("skyhold_booking_transitions_total", "Booking state transitions by target state"),
            &["to"],
        )?;
        let payment_attempts = IntCounterVec::new(
            Opts::new("skyhold_payment_attempts_total", "Gateway calls by outcome"),
            &["outcome"],
        )?;
        let seat_conflicts = IntCounter::new(
            "skyhold_seat_conflicts_total",
            "Booking requests refused because the seat was taken",
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(payment_attempts.clone()))?;
        registry.register(Box::new(seat_conflicts.clone()))?;

        Ok(Self {
            registry,
            transitions,
            payment_attempts,
            seat_conflicts,
        })
    }

    pub fn record(&self, event: &LifecycleEvent) {
        if let LifecycleEvent::BookingTransitioned(t) = event {
            self.transitions.with_label_values(&[t.to.as_str()]).inc();
        }
    }

    /// Count lifecycle events from the bus until it closes.
    pub fn spawn_recorder(self: Arc<Self>, mut events: broadcast::Receiver<LifecycleEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.record(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Metrics recorder fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
