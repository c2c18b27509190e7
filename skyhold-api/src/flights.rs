use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use skyhold_catalog::{FlightView, SeatView};
use skyhold_shared::LifecycleEvent;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{parse_id, AppError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/flights/", get(list_flights))
        .route("/flights/{id}/", get(get_flight))
        .route("/flights/{id}/seats/", get(list_seats))
        .route("/flights/{id}/stream", get(seat_stream))
}

async fn list_flights(State(state): State<AppState>) -> Result<Json<Vec<FlightView>>, AppError> {
    Ok(Json(state.inventory.list_flights().await?))
}

async fn get_flight(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<FlightView>, AppError> {
    let flight_id = parse_id(&id, "flight")?;
    Ok(Json(state.inventory.flight(flight_id).await?))
}

async fn list_seats(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<SeatView>>, AppError> {
    let flight_id = parse_id(&id, "flight")?;
    Ok(Json(state.inventory.list_seats(flight_id).await?))
}

/// Live seat status changes for one flight, as Server-Sent Events.
async fn seat_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let flight_id = parse_id(&id, "flight")?;
    state.inventory.flight(flight_id).await?;

    let rx = state.bookings.subscribe();
    // Lagged receivers skip ahead; clients re-read the seat map on reconnect
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(LifecycleEvent::SeatStatusChanged(change)) if change.flight_id == flight_id => Event::default()
                .event("seat_status")
                .json_data(&change)
                .ok()
                .map(Ok),
            _ => None,
        }
    });

    tracing::debug!(flight_id = %flight_id, "Seat stream opened");
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
