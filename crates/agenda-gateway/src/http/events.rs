//! Event CRUD and per-event notification history.
//!
//! | Method | Path                          | Success |
//! |--------|-------------------------------|---------|
//! | POST   | `/events`                     | 201     |
//! | GET    | `/events`                     | 200     |
//! | GET    | `/events/{id}`                | 200     |
//! | PUT    | `/events/{id}`                | 200     |
//! | DELETE | `/events/{id}`                | 200     |
//! | GET    | `/events/{id}/notifications`  | 200     |
//!
//! Validation failures answer 400 and unknown ids 404, both with a
//! `{ "error": ..., "code": ... }` body.

use std::sync::Arc;

use agenda_core::{AgendaError, Event, Notification};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{api_error, ApiError};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct ReminderBody {
    pub lead_minutes: i64,
}

/// Request body for create and update.
#[derive(Debug, Deserialize)]
pub struct EventBody {
    pub title: String,
    pub occurs_at: DateTime<Utc>,
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reminders: Vec<ReminderBody>,
}

impl EventBody {
    fn into_event(self) -> agenda_core::Result<Event> {
        Event::new(self.title, self.occurs_at, self.recipient, self.description)?
            .with_reminders(self.reminders.iter().map(|r| r.lead_minutes))
    }
}

/// Unwrap the JSON body, answering malformed input with our own 400.
fn parse_body(payload: Result<Json<EventBody>, JsonRejection>) -> Result<Event, ApiError> {
    let Json(body) = payload.map_err(|e| api_error(AgendaError::Validation(e.body_text())))?;
    body.into_event().map_err(api_error)
}

/// POST /events
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EventBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = parse_body(payload)?;
    let created = state
        .events
        .create(&event)
        .map_err(|e| api_error(e.into()))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state.events.list_all().map_err(|e| api_error(e.into()))?;
    Ok(Json(events))
}

/// GET /events/{id}
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    let event = state.events.get(id).map_err(|e| api_error(e.into()))?;
    Ok(Json(event))
}

/// PUT /events/{id}: replaces every field and the whole reminder set.
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<EventBody>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let event = parse_body(payload)?;
    let updated = state
        .events
        .update(id, &event)
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(updated))
}

/// DELETE /events/{id}: also drops the event's reminders and ledger history.
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.events.delete(id).map_err(|e| api_error(e.into()))?;
    info!(event_id = id, "event deleted via API");
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /events/{id}/notifications: delivery attempts for one event, oldest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    state.events.get(id).map_err(|e| api_error(e.into()))?;
    let history = state
        .ledger
        .list_for_event(id)
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(history))
}
