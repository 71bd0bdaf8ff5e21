use std::sync::Arc;

use agenda_core::config::AgendaConfig;
use agenda_events::EventStore;
use agenda_scheduler::{NotificationLedger, ReminderScheduler};
use axum::{routing::get, Router};

/// Shared state handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: AgendaConfig,
    pub events: EventStore,
    /// Read-only from handlers: only the scheduler settles ledger entries.
    pub ledger: Arc<dyn NotificationLedger>,
    pub scheduler: Arc<ReminderScheduler>,
}

impl AppState {
    pub fn new(
        config: AgendaConfig,
        events: EventStore,
        ledger: Arc<dyn NotificationLedger>,
        scheduler: Arc<ReminderScheduler>,
    ) -> Self {
        Self {
            config,
            events,
            ledger,
            scheduler,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{events, health};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/{id}",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/{id}/notifications", get(events::list_notifications))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
