use std::sync::{Arc, Mutex};
use std::time::Duration;

use agenda_channels::DeliveryChannel;
use agenda_core::Event;
use agenda_events::EventStore;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{Result, SchedulerError},
    evaluator::due_reminders,
    ledger::NotificationLedger,
    orchestrator::{DeliveryOutcome, Orchestrator},
};

/// Detail recorded on entries left `pending` by a previous run.
const ABANDONED_DETAIL: &str = "interrupted before delivery outcome was recorded";

/// Where the scheduler reads events from.
pub trait EventSource: Send + Sync {
    /// Every event with its reminders.
    fn list_all_events(&self) -> Result<Vec<Event>>;
}

impl EventSource for EventStore {
    fn list_all_events(&self) -> Result<Vec<Event>> {
        Ok(self.list_all()?)
    }
}

/// Tally of one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub already_sent: usize,
    pub sent: usize,
    pub failed: usize,
    /// Reminders whose processing hit a ledger fault.
    pub errored: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::AlreadySent => self.already_sent += 1,
            DeliveryOutcome::Sent { .. } => self.sent += 1,
            DeliveryOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// One evaluate-then-dispatch pass over the event store, repeated on a fixed
/// interval by [`SchedulerEngine::run`].
pub struct SchedulerEngine {
    events: Arc<dyn EventSource>,
    ledger: Arc<dyn NotificationLedger>,
    orchestrator: Orchestrator,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(
        events: Arc<dyn EventSource>,
        ledger: Arc<dyn NotificationLedger>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        let orchestrator = Orchestrator::new(ledger.clone(), channel, clock.clone());
        Self {
            events,
            ledger,
            orchestrator,
            clock,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run a single cycle.
    ///
    /// Failing to list events aborts the cycle with `Err`. Past that point a
    /// fault on one reminder is logged and counted, and the rest of the cycle
    /// still runs.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        self.cycle()
            .instrument(info_span!("cycle", %cycle_id))
            .await
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let events = self.events.list_all_events()?;
        let now = self.clock.now();
        let due = due_reminders(now, &events);

        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };
        for item in &due {
            match self.orchestrator.deliver(item).await {
                Ok(outcome) => report.record(&outcome),
                Err(e @ SchedulerError::UnrecordedDelivery { .. }) => {
                    report.errored += 1;
                    error!(
                        event_id = ?item.event.id,
                        lead_minutes = item.reminder.lead_minutes(),
                        "reminder may already have been delivered and can be sent again: {e}"
                    );
                }
                Err(e) => {
                    report.errored += 1;
                    error!(
                        event_id = ?item.event.id,
                        lead_minutes = item.reminder.lead_minutes(),
                        "reminder processing failed: {e}"
                    );
                }
            }
        }
        Ok(report)
    }

    /// Settle entries a previous run left `pending`. Nothing can be in flight
    /// before the first cycle, so any such entry was interrupted.
    fn recover_abandoned(&self) {
        if let Err(e) = self.ledger.fail_abandoned(self.clock.now(), ABANDONED_DETAIL) {
            error!("abandoned-entry recovery failed: {e}");
        }
    }

    /// Main loop: cycle, then sleep `poll_interval`, until `shutdown` reads `true`.
    ///
    /// Shutdown is only observed between cycles; an in-flight cycle always
    /// runs to completion. A sleep in progress is cut short.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            channel = %self.orchestrator.channel_name(),
            "reminder scheduler started"
        );
        self.recover_abandoned();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.due > 0 => info!(
                    due = report.due,
                    already_sent = report.already_sent,
                    sent = report.sent,
                    failed = report.failed,
                    errored = report.errored,
                    "cycle complete"
                ),
                Ok(_) => debug!("cycle complete, nothing due"),
                Err(e) => error!("scheduler cycle error: {e}"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    // a dropped sender also means stop
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("reminder scheduler stopped");
    }
}

/// Externally visible state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "stopped"),
            SchedulerState::Running => write!(f, "running"),
        }
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the loop's running/stopped state; the only way to change it is
/// [`start`](Self::start) and [`stop`](Self::stop).
pub struct ReminderScheduler {
    engine: Arc<SchedulerEngine>,
    running: Mutex<Option<RunningLoop>>,
}

impl ReminderScheduler {
    pub fn new(engine: SchedulerEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            running: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &SchedulerEngine {
        &self.engine
    }

    /// `Stopped → Running`: spawn the loop on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.engine.clone().run(rx));
        *running = Some(RunningLoop {
            shutdown: tx,
            handle,
        });
        Ok(())
    }

    /// `Running → Stopped`. Waits for the in-flight cycle, if any, to finish.
    /// Stopping a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!("scheduler task ended abnormally: {e}");
        }
    }

    pub fn state(&self) -> SchedulerState {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.as_ref() {
            Some(r) if !r.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use agenda_channels::{ChannelError, OutboundMessage};
    use agenda_core::NotificationStatus;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::Connection;

    use super::*;
    use crate::{clock::ManualClock, ledger::SqliteLedger};

    struct FixedEvents(Vec<Event>);

    impl EventSource for FixedEvents {
        fn list_all_events(&self) -> Result<Vec<Event>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenEvents;

    impl EventSource for BrokenEvents {
        fn list_all_events(&self) -> Result<Vec<Event>> {
            Err(SchedulerError::Corrupt("store unreachable".into()))
        }
    }

    /// Fails its first `failures` reads, then serves `events`.
    struct RecoveringEvents {
        failures: usize,
        calls: AtomicUsize,
        events: Vec<Event>,
    }

    impl EventSource for RecoveringEvents {
        fn list_all_events(&self) -> Result<Vec<Event>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(SchedulerError::Corrupt("store unreachable".into()))
            } else {
                Ok(self.events.clone())
            }
        }
    }

    /// Fails every message addressed to `bad`.
    struct PickyChannel {
        bad: String,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeliveryChannel for PickyChannel {
        fn name(&self) -> &str {
            "email"
        }

        async fn send(&self, msg: &OutboundMessage) -> std::result::Result<(), ChannelError> {
            if msg.recipient == self.bad {
                return Err(ChannelError::ConnectionFailed("refused".into()));
            }
            self.sent.lock().unwrap().push(msg.recipient.clone());
            Ok(())
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn event(id: i64, recipient: &str, leads: &[i64]) -> Event {
        let mut event = Event::new("Standup", at(9, 0), recipient, None)
            .unwrap()
            .with_reminders(leads.iter().copied())
            .unwrap();
        event.id = Some(id);
        event
    }

    fn engine(
        events: Arc<dyn EventSource>,
        ledger: Arc<SqliteLedger>,
        channel: Arc<PickyChannel>,
        now: DateTime<Utc>,
    ) -> SchedulerEngine {
        SchedulerEngine::new(
            events,
            ledger,
            channel,
            Arc::new(ManualClock::new(now)),
            Duration::from_millis(20),
        )
    }

    fn picky(bad: &str) -> Arc<PickyChannel> {
        Arc::new(PickyChannel {
            bad: bad.into(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn ledger(event_ids: &[i64]) -> Arc<SqliteLedger> {
        let ledger = SqliteLedger::new(Connection::open_in_memory().unwrap()).unwrap();
        for id in event_ids {
            ledger.seed_event(*id);
        }
        Arc::new(ledger)
    }

    #[tokio::test]
    async fn failing_reminder_does_not_stop_the_cycle() {
        let events = Arc::new(FixedEvents(vec![
            event(1, "bad@example.com", &[10]),
            event(2, "ok@example.com", &[10]),
        ]));
        let ledger = ledger(&[1, 2]);
        let channel = picky("bad@example.com");
        let engine = engine(events, ledger.clone(), channel.clone(), at(8, 55));

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(*channel.sent.lock().unwrap(), vec!["ok@example.com"]);
    }

    #[tokio::test]
    async fn ledger_fault_on_one_reminder_is_counted_and_skipped() {
        // event 9 has no row, so its pending insert violates the foreign key
        let events = Arc::new(FixedEvents(vec![
            event(9, "ghost@example.com", &[10]),
            event(2, "ok@example.com", &[10]),
        ]));
        let ledger = ledger(&[2]);
        let channel = picky("nobody@example.com");
        let engine = engine(events, ledger.clone(), channel.clone(), at(8, 55));

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.errored, 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn unreadable_store_fails_the_cycle() {
        let engine = engine(Arc::new(BrokenEvents), ledger(&[]), picky(""), at(8, 55));
        assert!(engine.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn loop_survives_failing_cycles() {
        let events = Arc::new(RecoveringEvents {
            failures: 3,
            calls: AtomicUsize::new(0),
            events: vec![event(1, "ok@example.com", &[10])],
        });
        let ledger = ledger(&[1]);
        let channel = picky("nobody@example.com");
        let scheduler = ReminderScheduler::new(engine(
            events.clone(),
            ledger.clone(),
            channel.clone(),
            at(8, 55),
        ));

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop().await;

        assert!(events.calls.load(Ordering::SeqCst) > 3);
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        assert_eq!(ledger.list_for_event(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_stop_transitions() {
        let events = Arc::new(FixedEvents(vec![event(1, "ok@example.com", &[10])]));
        let ledger = ledger(&[1]);
        let channel = picky("nobody@example.com");
        let scheduler = ReminderScheduler::new(engine(events, ledger.clone(), channel, at(8, 55)));

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        // several cycles ran, one delivery
        assert_eq!(ledger.list_by_status(NotificationStatus::Sent).unwrap().len(), 1);

        scheduler.stop().await;
        scheduler.start().unwrap();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn startup_fails_abandoned_pending_entries() {
        let ledger = ledger(&[1]);
        ledger
            .create_pending(&agenda_core::DedupKey {
                event_id: 1,
                lead_minutes: 10,
                channel: "email".into(),
            })
            .unwrap();

        let events = Arc::new(FixedEvents(vec![]));
        let scheduler = ReminderScheduler::new(engine(
            events,
            ledger.clone(),
            picky(""),
            at(8, 55),
        ));
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        let failed = ledger.list_by_status(NotificationStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some(ABANDONED_DETAIL));
    }
}
