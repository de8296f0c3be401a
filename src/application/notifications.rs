use crate::domain::models::NotificationEvent;
use crate::infrastructure::error::InfraError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Receives display transitions from `run_display`.
pub trait NotificationSink: Send + Sync {
    fn show(&self, event: &NotificationEvent);
    fn hide(&self, event: &NotificationEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChange {
    Shown(NotificationEvent),
    Hidden(NotificationEvent),
}

#[derive(Debug)]
struct Displayed {
    event: NotificationEvent,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<NotificationEvent>,
    current: Option<Displayed>,
}

/// FIFO of award notifications with at most one on screen.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    state: Mutex<QueueState>,
}

impl NotificationQueue {
    pub fn enqueue<I>(&self, events: I) -> Result<usize, InfraError>
    where
        I: IntoIterator<Item = NotificationEvent>,
    {
        let mut state = self.lock()?;
        let before = state.pending.len();
        state.pending.extend(events);
        let added = state.pending.len() - before;
        if added > 0 {
            tracing::debug!(added, pending = state.pending.len(), "notifications queued");
        }
        Ok(added)
    }

    /// Advances the display by at most one transition: an expired event is
    /// hidden, or an idle display promotes the head of the queue.
    pub fn poll(&self, now: Instant) -> Result<Option<DisplayChange>, InfraError> {
        let mut state = self.lock()?;
        if let Some(current) = &state.current {
            if now < current.deadline {
                return Ok(None);
            }
            return Ok(state
                .current
                .take()
                .map(|displayed| DisplayChange::Hidden(displayed.event)));
        }

        let Some(event) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.current = Some(Displayed {
            deadline: now + event.display_duration(),
            event: event.clone(),
        });
        Ok(Some(DisplayChange::Shown(event)))
    }

    /// Closes the event on screen before its timer runs out.
    pub fn dismiss(&self) -> Result<Option<NotificationEvent>, InfraError> {
        Ok(self.lock()?.current.take().map(|displayed| displayed.event))
    }

    /// Empties the queue, returning the event on screen followed by the
    /// pending ones in arrival order. For surfaces that print once and exit.
    pub fn take_all(&self) -> Result<Vec<NotificationEvent>, InfraError> {
        let mut state = self.lock()?;
        let current = state.current.take().map(|displayed| displayed.event);
        Ok(current.into_iter().chain(state.pending.drain(..)).collect())
    }

    pub fn current(&self) -> Result<Option<NotificationEvent>, InfraError> {
        Ok(self
            .lock()?
            .current
            .as_ref()
            .map(|displayed| displayed.event.clone()))
    }

    pub fn pending_len(&self) -> Result<usize, InfraError> {
        Ok(self.lock()?.pending.len())
    }

    pub fn is_idle(&self) -> Result<bool, InfraError> {
        let state = self.lock()?;
        Ok(state.current.is_none() && state.pending.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::StaleState(format!("notification lock poisoned: {error}")))
    }
}

pub async fn run_display(
    queue: Arc<NotificationQueue>,
    sink: Arc<dyn NotificationSink>,
    cancel: CancellationToken,
) -> Result<(), InfraError> {
    let mut interval = tokio::time::interval(DISPLAY_POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Some(event) = queue.dismiss()? {
                    sink.hide(&event);
                }
                tracing::debug!("notification display stopped");
                return Ok(());
            }
            _ = interval.tick() => {
                match queue.poll(Instant::now())? {
                    Some(DisplayChange::Shown(event)) => {
                        tracing::info!(kind = event.kind(), "showing notification");
                        sink.show(&event);
                    }
                    Some(DisplayChange::Hidden(event)) => sink.hide(&event),
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Achievement;
    use proptest::prelude::*;

    fn xp_event(amount: u32) -> NotificationEvent {
        NotificationEvent::Xp {
            xp_amount: amount,
            reason: None,
        }
    }

    fn achievement_event(name: &str) -> NotificationEvent {
        NotificationEvent::Achievement(Achievement {
            id: name.to_string(),
            name: name.to_string(),
            description: String::new(),
            icon: "🐊".to_string(),
            xp_reward: 10,
        })
    }

    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<DisplayChange>>,
    }

    impl RecordingSink {
        fn changes(&self) -> Vec<DisplayChange> {
            self.log.lock().expect("sink lock").clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn show(&self, event: &NotificationEvent) {
            self.log
                .lock()
                .expect("sink lock")
                .push(DisplayChange::Shown(event.clone()));
        }

        fn hide(&self, event: &NotificationEvent) {
            self.log
                .lock()
                .expect("sink lock")
                .push(DisplayChange::Hidden(event.clone()));
        }
    }

    #[test]
    fn take_all_returns_shown_then_pending_and_empties_queue() {
        let queue = NotificationQueue::default();
        queue
            .enqueue([xp_event(10), achievement_event("Focused"), xp_event(5)])
            .expect("enqueue");
        queue.poll(Instant::now()).expect("poll");

        assert_eq!(
            queue.take_all().expect("take"),
            vec![xp_event(10), achievement_event("Focused"), xp_event(5)]
        );
        assert!(queue.is_idle().expect("idle"));
        assert!(queue.take_all().expect("take").is_empty());
    }

    #[test]
    fn xp_event_hides_after_four_seconds() {
        let queue = NotificationQueue::default();
        queue.enqueue([xp_event(10)]).expect("enqueue");
        let start = Instant::now();

        assert_eq!(
            queue.poll(start).expect("poll"),
            Some(DisplayChange::Shown(xp_event(10)))
        );
        assert_eq!(queue.poll(start + Duration::from_millis(3_999)).expect("poll"), None);
        assert_eq!(
            queue.poll(start + Duration::from_secs(4)).expect("poll"),
            Some(DisplayChange::Hidden(xp_event(10)))
        );
        assert!(queue.is_idle().expect("idle"));
    }

    #[test]
    fn next_event_waits_for_following_poll() {
        let queue = NotificationQueue::default();
        queue
            .enqueue([achievement_event("First"), achievement_event("Second")])
            .expect("enqueue");
        let start = Instant::now();
        queue.poll(start).expect("show first");

        let hide_at = start + Duration::from_secs(5);
        assert_eq!(
            queue.poll(hide_at).expect("poll"),
            Some(DisplayChange::Hidden(achievement_event("First")))
        );
        assert_eq!(queue.current().expect("current"), None);
        assert_eq!(
            queue.poll(hide_at).expect("poll"),
            Some(DisplayChange::Shown(achievement_event("Second")))
        );
    }

    #[test]
    fn dismiss_frees_display_early() {
        let queue = NotificationQueue::default();
        queue.enqueue([xp_event(5), xp_event(6)]).expect("enqueue");
        let start = Instant::now();
        queue.poll(start).expect("show");

        assert_eq!(queue.dismiss().expect("dismiss"), Some(xp_event(5)));
        assert_eq!(
            queue.poll(start + Duration::from_millis(10)).expect("poll"),
            Some(DisplayChange::Shown(xp_event(6)))
        );
        assert_eq!(queue.pending_len().expect("pending"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn display_loop_shows_events_in_order_one_at_a_time() {
        let queue = Arc::new(NotificationQueue::default());
        let sink = Arc::new(RecordingSink::default());
        queue
            .enqueue([xp_event(10), achievement_event("Early Bird"), achievement_event("Streak")])
            .expect("enqueue");

        let cancel = CancellationToken::new();
        let driver = tokio::spawn(run_display(
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(20)).await;
        cancel.cancel();
        driver.await.expect("join").expect("display loop");

        assert_eq!(
            sink.changes(),
            vec![
                DisplayChange::Shown(xp_event(10)),
                DisplayChange::Hidden(xp_event(10)),
                DisplayChange::Shown(achievement_event("Early Bird")),
                DisplayChange::Hidden(achievement_event("Early Bird")),
                DisplayChange::Shown(achievement_event("Streak")),
                DisplayChange::Hidden(achievement_event("Streak")),
            ]
        );
    }

    proptest! {
        #[test]
        fn queue_is_strict_fifo_with_single_display(amounts in prop::collection::vec(1u32..1000u32, 0..30)) {
            let queue = NotificationQueue::default();
            queue.enqueue(amounts.iter().copied().map(xp_event)).expect("enqueue");

            let mut now = Instant::now();
            let mut shown = Vec::new();
            let mut on_screen = 0i32;
            for _ in 0..(amounts.len() * 2 + 2) {
                match queue.poll(now).expect("poll") {
                    Some(DisplayChange::Shown(NotificationEvent::Xp { xp_amount, .. })) => {
                        on_screen += 1;
                        shown.push(xp_amount);
                    }
                    Some(DisplayChange::Hidden(_)) => on_screen -= 1,
                    _ => {}
                }
                prop_assert!(on_screen <= 1);
                now += Duration::from_secs(4);
            }
            prop_assert_eq!(shown, amounts);
        }
    }
}
