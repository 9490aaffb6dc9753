//! Single-consumer executor draining the action queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app::shutdown::ShutdownSignal;
use crate::command::{Action, ActionKind, KeyCode};
use crate::util::time::tick_period;

use super::sink::{InputSink, SinkError};
use super::{MAX_POLL_HZ, MIN_POLL_HZ};

/// Executor counters, readable from any task
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub enqueued: AtomicU64,
    pub executed: AtomicU64,
    pub sink_failures: AtomicU64,
}

impl SchedulerStats {
    /// Actions enqueued but not yet taken by the executor
    pub fn pending(&self) -> u64 {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let executed = self.executed.load(Ordering::Relaxed);
        let failed = self.sink_failures.load(Ordering::Relaxed);
        enqueued.saturating_sub(executed + failed)
    }
}

/// Producer handle. Cheap to clone; enqueue never blocks.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<Action>,
    stats: Arc<SchedulerStats>,
}

impl ActionQueue {
    /// Returns `false` once the executor has stopped
    pub fn enqueue(&self, action: Action) -> bool {
        if self.tx.send(action).is_err() {
            return false;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Enqueue in order; returns how many were accepted
    pub fn enqueue_all(&self, actions: impl IntoIterator<Item = Action>) -> usize {
        actions
            .into_iter()
            .take_while(|action| self.enqueue(action.clone()))
            .count()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

/// The background task executing actions against an [`InputSink`]
pub struct ActionScheduler {
    rx: mpsc::UnboundedReceiver<Action>,
    sink: Box<dyn InputSink>,
    poll_period: Duration,
    stats: Arc<SchedulerStats>,
    shutdown: ShutdownSignal,
    /// Keys currently down, released on exit
    held: Vec<KeyCode>,
}

impl ActionScheduler {
    /// Start the executor. `poll_hz` is clamped to the supported range.
    pub fn spawn(
        sink: Box<dyn InputSink>,
        poll_hz: u32,
        shutdown: ShutdownSignal,
    ) -> (ActionQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(SchedulerStats::default());
        let scheduler = Self {
            rx,
            sink,
            poll_period: tick_period(poll_hz.clamp(MIN_POLL_HZ, MAX_POLL_HZ)),
            stats: stats.clone(),
            shutdown,
            held: Vec::new(),
        };
        let task = tokio::spawn(scheduler.run());
        (ActionQueue { tx, stats }, task)
    }

    async fn run(mut self) {
        info!(poll_ms = self.poll_period.as_millis() as u64, "Action scheduler started");

        let mut poll = interval(self.poll_period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        'outer: loop {
            tokio::select! {
                _ = poll.tick() => {}
                _ = self.shutdown.triggered() => break,
            }

            loop {
                match self.rx.try_recv() {
                    Ok(action) => {
                        if !self.execute(action).await {
                            break 'outer;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break 'outer,
                }
            }
        }

        self.release_held();
        info!(
            executed = self.stats.executed.load(Ordering::Relaxed),
            dropped = self.rx.len(),
            "Action scheduler stopped"
        );
    }

    /// Run one action. Returns `false` when shutdown interrupted a pause.
    async fn execute(&mut self, action: Action) -> bool {
        let hold = Duration::from_millis(u64::from(action.hold_millis));

        if action.kind == ActionKind::Wait {
            self.stats.executed.fetch_add(1, Ordering::Relaxed);
            return self.shutdown.sleep(hold).await;
        }

        match self.dispatch(&action.kind) {
            Ok(()) => {
                self.stats.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, action = ?action.kind, "Input sink failed, continuing");
            }
        }

        if hold.is_zero() {
            return true;
        }
        self.shutdown.sleep(hold).await
    }

    fn dispatch(&mut self, kind: &ActionKind) -> Result<(), SinkError> {
        debug!(action = ?kind, "dispatch");
        match kind {
            ActionKind::KeyDown(key) => {
                self.sink.key_down(key)?;
                if !self.held.contains(key) {
                    self.held.push(key.clone());
                }
                Ok(())
            }
            ActionKind::KeyUp(key) => {
                self.held.retain(|held| held != key);
                self.sink.key_up(key)
            }
            ActionKind::KeyPress(key) => {
                self.sink.key_down(key)?;
                self.sink.key_up(key)
            }
            ActionKind::PointerMove { dx, dy } => self.sink.pointer_move(*dx, *dy),
            ActionKind::PointerClick => self.sink.pointer_click(),
            ActionKind::Wait => Ok(()),
        }
    }

    fn release_held(&mut self) {
        for key in std::mem::take(&mut self.held) {
            if let Err(e) = self.sink.key_up(&key) {
                warn!(key = %key, error = %e, "Failed to release held key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shutdown;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<String>>>,
        fail_clicks: bool,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl InputSink for RecordingSink {
        fn key_down(&mut self, key: &KeyCode) -> Result<(), SinkError> {
            self.events.lock().push(format!("down {key}"));
            Ok(())
        }

        fn key_up(&mut self, key: &KeyCode) -> Result<(), SinkError> {
            self.events.lock().push(format!("up {key}"));
            Ok(())
        }

        fn pointer_move(&mut self, dx: i32, dy: i32) -> Result<(), SinkError> {
            self.events.lock().push(format!("move {dx},{dy}"));
            Ok(())
        }

        fn pointer_click(&mut self) -> Result<(), SinkError> {
            if self.fail_clicks {
                return Err(SinkError::Rejected {
                    primitive: "pointer_click",
                    message: "no focus".into(),
                });
            }
            self.events.lock().push("click".into());
            Ok(())
        }
    }

    fn key(name: &str) -> KeyCode {
        KeyCode::new(name)
    }

    #[tokio::test(start_paused = true)]
    async fn executes_in_enqueue_order_across_producers() {
        let sink = RecordingSink::default();
        let (_trigger, signal) = shutdown::channel();
        let (queue, _task) = ActionScheduler::spawn(Box::new(sink.clone()), 50, signal);

        for name in ["a", "b", "c"] {
            let producer = queue.clone();
            let action = Action::key_press(key(name));
            tokio::spawn(async move { producer.enqueue(action) })
                .await
                .expect("producer joins");
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            sink.events(),
            vec!["down a", "up a", "down b", "up b", "down c", "up c"]
        );
        assert_eq!(queue.stats().executed.load(Ordering::Relaxed), 3);
        assert_eq!(queue.stats().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_delays_executor_but_not_enqueue() {
        let sink = RecordingSink::default();
        let (_trigger, signal) = shutdown::channel();
        let (queue, _task) = ActionScheduler::spawn(Box::new(sink.clone()), 50, signal);

        assert_eq!(
            queue.enqueue_all([Action::wait(10_000), Action::pointer_move(-10, 0)]),
            2
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.events().is_empty());
        assert!(queue.enqueue(Action::pointer_click()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.events(), vec!["move -10,0", "click"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failures_are_counted_and_skipped() {
        let sink = RecordingSink {
            fail_clicks: true,
            ..Default::default()
        };
        let (_trigger, signal) = shutdown::channel();
        let (queue, _task) = ActionScheduler::spawn(Box::new(sink.clone()), 50, signal);

        queue.enqueue_all([Action::pointer_click(), Action::key_press(key("3"))]);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(sink.events(), vec!["down 3", "up 3"]);
        assert_eq!(queue.stats().sink_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_hold_and_releases_keys() {
        let sink = RecordingSink::default();
        let (trigger, signal) = shutdown::channel();
        let (queue, task) = ActionScheduler::spawn(Box::new(sink.clone()), 50, signal);

        queue.enqueue_all([
            Action::key_down(key("w")),
            Action::wait(60_000),
            Action::key_up(key("w")),
        ]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_millis(50), task).await
        );
        assert_eq!(sink.events(), vec!["down w", "up w"]);
        assert!(!queue.enqueue(Action::pointer_click()));
    }
}
