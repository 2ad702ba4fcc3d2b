//! Cooperative frame loop modelling the host's update callbacks.
//!
//! Two mechanisms are modelled: periodic tick subscribers, delivered once per
//! frame until they unregister themselves, and one-shot deferred calls,
//! which run in FIFO order after the frame's ticks. A deferred call that
//! schedules another deferred call pushes it to the following frame.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Returned by a tick subscriber to stay registered or leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep receiving ticks.
    Continue,
    /// Stop receiving ticks.
    Unregister,
}

/// Identifies a tick subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type TickCallback = Box<dyn FnMut(&mut FrameContext) -> TickControl + Send>;
type DeferredCall = Box<dyn FnOnce(&mut FrameContext) + Send>;

/// Handed to callbacks during a frame.
pub struct FrameContext {
    frame: u64,
    scheduled: VecDeque<DeferredCall>,
    exit_code: Option<i32>,
}

impl FrameContext {
    fn new(frame: u64) -> Self {
        Self {
            frame,
            scheduled: VecDeque::new(),
            exit_code: None,
        }
    }

    /// The current frame number, starting at 1.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Schedules a one-shot call for the next time deferred calls run.
    pub fn delay_call(&mut self, call: impl FnOnce(&mut FrameContext) + Send + 'static) {
        self.scheduled.push_back(Box::new(call));
    }

    /// Asks the host to exit with `code` at the end of the frame.
    pub fn exit(&mut self, code: i32) {
        if let Some(existing) = self.exit_code {
            warn!(existing, requested = code, "Exit already requested, keeping first code");
            return;
        }
        self.exit_code = Some(code);
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Frames executed.
    pub frames: u64,
    /// Exit code requested by a callback, if any.
    pub exit_code: Option<i32>,
}

/// A single-threaded frame loop.
#[derive(Default)]
pub struct EditorLoop {
    subscribers: Vec<(SubscriptionId, TickCallback)>,
    deferred: VecDeque<DeferredCall>,
    next_id: u64,
    frame: u64,
    exit_code: Option<i32>,
}

impl std::fmt::Debug for EditorLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorLoop")
            .field("subscribers", &self.subscribers.len())
            .field("deferred", &self.deferred.len())
            .field("frame", &self.frame)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl EditorLoop {
    /// Creates an empty loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tick subscriber.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&mut FrameContext) -> TickControl + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Schedules a deferred call from outside a frame.
    pub fn delay_call(&mut self, call: impl FnOnce(&mut FrameContext) + Send + 'static) {
        self.deferred.push_back(Box::new(call));
    }

    /// Number of registered tick subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Exit code requested so far.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Returns true when nothing is left to run.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && self.deferred.is_empty()
    }

    /// Runs one frame: ticks, then the deferred calls pending at that point.
    pub fn run_frame(&mut self) {
        self.frame += 1;
        let mut ctx = FrameContext::new(self.frame);

        self.subscribers
            .retain_mut(|(_, callback)| callback(&mut ctx) == TickControl::Continue);

        self.deferred.append(&mut ctx.scheduled);
        let batch = std::mem::take(&mut self.deferred);
        for call in batch {
            call(&mut ctx);
        }
        self.deferred.append(&mut ctx.scheduled);

        if self.exit_code.is_none() {
            self.exit_code = ctx.exit_code;
        }
    }

    /// Runs frames until exit is requested, the loop goes idle, or
    /// `max_frames` have run.
    pub fn run_until_exit(&mut self, max_frames: u64) -> LoopOutcome {
        let start = self.frame;
        while self.exit_code.is_none() && !self.is_idle() && self.frame - start < max_frames {
            self.run_frame();
        }
        self.outcome(start)
    }

    /// Like [`run_until_exit`](Self::run_until_exit), with one frame per
    /// `period` of wall-clock time.
    pub async fn run_paced(&mut self, period: Duration, max_frames: u64) -> LoopOutcome {
        let start = self.frame;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while self.exit_code.is_none() && !self.is_idle() && self.frame - start < max_frames {
            interval.tick().await;
            self.run_frame();
        }
        self.outcome(start)
    }

    fn outcome(&self, start: u64) -> LoopOutcome {
        let outcome = LoopOutcome {
            frames: self.frame - start,
            exit_code: self.exit_code,
        };
        debug!(frames = outcome.frames, exit_code = ?outcome.exit_code, "Frame loop stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone + Send + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |entry: &str| sink.lock().push(entry.to_string()))
    }

    #[test]
    fn test_subscriber_ticks_until_unregistered() {
        let mut editor = EditorLoop::new();
        let mut ticks = 0;
        let (log, record) = recorder();
        editor.subscribe(move |_| {
            ticks += 1;
            record(&format!("tick {ticks}"));
            if ticks == 3 {
                TickControl::Unregister
            } else {
                TickControl::Continue
            }
        });

        let outcome = editor.run_until_exit(10);

        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(log.lock().len(), 3);
        assert_eq!(editor.subscriber_count(), 0);
    }

    #[test]
    fn test_deferred_calls_run_after_ticks_in_order() {
        let mut editor = EditorLoop::new();
        let (log, record) = recorder();

        let r = record.clone();
        editor.subscribe(move |ctx| {
            r("tick");
            let r1 = r.clone();
            let r2 = r.clone();
            ctx.delay_call(move |_| r1("first"));
            ctx.delay_call(move |_| r2("second"));
            TickControl::Unregister
        });
        editor.run_frame();

        assert_eq!(*log.lock(), vec!["tick", "first", "second"]);
    }

    #[test]
    fn test_chained_deferred_call_runs_next_frame() {
        let mut editor = EditorLoop::new();
        let (log, record) = recorder();

        let r = record.clone();
        editor.delay_call(move |ctx| {
            r(&format!("outer@{}", ctx.frame()));
            let r = r.clone();
            ctx.delay_call(move |ctx| {
                r(&format!("inner@{}", ctx.frame()));
                ctx.exit(0);
            });
        });

        let outcome = editor.run_until_exit(10);

        assert_eq!(*log.lock(), vec!["outer@1", "inner@2"]);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.frames, 2);
    }

    #[test]
    fn test_first_exit_code_wins() {
        let mut editor = EditorLoop::new();
        editor.delay_call(|ctx| {
            ctx.exit(1);
            ctx.exit(0);
        });
        assert_eq!(editor.run_until_exit(5).exit_code, Some(1));
    }

    #[test]
    fn test_unsubscribe_and_frame_budget() {
        let mut editor = EditorLoop::new();
        let id = editor.subscribe(|_| TickControl::Continue);
        let outcome = editor.run_until_exit(4);
        assert_eq!(outcome.frames, 4);
        assert!(editor.unsubscribe(id));
        assert!(!editor.unsubscribe(id));
        assert!(editor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paced() {
        let mut editor = EditorLoop::new();
        let mut ticks = 0;
        editor.subscribe(move |ctx| {
            ticks += 1;
            if ticks == 5 {
                ctx.exit(0);
            }
            TickControl::Continue
        });

        let outcome = editor.run_paced(Duration::from_millis(50), 100).await;
        assert_eq!(outcome.frames, 5);
        assert_eq!(outcome.exit_code, Some(0));
    }
}
