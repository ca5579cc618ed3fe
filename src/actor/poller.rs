//! Periodic foreground sampling.
//!
//! The poller owns no state of its own: each tick reads the coordinator's
//! published snapshot, samples the OS, and reports what it saw as events.
//! It also doubles as the safety net for notification windows that vanish
//! without a destroy notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::coordinator::{self, Event, Mode, StateSnapshot};
use crate::classify::WindowClassifier;
use crate::sys::window::{WindowHandle, WindowOps};

#[derive(Debug)]
pub enum Request {
    Stop,
}

pub type Sender = crate::actor::Sender<Request>;
pub type Receiver = crate::actor::Receiver<Request>;

pub struct ForegroundPoller {
    events_tx: coordinator::Sender,
    requests_rx: Option<Receiver>,
    ops: Arc<dyn WindowOps>,
    classifier: Arc<WindowClassifier>,
    snapshot: StateSnapshot,
    /// Our own shell window; pinned topmost and excluded from focus
    /// reporting so touching a button never counts as a focus change.
    shell_window: WindowHandle,
    poll_interval: Duration,
}

impl ForegroundPoller {
    pub fn new(
        events_tx: coordinator::Sender,
        requests_rx: Receiver,
        ops: Arc<dyn WindowOps>,
        classifier: Arc<WindowClassifier>,
        snapshot: StateSnapshot,
        shell_window: WindowHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            events_tx,
            requests_rx: Some(requests_rx),
            ops,
            classifier,
            snapshot,
            shell_window,
            poll_interval,
        }
    }

    pub async fn run(mut self) {
        let mut requests_rx = match self.requests_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                request = requests_rx.recv() => {
                    match request {
                        Some((span, Request::Stop)) => {
                            let _g = span.enter();
                            debug!("received Stop request");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
        debug!("ForegroundPoller actor exiting");
    }

    pub(crate) fn tick(&self) {
        if !self.shell_window.is_none() {
            self.ops.keep_above(self.shell_window);
        }

        let (mode, tracked) = self.snapshot.read();
        if mode == Mode::IncomingCall {
            // While a notification is up we only watch for it dying on us.
            if tracked.is_none() || !self.ops.is_visible(tracked) {
                warn!(%tracked, "tracked notification window is no longer visible");
                self.events_tx.send(Event::NotificationGone);
            }
            return;
        }

        let foreground = self.ops.foreground_window();
        if foreground.is_none() || foreground == self.shell_window {
            return;
        }

        if self.classifier.is_call_window(foreground) {
            self.events_tx.send(Event::ActiveCallObserved(foreground));
            return;
        }

        let Some(process) = self.ops.process_name(foreground) else {
            return;
        };
        if process.is_empty() {
            return;
        }
        self.events_tx
            .send(Event::FocusObserved { window: foreground, process });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::actor;
    use crate::classify::KeywordPolicy;
    use crate::common::config::KeywordSettings;
    use crate::sys::testing::{FakeAx, FakeWindows};
    use crate::sys::window::Rect;

    struct Harness {
        poller: ForegroundPoller,
        events_rx: coordinator::Receiver,
        snapshot: StateSnapshot,
        ops: Arc<FakeWindows>,
        ax: Arc<FakeAx>,
    }

    fn harness(shell: WindowHandle) -> Harness {
        let (events_tx, events_rx) = actor::channel();
        let (_requests_tx, requests_rx) = actor::channel();
        let ops = Arc::new(FakeWindows::default());
        let ax = Arc::new(FakeAx::default());
        let classifier = Arc::new(WindowClassifier::new(
            ops.clone(),
            ax.clone(),
            KeywordPolicy::new(&KeywordSettings::default()),
            "ms-teams".into(),
            300.0,
        ));
        let snapshot = StateSnapshot::default();
        let poller = ForegroundPoller::new(
            events_tx,
            requests_rx,
            ops.clone(),
            classifier,
            snapshot.clone(),
            shell,
            Duration::from_millis(500),
        );
        Harness { poller, events_rx, snapshot, ops, ax }
    }

    fn events(h: &mut Harness) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok((_, event)) = h.events_rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn reports_the_foreground_process() {
        let mut h = harness(WindowHandle::NONE);
        let w = WindowHandle::new(5);
        h.ops.add_window(w, "notepad", Rect::default());
        h.ops.set_foreground(w);

        h.poller.tick();

        match &events(&mut h)[..] {
            [Event::FocusObserved { window, process }] => {
                assert_eq!(*window, w);
                assert_eq!(process, "notepad");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn empty_foreground_reports_nothing() {
        let mut h = harness(WindowHandle::NONE);
        h.poller.tick();
        assert!(events(&mut h).is_empty());
    }

    #[test]
    fn our_own_shell_window_is_not_reported() {
        let shell = WindowHandle::new(3);
        let mut h = harness(shell);
        h.ops.add_window(shell, "touchdeck", Rect::default());
        h.ops.set_foreground(shell);

        h.poller.tick();

        assert!(events(&mut h).is_empty());
        // Each tick re-pins the shell window on top.
        assert_eq!(h.ops.keep_above_calls(), vec![shell]);
    }

    #[test]
    fn foreground_call_window_is_reported_as_active_call() {
        let mut h = harness(WindowHandle::NONE);
        let w = WindowHandle::new(5);
        h.ops.add_window(w, "ms-teams", Rect::default());
        h.ax.set_buttons(w, &["Mute", "Hang up"]);
        h.ops.set_foreground(w);

        h.poller.tick();

        match &events(&mut h)[..] {
            [Event::ActiveCallObserved(window)] => assert_eq!(*window, w),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn ordinary_conferencing_window_is_a_plain_focus_change() {
        let mut h = harness(WindowHandle::NONE);
        let w = WindowHandle::new(5);
        h.ops.add_window(w, "ms-teams", Rect::default());
        h.ops.set_foreground(w);

        h.poller.tick();

        match &events(&mut h)[..] {
            [Event::FocusObserved { process, .. }] => assert_eq!(process, "ms-teams"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn vanished_notification_triggers_the_safety_net() {
        let mut h = harness(WindowHandle::NONE);
        let n = WindowHandle::new(7);
        h.snapshot.publish(Mode::IncomingCall, n);

        h.poller.tick();

        match &events(&mut h)[..] {
            [Event::NotificationGone] => {}
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn visible_notification_suppresses_focus_reporting() {
        let mut h = harness(WindowHandle::NONE);
        let n = WindowHandle::new(7);
        let w = WindowHandle::new(5);
        h.ops.add_window(n, "ms-teams", Rect::default());
        h.ops.add_window(w, "notepad", Rect::default());
        h.ops.set_foreground(w);
        h.snapshot.publish(Mode::IncomingCall, n);

        h.poller.tick();

        assert!(events(&mut h).is_empty());
    }
}
