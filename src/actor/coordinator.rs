//! The single consumer of engine events and the only owner of the app state.
//!
//! Every observation (window notifications, poll results, action outcomes)
//! lands on one queue and is applied here in arrival order, so transitions
//! never race each other.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::invoker;
use crate::actor;
use crate::classify::{CallAction, WindowClassification, WindowClassifier};
use crate::common::config::{Config, ShortcutBinding};
use crate::sys::window::WindowHandle;

#[derive(Debug)]
pub enum Event {
    /// A window of the notification class appeared.
    NotificationShown(WindowHandle),
    /// A window of the notification class went away.
    NotificationHidden(WindowHandle),
    /// The poller saw this window in the foreground.
    FocusObserved { window: WindowHandle, process: String },
    /// The poller found the foreground window to be a live call window.
    ActiveCallObserved(WindowHandle),
    /// Safety net: the tracked notification window is no longer visible.
    NotificationGone,
    /// UI request to run a call-control action against the current target.
    InvokeAction(CallAction),
    /// UI request to inject a configured shortcut into the current target.
    InvokeBinding(ShortcutBinding),
    /// Outcome of a dispatched call action.
    ActionFinished {
        action: CallAction,
        target: WindowHandle,
        ok: bool,
    },
    /// The background search located the live call window.
    CallWindowFound { generation: u64, window: WindowHandle },
    /// The background search ran out of attempts.
    SearchExhausted { generation: u64 },
    Shutdown,
}

pub type Sender = crate::actor::Sender<Event>;
pub type Receiver = crate::actor::Receiver<Event>;

/// What the button grid should show.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderRequest {
    Normal {
        app: String,
        bindings: Vec<ShortcutBinding>,
    },
    IncomingCall {
        actions: Vec<CallAction>,
    },
    InCall,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    IncomingCall,
    InCall,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AppState {
    Normal {
        focused_app: String,
        last_active: WindowHandle,
    },
    IncomingCall {
        notification: WindowHandle,
        actions: Vec<CallAction>,
    },
    InCall {
        call_window: WindowHandle,
        entered_at: Instant,
    },
}

impl AppState {
    pub fn mode(&self) -> Mode {
        match self {
            AppState::Normal { .. } => Mode::Normal,
            AppState::IncomingCall { .. } => Mode::IncomingCall,
            AppState::InCall { .. } => Mode::InCall,
        }
    }

    /// The window the current mode is anchored to; `NONE` in Normal mode,
    /// where the poller tracks focus on its own.
    fn tracked(&self) -> WindowHandle {
        match self {
            AppState::Normal { .. } => WindowHandle::NONE,
            AppState::IncomingCall { notification, .. } => *notification,
            AppState::InCall { call_window, .. } => *call_window,
        }
    }

    /// Whether a transition to `next` would be observable. `entered_at`,
    /// `last_active` and the action list are carried state, not shape.
    fn same_shape(&self, next: &AppState) -> bool {
        match (self, next) {
            (AppState::Normal { focused_app: a, .. }, AppState::Normal { focused_app: b, .. }) => {
                a == b
            }
            (
                AppState::IncomingCall { notification: a, .. },
                AppState::IncomingCall { notification: b, .. },
            ) => a == b,
            (AppState::InCall { call_window: a, .. }, AppState::InCall { call_window: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

/// Read-only view of the coordinator state for the poller, updated on every
/// transition.
#[derive(Clone)]
pub struct StateSnapshot(Arc<Mutex<(Mode, WindowHandle)>>);

impl Default for StateSnapshot {
    fn default() -> Self {
        Self(Arc::new(Mutex::new((Mode::Normal, WindowHandle::NONE))))
    }
}

impl StateSnapshot {
    pub fn read(&self) -> (Mode, WindowHandle) {
        *self.0.lock()
    }

    pub(crate) fn publish(&self, mode: Mode, tracked: WindowHandle) {
        *self.0.lock() = (mode, tracked);
    }
}

pub struct Coordinator {
    config: Config,
    classifier: Arc<WindowClassifier>,
    invoker_tx: invoker::Sender,
    ui_tx: actor::Sender<RenderRequest>,
    snapshot: StateSnapshot,
    state: AppState,
    /// Last ordinary foreground window, surviving call episodes so that
    /// post-call shortcuts still have a target before the next poll.
    remembered_active: WindowHandle,
    /// Bumped for every new background search; stale results are dropped.
    generation: u64,
}

impl Coordinator {
    pub fn new(
        config: Config,
        classifier: Arc<WindowClassifier>,
        invoker_tx: invoker::Sender,
        ui_tx: actor::Sender<RenderRequest>,
        snapshot: StateSnapshot,
    ) -> Self {
        Self {
            config,
            classifier,
            invoker_tx,
            ui_tx,
            snapshot,
            state: AppState::Normal {
                focused_app: String::new(),
                last_active: WindowHandle::NONE,
            },
            remembered_active: WindowHandle::NONE,
            generation: 0,
        }
    }

    /// Runs the event loop on a dedicated thread. Classification happens on
    /// this thread too, so a notification is either fully admitted or fully
    /// ignored before the next event is looked at.
    pub fn spawn(self, mut events_rx: Receiver) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let mut this = self;
            while let Some((span, event)) = events_rx.blocking_recv() {
                let _g = span.enter();
                if let Event::Shutdown = event {
                    info!("coordinator shutting down");
                    break;
                }
                this.handle_event(event);
            }
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::NotificationShown(window) => self.on_notification_shown(window),
            Event::NotificationHidden(window) => self.on_notification_hidden(window),
            Event::FocusObserved { window, process } => self.on_focus_observed(window, process),
            Event::ActiveCallObserved(window) => self.on_active_call_observed(window),
            Event::NotificationGone => self.on_notification_gone(),
            Event::InvokeAction(action) => self.on_invoke_action(action),
            Event::InvokeBinding(binding) => self.on_invoke_binding(binding),
            Event::ActionFinished { action, target, ok } => {
                self.on_action_finished(action, target, ok)
            }
            Event::CallWindowFound { generation, window } => {
                self.on_call_window_found(generation, window)
            }
            Event::SearchExhausted { generation } => self.on_search_exhausted(generation),
            Event::Shutdown => {}
        }
    }

    fn on_notification_shown(&mut self, window: WindowHandle) {
        if self.state.mode() == Mode::IncomingCall {
            debug!(%window, "already tracking a notification, ignoring");
            return;
        }
        match self.classifier.classify(window) {
            WindowClassification::CallNotification { actions } => {
                info!(%window, ?actions, "incoming call detected");
                self.set_state(AppState::IncomingCall { notification: window, actions });
            }
            classification => {
                debug!(%window, ?classification, "shown window is not a call notification");
            }
        }
    }

    fn on_notification_hidden(&mut self, window: WindowHandle) {
        match &self.state {
            AppState::IncomingCall { notification, .. } if *notification == window => {
                info!(%window, "notification dismissed");
                self.to_normal();
            }
            _ => debug!(%window, "hidden window is not the tracked notification"),
        }
    }

    fn on_notification_gone(&mut self) {
        if self.state.mode() == Mode::IncomingCall {
            warn!("tracked notification disappeared without a hide event");
            self.to_normal();
        }
    }

    fn on_focus_observed(&mut self, window: WindowHandle, process: String) {
        match &mut self.state {
            AppState::Normal { focused_app, last_active } => {
                if window.is_none()
                    || process.is_empty()
                    || process.eq_ignore_ascii_case(&self.config.detector.own_process)
                {
                    return;
                }
                *last_active = window;
                self.remembered_active = window;
                if *focused_app != process {
                    debug!(%window, %process, "foreground application changed");
                    *focused_app = process;
                    self.render();
                }
            }
            AppState::IncomingCall { .. } => {
                // Focus churn while the notification is up is noise.
            }
            AppState::InCall { entered_at, .. } => {
                if process.eq_ignore_ascii_case(&self.config.detector.own_process) {
                    return;
                }
                if entered_at.elapsed() < self.config.detector.grace_period() {
                    debug!(%window, %process, "focus change within grace period, staying in call");
                    return;
                }
                info!(%window, %process, "focus left the call, returning to normal");
                self.remembered_active = window;
                self.set_state(AppState::Normal {
                    focused_app: process,
                    last_active: window,
                });
            }
        }
    }

    fn on_active_call_observed(&mut self, window: WindowHandle) {
        match &mut self.state {
            AppState::Normal { .. } => {
                info!(%window, "live call window in foreground, entering call state");
                self.enter_call(window);
            }
            AppState::IncomingCall { .. } => {
                // Only an explicit accept moves us out of the notification.
                debug!(%window, "active call seen while a notification is up, waiting");
            }
            AppState::InCall { call_window, .. } => {
                if *call_window != window {
                    debug!(old = %call_window, new = %window, "call window changed");
                    *call_window = window;
                    self.remembered_active = window;
                    self.snapshot.publish(Mode::InCall, window);
                }
            }
        }
    }

    fn on_invoke_action(&mut self, action: CallAction) {
        let target = self.current_target();
        if target.is_none() {
            error!(%action, "no target window known, dropping action");
            return;
        }
        debug!(%action, %target, "dispatching call action");
        self.invoker_tx.send(invoker::Request::CallAction { action, target });
    }

    fn on_invoke_binding(&mut self, binding: ShortcutBinding) {
        let target = self.current_target();
        if target.is_none() {
            error!(binding = %binding.display_name, "no target window known, dropping shortcut");
            return;
        }
        self.invoker_tx.send(invoker::Request::Binding { binding, target });
    }

    fn on_action_finished(&mut self, action: CallAction, target: WindowHandle, ok: bool) {
        match action {
            CallAction::Decline => {
                if !ok {
                    warn!("decline was not confirmed, leaving the notification state anyway");
                }
                let reacquire = ok && self.config.detector.reacquire_on_decline;
                self.to_normal();
                if reacquire {
                    self.start_search(target);
                }
            }
            CallAction::AcceptVideo | CallAction::AcceptAudio => {
                if !ok {
                    warn!(%action, "accept failed, staying in the current state");
                    return;
                }
                // The notification handle stands in as the call window until
                // the search finds the real one.
                self.enter_call(target);
                self.start_search(target);
            }
            CallAction::ToggleMute | CallAction::ToggleVideo => {
                debug!(%action, ok, "in-call toggle finished");
            }
            CallAction::HangUp => {
                // The poller notices the focus change once the call UI is
                // gone; no eager transition here.
                debug!(ok, "hang-up dispatched, waiting for focus to move on");
            }
        }
    }

    fn on_call_window_found(&mut self, generation: u64, window: WindowHandle) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale search result dropped");
            return;
        }
        match &mut self.state {
            AppState::InCall { call_window, .. } => {
                if *call_window != window {
                    info!(old = %call_window, new = %window, "switched to the live call window");
                    *call_window = window;
                    self.remembered_active = window;
                    self.snapshot.publish(Mode::InCall, window);
                }
            }
            _ => {
                info!(%window, "call window found, entering call state");
                self.enter_call(window);
            }
        }
    }

    fn on_search_exhausted(&mut self, generation: u64) {
        if generation == self.generation {
            warn!("call window search exhausted, keeping the current target");
        } else {
            debug!(generation, "stale search exhaustion dropped");
        }
    }

    /// The window actions and shortcuts are aimed at right now.
    fn current_target(&self) -> WindowHandle {
        match &self.state {
            AppState::Normal { last_active, .. } => *last_active,
            AppState::IncomingCall { notification, .. } => *notification,
            AppState::InCall { call_window, .. } => *call_window,
        }
    }

    fn enter_call(&mut self, window: WindowHandle) {
        self.set_state(AppState::InCall {
            call_window: window,
            entered_at: Instant::now(),
        });
    }

    fn start_search(&mut self, old: WindowHandle) {
        self.generation += 1;
        self.invoker_tx.send(invoker::Request::Reacquire {
            generation: self.generation,
            old,
        });
    }

    /// Back to Normal with the pre-call active window as target. The focused
    /// app is left blank so the next poll re-renders the grid.
    fn to_normal(&mut self) {
        self.set_state(AppState::Normal {
            focused_app: String::new(),
            last_active: self.remembered_active,
        });
    }

    fn set_state(&mut self, next: AppState) {
        if self.state.same_shape(&next) {
            debug!(mode = ?next.mode(), "state unchanged");
            self.state = next;
            return;
        }
        info!(from = ?self.state.mode(), to = ?next.mode(), "state transition");
        self.state = next;
        self.snapshot.publish(self.state.mode(), self.state.tracked());
        self.render();
    }

    fn render(&self) {
        let request = match &self.state {
            AppState::Normal { focused_app, .. } => RenderRequest::Normal {
                app: focused_app.clone(),
                bindings: self.config.bindings_for(focused_app).to_vec(),
            },
            AppState::IncomingCall { actions, .. } => RenderRequest::IncomingCall {
                actions: actions.clone(),
            },
            AppState::InCall { .. } => RenderRequest::InCall,
        };
        self.ui_tx.send(request);
    }
}
