//! Executes semantic actions against a target window and runs the bounded
//! background search that re-acquires the call window after an accept.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::coordinator::{self, Event};
use crate::classify::{CallAction, WindowClassifier};
use crate::common::config::{CallKeySettings, InvokerSettings, KeywordSettings, ShortcutBinding};
use crate::sys::window::{AccessibilityOps, KeyInjector, WindowHandle, WindowOps};

#[derive(Debug)]
pub enum Request {
    /// Invoke a call-control action; completion is reported back as an
    /// `ActionFinished` event.
    CallAction {
        action: CallAction,
        target: WindowHandle,
    },
    /// Inject a configured shortcut; fire-and-forget.
    Binding {
        binding: ShortcutBinding,
        target: WindowHandle,
    },
    /// Start the call-window search, cancelling any search in flight.
    Reacquire { generation: u64, old: WindowHandle },
    Stop,
}

pub type Sender = crate::actor::Sender<Request>;
pub type Receiver = crate::actor::Receiver<Request>;

pub struct ActionInvoker {
    events_tx: coordinator::Sender,
    requests_rx: Option<Receiver>,
    ops: Arc<dyn WindowOps>,
    ax: Arc<dyn AccessibilityOps>,
    keys: Arc<dyn KeyInjector>,
    classifier: Arc<WindowClassifier>,
    keywords: KeywordSettings,
    call_keys: CallKeySettings,
    settings: InvokerSettings,
    process_name: String,
    search: Option<CancellationToken>,
}

impl ActionInvoker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events_tx: coordinator::Sender,
        requests_rx: Receiver,
        ops: Arc<dyn WindowOps>,
        ax: Arc<dyn AccessibilityOps>,
        keys: Arc<dyn KeyInjector>,
        classifier: Arc<WindowClassifier>,
        keywords: KeywordSettings,
        call_keys: CallKeySettings,
        settings: InvokerSettings,
        process_name: String,
    ) -> Self {
        Self {
            events_tx,
            requests_rx: Some(requests_rx),
            ops,
            ax,
            keys,
            classifier,
            keywords,
            call_keys,
            settings,
            process_name,
            search: None,
        }
    }

    pub async fn run(mut self) {
        let mut requests_rx = match self.requests_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        while let Some((span, request)) = requests_rx.recv().await {
            if let Request::Stop = request {
                let _g = span.enter();
                debug!("received Stop request");
                break;
            }
            self.handle_request(request).instrument(span).await;
        }

        if let Some(token) = self.search.take() {
            token.cancel();
        }
        debug!("ActionInvoker actor exiting");
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::CallAction { action, target } => {
                if target.is_none() {
                    error!(%action, "no target window, action not dispatched");
                    return;
                }
                let ok = self.invoke_call_action(action, target).await;
                self.events_tx.send(Event::ActionFinished { action, target, ok });
            }
            Request::Binding { binding, target } => {
                if target.is_none() {
                    error!(binding = %binding.display_name, "no target window, keys not sent");
                    return;
                }
                self.raise_and_settle(target).await;
                if self.keys.send(target, &binding.keys) {
                    info!(binding = %binding.display_name, %target, "shortcut sent");
                } else {
                    warn!(binding = %binding.display_name, %target, "shortcut injection failed");
                }
            }
            Request::Reacquire { generation, old } => self.start_search(generation, old),
            Request::Stop => {}
        }
    }

    async fn raise_and_settle(&self, target: WindowHandle) {
        // The OS foreground call is known to report failure even when the
        // window is already frontmost, so the result is advisory only.
        if !self.ops.raise(target) {
            debug!(%target, "foreground switch reported failure, continuing anyway");
        }
        sleep(self.settings.settle()).await;
    }

    async fn invoke_call_action(&self, action: CallAction, target: WindowHandle) -> bool {
        self.raise_and_settle(target).await;

        let names = self.classifier.policy().name_variants(action, &self.keywords);
        if self.ax.press_button(target, &names) {
            info!(%action, %target, "button invoked via accessibility lookup");
            return true;
        }

        let format = self.call_keys.format_for(action);
        warn!(%action, %target, "no invocable button found, falling back to keystroke {format}");
        self.keys.send(target, format)
    }

    /// Spawns the bounded call-window search. A fresh search cancels the
    /// previous one; the coordinator drops stale results by generation.
    fn start_search(&mut self, generation: u64, old: WindowHandle) {
        if let Some(token) = self.search.take() {
            debug!("cancelling in-flight call window search");
            token.cancel();
        }
        let token = CancellationToken::new();
        self.search = Some(token.clone());

        let ops = self.ops.clone();
        let classifier = self.classifier.clone();
        let events_tx = self.events_tx.clone();
        let process = self.process_name.clone();
        let attempts = self.settings.search_attempts;
        let interval = self.settings.search_interval();

        tokio::spawn(async move {
            info!(generation, %old, "searching for the live call window");
            for attempt in 0..attempts {
                for candidate in ops.windows_of_process(&process) {
                    if candidate.is_none() || candidate == old {
                        continue;
                    }
                    if classifier.is_call_window(candidate) {
                        info!(%candidate, attempt, "call window re-acquired");
                        ops.raise(candidate);
                        events_tx.send(Event::CallWindowFound { generation, window: candidate });
                        return;
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(generation, "call window search cancelled");
                        return;
                    }
                    _ = sleep(interval) => {}
                }
            }
            warn!(generation, "call window search exhausted after {attempts} attempts");
            events_tx.send(Event::SearchExhausted { generation });
        });
    }
}
