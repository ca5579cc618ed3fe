//! Bridges raw window lifecycle notifications from the OS hook into
//! coordinator events, keeping only windows of the notification class.

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

use super::coordinator::{self, Event};
use crate::sys::window::WindowHandle;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RawKind {
    Shown,
    Hidden,
}

/// A window appeared or went away, as reported by the platform hook before
/// any filtering.
#[derive(Clone, Debug)]
pub struct RawWindowEvent {
    pub kind: RawKind,
    pub window: WindowHandle,
    pub class: String,
}

pub struct WindowNotify {
    events_tx: coordinator::Sender,
    raw_rx: Option<UnboundedReceiver<RawWindowEvent>>,
    notification_class: String,
}

impl WindowNotify {
    pub fn new(
        events_tx: coordinator::Sender,
        raw_rx: UnboundedReceiver<RawWindowEvent>,
        notification_class: String,
    ) -> Self {
        Self {
            events_tx,
            raw_rx: Some(raw_rx),
            notification_class,
        }
    }

    pub async fn run(mut self) {
        let mut raw_rx = match self.raw_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        while let Some(raw) = raw_rx.recv().await {
            if raw.class != self.notification_class {
                trace!(window = %raw.window, class = %raw.class, "uninteresting window class");
                continue;
            }
            debug!(window = %raw.window, kind = ?raw.kind, "notification-class window event");
            let event = match raw.kind {
                RawKind::Shown => Event::NotificationShown(raw.window),
                RawKind::Hidden => Event::NotificationHidden(raw.window),
            };
            self.events_tx.send(event);
        }
        debug!("WindowNotify actor exiting");
    }
}
