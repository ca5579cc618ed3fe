//! Window classification over the accessibility tree.
//!
//! Classification is recomputed on demand and never cached: the same window
//! can be an ordinary Teams window one moment and an in-call window the next.

use std::sync::Arc;

use strum_macros::Display;
use tracing::{debug, trace};

use crate::common::config::KeywordSettings;
use crate::sys::window::{AccessibilityOps, WindowHandle, WindowOps};

/// Semantic call-control actions surfaced on the button grid.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum CallAction {
    AcceptVideo,
    AcceptAudio,
    Decline,
    ToggleMute,
    ToggleVideo,
    HangUp,
}

impl CallAction {
    pub fn is_accept(self) -> bool {
        matches!(self, CallAction::AcceptVideo | CallAction::AcceptAudio)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WindowClassification {
    Ordinary { process: String },
    CallNotification { actions: Vec<CallAction> },
    ActiveCall,
}

/// Lowercased keyword sets ready for substring matching.
#[derive(Clone, Debug)]
pub struct KeywordPolicy {
    video_accept: Vec<String>,
    audio_accept: Vec<String>,
    decline: Vec<String>,
    in_call: Vec<String>,
}

impl KeywordPolicy {
    pub fn new(settings: &KeywordSettings) -> Self {
        let lower = |set: &[String]| set.iter().map(|kw| kw.to_lowercase()).collect();
        Self {
            video_accept: lower(&settings.video_accept),
            audio_accept: lower(&settings.audio_accept),
            decline: lower(&settings.decline),
            in_call: lower(&settings.in_call),
        }
    }

    fn matches(set: &[String], name: &str) -> bool {
        let name = name.to_lowercase();
        set.iter().any(|kw| name.contains(kw))
    }

    pub fn is_in_call_name(&self, name: &str) -> bool {
        Self::matches(&self.in_call, name)
    }

    /// The call action a button with this accessible name stands for.
    ///
    /// The most specific set wins: "Accept with video" must not also count
    /// as an audio accept even though it contains the bare "Accept" keyword.
    pub fn action_for_name(&self, name: &str) -> Option<CallAction> {
        let sets = [
            (CallAction::AcceptVideo, &self.video_accept),
            (CallAction::AcceptAudio, &self.audio_accept),
            (CallAction::Decline, &self.decline),
        ];
        let name = name.to_lowercase();
        sets.into_iter()
            .find(|(_, set)| set.iter().any(|kw| name.contains(kw)))
            .map(|(action, _)| action)
    }

    /// Accessible-name variants to look for when pressing a button for
    /// `action` (all known locale/product spellings).
    pub fn name_variants(&self, action: CallAction, settings: &KeywordSettings) -> Vec<String> {
        match action {
            CallAction::AcceptVideo => settings.video_accept.clone(),
            CallAction::AcceptAudio => settings.audio_accept.clone(),
            CallAction::Decline => settings.decline.clone(),
            // In-call controls are driven by keystrokes, but a best-effort
            // name list still allows the capability path to work.
            CallAction::ToggleMute | CallAction::ToggleVideo | CallAction::HangUp => {
                settings.in_call.clone()
            }
        }
    }
}

pub struct WindowClassifier {
    ops: Arc<dyn WindowOps>,
    ax: Arc<dyn AccessibilityOps>,
    policy: KeywordPolicy,
    process_name: String,
    min_notification_width: f64,
}

impl WindowClassifier {
    pub fn new(
        ops: Arc<dyn WindowOps>,
        ax: Arc<dyn AccessibilityOps>,
        policy: KeywordPolicy,
        process_name: String,
        min_notification_width: f64,
    ) -> Self {
        Self {
            ops,
            ax,
            policy,
            process_name,
            min_notification_width,
        }
    }

    pub fn policy(&self) -> &KeywordPolicy {
        &self.policy
    }

    /// Classifies a window. Never fails: any resolution or scan error
    /// degrades to `Ordinary`.
    pub fn classify(&self, window: WindowHandle) -> WindowClassification {
        let process = self.ops.process_name(window).unwrap_or_default();
        if !process.eq_ignore_ascii_case(&self.process_name) {
            return WindowClassification::Ordinary { process };
        }

        // Cheap geometry gate before the expensive accessibility walk.
        let wide_enough = self
            .ops
            .frame(window)
            .map(|frame| frame.width > self.min_notification_width)
            .unwrap_or(false);
        if !wide_enough {
            trace!(%window, "below notification width threshold, skipping scan");
            return WindowClassification::Ordinary { process };
        }

        let names = match self.ax.button_names(window) {
            Ok(names) => names,
            Err(err) => {
                debug!(%window, %err, "accessibility scan failed, treating as ordinary");
                return WindowClassification::Ordinary { process };
            }
        };

        let mut actions = Vec::new();
        for name in &names {
            if self.policy.is_in_call_name(name) {
                return WindowClassification::ActiveCall;
            }
            if let Some(action) = self.policy.action_for_name(name) {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }

        if actions.is_empty() {
            WindowClassification::Ordinary { process }
        } else {
            WindowClassification::CallNotification { actions }
        }
    }

    /// The in-call heuristic: does this window belong to the conferencing
    /// process and expose any in-call control? Used by the poller and the
    /// re-acquisition search; no geometry gate, matching full call windows
    /// of any size.
    pub fn is_call_window(&self, window: WindowHandle) -> bool {
        if window.is_none() {
            return false;
        }
        let process = self.ops.process_name(window).unwrap_or_default();
        if !process.eq_ignore_ascii_case(&self.process_name) {
            return false;
        }
        match self.ax.button_names(window) {
            Ok(names) => names.iter().any(|name| self.policy.is_in_call_name(name)),
            Err(err) => {
                debug!(%window, %err, "in-call scan failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::sys::testing::{FakeAx, FakeWindows};
    use crate::sys::window::Rect;

    fn classifier(ops: Arc<FakeWindows>, ax: Arc<FakeAx>) -> WindowClassifier {
        let keywords = KeywordSettings::default();
        WindowClassifier::new(ops, ax, KeywordPolicy::new(&keywords), "ms-teams".into(), 300.0)
    }

    fn wide() -> Rect {
        Rect { x: 0.0, y: 0.0, width: 400.0, height: 200.0 }
    }

    #[test]
    fn accept_and_decline_names_yield_call_notification() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", wide());
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["Accept with video", "Decline"]);

        let classification = classifier(ops, ax).classify(w);
        assert_eq!(
            classification,
            WindowClassification::CallNotification {
                actions: vec![CallAction::AcceptVideo, CallAction::Decline],
            }
        );
    }

    #[test]
    fn empty_scan_is_ordinary() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", wide());
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &[]);

        assert_eq!(
            classifier(ops, ax).classify(w),
            WindowClassification::Ordinary { process: "ms-teams".into() }
        );
    }

    #[test]
    fn keyword_matching_is_case_insensitive_substring() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", wide());
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["DECLINE CALL (Ctrl+Shift+D)"]);

        assert_eq!(
            classifier(ops, ax).classify(w),
            WindowClassification::CallNotification { actions: vec![CallAction::Decline] }
        );
    }

    #[test]
    fn narrow_window_skips_the_scan() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", Rect { x: 0.0, y: 0.0, width: 299.0, height: 80.0 });
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["Accept with video"]);

        let classification = classifier(ops, ax.clone()).classify(w);
        assert_eq!(
            classification,
            WindowClassification::Ordinary { process: "ms-teams".into() }
        );
        assert_eq!(ax.scan_count(), 0);
    }

    #[test]
    fn foreign_process_is_ordinary_without_scan() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "chrome", wide());
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["Mute"]);

        let classification = classifier(ops, ax.clone()).classify(w);
        assert_eq!(classification, WindowClassification::Ordinary { process: "chrome".into() });
        assert_eq!(ax.scan_count(), 0);
    }

    #[test]
    fn unknown_window_fails_open() {
        let ops = Arc::new(FakeWindows::default());
        let ax = Arc::new(FakeAx::default());
        assert_eq!(
            classifier(ops, ax).classify(WindowHandle::new(99)),
            WindowClassification::Ordinary { process: String::new() }
        );
    }

    #[test]
    fn scan_failure_degrades_to_ordinary() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", wide());
        let ax = Arc::new(FakeAx::default());
        ax.fail_scans(w);

        assert_eq!(
            classifier(ops, ax).classify(w),
            WindowClassification::Ordinary { process: "ms-teams".into() }
        );
    }

    #[test]
    fn in_call_keyword_wins_over_accept_buttons() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", wide());
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["Mute", "Accept"]);

        assert_eq!(classifier(ops, ax).classify(w), WindowClassification::ActiveCall);
    }

    #[test]
    fn is_call_window_ignores_geometry() {
        let w = WindowHandle::new(7);
        let ops = Arc::new(FakeWindows::default());
        ops.add_window(w, "ms-teams", Rect { x: 0.0, y: 0.0, width: 200.0, height: 80.0 });
        let ax = Arc::new(FakeAx::default());
        ax.set_buttons(w, &["Hang up"]);

        assert!(classifier(ops, ax).is_call_window(w));
    }

    #[test]
    fn is_call_window_rejects_sentinel() {
        let ops = Arc::new(FakeWindows::default());
        let ax = Arc::new(FakeAx::default());
        assert!(!classifier(ops, ax).is_call_window(WindowHandle::NONE));
    }
}
