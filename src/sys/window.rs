//! Capability seams between the coordination engine and the OS window layer.
//!
//! Everything the engine knows about windows flows through the traits in this
//! module so the state machine can be driven in tests without real windows.

use thiserror::Error;

/// Opaque identifier for an OS top-level window.
///
/// The zero value is the "no window" sentinel, mirroring a null HWND.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(u64);

impl WindowHandle {
    pub const NONE: WindowHandle = WindowHandle(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            write!(f, "0x{:x}", self.0)
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Error)]
pub enum SysError {
    #[error("window {0} is gone")]
    WindowGone(WindowHandle),
    #[error("accessibility tree walk failed: {0}")]
    AxFailure(String),
}

pub type Result<T> = std::result::Result<T, SysError>;

/// Basic window-server operations.
pub trait WindowOps: Send + Sync {
    /// The window currently receiving keyboard input, or `NONE`.
    fn foreground_window(&self) -> WindowHandle;

    fn is_visible(&self, window: WindowHandle) -> bool;

    /// Resolve the owning process name. `None` when the window or its
    /// process is gone; callers treat that as an empty name (fail-open).
    fn process_name(&self, window: WindowHandle) -> Option<String>;

    fn frame(&self, window: WindowHandle) -> Option<Rect>;

    /// Bring the window to the foreground. The return value is advisory;
    /// the OS call is known to report spurious failures.
    fn raise(&self, window: WindowHandle) -> bool;

    /// Re-assert the window above all others without activating it.
    fn keep_above(&self, window: WindowHandle);

    /// Top-level windows of every process with the given name.
    fn windows_of_process(&self, process: &str) -> Vec<WindowHandle>;
}

/// Accessibility-tree inspection of a single window.
pub trait AccessibilityOps: Send + Sync {
    /// Accessible names of all button-like descendants. Individual stale
    /// elements are skipped; the error covers total scan failure only.
    fn button_names(&self, window: WindowHandle) -> Result<Vec<String>>;

    /// Find the first button whose accessible name contains any of `names`
    /// (case-insensitive) and invoke it. Returns false when no matching,
    /// invocable element exists.
    fn press_button(&self, window: WindowHandle, names: &[String]) -> bool;
}

/// Synthetic keystroke primitive, treated as a black box.
pub trait KeyInjector: Send + Sync {
    /// Deliver the key sequence described by `format` (SendKeys-style
    /// notation, e.g. `^+a`) to the target window's application.
    fn send(&self, target: WindowHandle, format: &str) -> bool;
}
