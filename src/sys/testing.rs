//! Fake capability implementations for driving the engine in tests.

use parking_lot::Mutex;

use crate::common::collections::{HashMap, HashSet};
use crate::sys::window::{
    AccessibilityOps, KeyInjector, Rect, Result, SysError, WindowHandle, WindowOps,
};

#[derive(Clone)]
struct FakeWindow {
    process: String,
    frame: Rect,
    visible: bool,
}

struct WindowsInner {
    windows: HashMap<WindowHandle, FakeWindow>,
    foreground: WindowHandle,
    raises: Vec<WindowHandle>,
    keep_above: Vec<WindowHandle>,
    raise_ok: bool,
}

pub struct FakeWindows {
    inner: Mutex<WindowsInner>,
}

impl Default for FakeWindows {
    fn default() -> Self {
        Self {
            inner: Mutex::new(WindowsInner {
                windows: HashMap::default(),
                foreground: WindowHandle::NONE,
                raises: Vec::new(),
                keep_above: Vec::new(),
                raise_ok: true,
            }),
        }
    }
}

impl FakeWindows {
    pub fn add_window(&self, window: WindowHandle, process: &str, frame: Rect) {
        self.inner.lock().windows.insert(window, FakeWindow {
            process: process.to_string(),
            frame,
            visible: true,
        });
    }

    pub fn remove_window(&self, window: WindowHandle) {
        let mut inner = self.inner.lock();
        inner.windows.remove(&window);
        if inner.foreground == window {
            inner.foreground = WindowHandle::NONE;
        }
    }

    pub fn set_visible(&self, window: WindowHandle, visible: bool) {
        if let Some(w) = self.inner.lock().windows.get_mut(&window) {
            w.visible = visible;
        }
    }

    pub fn set_foreground(&self, window: WindowHandle) {
        self.inner.lock().foreground = window;
    }

    pub fn fail_raises(&self) {
        self.inner.lock().raise_ok = false;
    }

    pub fn raises(&self) -> Vec<WindowHandle> {
        self.inner.lock().raises.clone()
    }

    pub fn keep_above_calls(&self) -> Vec<WindowHandle> {
        self.inner.lock().keep_above.clone()
    }
}

impl WindowOps for FakeWindows {
    fn foreground_window(&self) -> WindowHandle {
        self.inner.lock().foreground
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.inner.lock().windows.get(&window).map(|w| w.visible).unwrap_or(false)
    }

    fn process_name(&self, window: WindowHandle) -> Option<String> {
        self.inner.lock().windows.get(&window).map(|w| w.process.clone())
    }

    fn frame(&self, window: WindowHandle) -> Option<Rect> {
        self.inner.lock().windows.get(&window).map(|w| w.frame)
    }

    fn raise(&self, window: WindowHandle) -> bool {
        let mut inner = self.inner.lock();
        inner.raises.push(window);
        inner.raise_ok
    }

    fn keep_above(&self, window: WindowHandle) {
        self.inner.lock().keep_above.push(window);
    }

    fn windows_of_process(&self, process: &str) -> Vec<WindowHandle> {
        let inner = self.inner.lock();
        let mut handles: Vec<WindowHandle> = inner
            .windows
            .iter()
            .filter(|(_, w)| w.process.eq_ignore_ascii_case(process))
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort();
        handles
    }
}

#[derive(Default)]
struct AxInner {
    buttons: HashMap<WindowHandle, Vec<String>>,
    failing: HashSet<WindowHandle>,
    uninvocable: HashSet<WindowHandle>,
    scans: usize,
    presses: Vec<(WindowHandle, String)>,
}

#[derive(Default)]
pub struct FakeAx {
    inner: Mutex<AxInner>,
}

impl FakeAx {
    pub fn set_buttons(&self, window: WindowHandle, names: &[&str]) {
        self.inner
            .lock()
            .buttons
            .insert(window, names.iter().map(|n| n.to_string()).collect());
    }

    pub fn fail_scans(&self, window: WindowHandle) {
        self.inner.lock().failing.insert(window);
    }

    /// Buttons of this window exist but do not support being pressed.
    pub fn make_uninvocable(&self, window: WindowHandle) {
        self.inner.lock().uninvocable.insert(window);
    }

    pub fn scan_count(&self) -> usize {
        self.inner.lock().scans
    }

    pub fn presses(&self) -> Vec<(WindowHandle, String)> {
        self.inner.lock().presses.clone()
    }
}

impl AccessibilityOps for FakeAx {
    fn button_names(&self, window: WindowHandle) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.scans += 1;
        if inner.failing.contains(&window) {
            return Err(SysError::AxFailure("element is stale".to_string()));
        }
        Ok(inner.buttons.get(&window).cloned().unwrap_or_default())
    }

    fn press_button(&self, window: WindowHandle, names: &[String]) -> bool {
        let mut inner = self.inner.lock();
        if inner.failing.contains(&window) || inner.uninvocable.contains(&window) {
            return false;
        }
        let Some(buttons) = inner.buttons.get(&window) else {
            return false;
        };
        let hit = buttons.iter().find(|button| {
            let button = button.to_lowercase();
            names.iter().any(|name| button.contains(&name.to_lowercase()))
        });
        match hit {
            Some(name) => {
                let name = name.clone();
                inner.presses.push((window, name));
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct FakeInjector {
    sent: Mutex<Vec<(WindowHandle, String)>>,
}

impl FakeInjector {
    pub fn sent(&self) -> Vec<(WindowHandle, String)> {
        self.sent.lock().clone()
    }
}

impl KeyInjector for FakeInjector {
    fn send(&self, target: WindowHandle, format: &str) -> bool {
        self.sent.lock().push((target, format.to_string()));
        !target.is_none()
    }
}
