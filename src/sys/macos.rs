//! macOS implementations of the platform capabilities.
//!
//! Window handles are window server ids, which stay stable across repeated
//! accessibility lookups; the registry maps them back to live AX elements.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use objc2_app_kit::{NSRunningApplication, NSWorkspace};
use objc2_core_foundation::{CFRunLoop, CFRunLoopMode, kCFRunLoopDefaultMode};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use crate::actor::window_notify::{RawKind, RawWindowEvent};
use crate::common::collections::HashMap;
use crate::sys::axuielement::{AX_BUTTON_ROLE, AXUIElement, pid_t};
use crate::sys::observer::Observer;
use crate::sys::window::{
    AccessibilityOps, KeyInjector, Rect, Result, SysError, WindowHandle, WindowOps,
};

/// AX element retained for cross-thread use. The AX client API serializes
/// calls through the accessibility server, so sharing elements between
/// threads is sound even though the CF type is not marked Send.
struct SharedElement(AXUIElement);

unsafe impl Send for SharedElement {}
unsafe impl Sync for SharedElement {}

pub struct MacPlatform {
    registry: Mutex<HashMap<WindowHandle, SharedElement>>,
}

impl Default for MacPlatform {
    fn default() -> Self {
        Self { registry: Mutex::new(HashMap::default()) }
    }
}

impl MacPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a window element and returns its stable handle, or `None`
    /// for elements that are not windows (or are already gone).
    pub fn register(&self, element: &AXUIElement) -> Option<WindowHandle> {
        let wid = element.window_id().ok()?;
        let handle = WindowHandle::new(wid as u64);
        self.registry.lock().insert(handle, SharedElement(element.clone()));
        Some(handle)
    }

    pub fn forget(&self, handle: WindowHandle) {
        self.registry.lock().remove(&handle);
    }

    fn element_for(&self, handle: WindowHandle) -> Option<AXUIElement> {
        self.registry.lock().get(&handle).map(|shared| shared.0.clone())
    }
}

fn app_matches(app: &NSRunningApplication, name: &str) -> bool {
    let name = name.to_lowercase();
    if let Some(localized) = app.localizedName() {
        if localized.to_string().to_lowercase().contains(&name) {
            return true;
        }
    }
    if let Some(bundle) = app.bundleIdentifier() {
        if bundle.to_string().to_lowercase().contains(&name) {
            return true;
        }
    }
    false
}

fn pid_of_process(name: &str) -> Option<pid_t> {
    NSWorkspace::sharedWorkspace()
        .runningApplications()
        .into_iter()
        .find(|app| app_matches(app, name))
        .map(|app| app.processIdentifier())
}

impl WindowOps for MacPlatform {
    fn foreground_window(&self) -> WindowHandle {
        let Some(app) = NSWorkspace::sharedWorkspace().frontmostApplication() else {
            return WindowHandle::NONE;
        };
        let element = AXUIElement::application(app.processIdentifier());
        match element.focused_window() {
            Ok(window) => self.register(&window).unwrap_or(WindowHandle::NONE),
            Err(err) => {
                trace!(%err, "no focused window for frontmost app");
                WindowHandle::NONE
            }
        }
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        let Some(element) = self.element_for(window) else {
            return false;
        };
        // A dead element fails every attribute query.
        match element.role() {
            Ok(_) => !element.minimized().unwrap_or(false),
            Err(_) => false,
        }
    }

    fn process_name(&self, window: WindowHandle) -> Option<String> {
        let element = self.element_for(window)?;
        let pid = element.pid().ok()?;
        let app = NSRunningApplication::runningApplicationWithProcessIdentifier(pid)?;
        app.localizedName().map(|name| name.to_string())
    }

    fn frame(&self, window: WindowHandle) -> Option<Rect> {
        let element = self.element_for(window)?;
        let frame = element.frame().ok()?;
        Some(Rect {
            x: frame.origin.x,
            y: frame.origin.y,
            width: frame.size.width,
            height: frame.size.height,
        })
    }

    fn raise(&self, window: WindowHandle) -> bool {
        let Some(element) = self.element_for(window) else {
            return false;
        };
        let raised = match element.raise() {
            Ok(()) => true,
            Err(err) => {
                debug!(%window, %err, "AXRaise failed");
                false
            }
        };
        let activated = element
            .pid()
            .ok()
            .and_then(NSRunningApplication::runningApplicationWithProcessIdentifier)
            .map(|app| app.activate())
            .unwrap_or(false);
        raised && activated
    }

    fn keep_above(&self, window: WindowHandle) {
        if let Some(element) = self.element_for(window) {
            let _ = element.raise();
        }
    }

    fn windows_of_process(&self, process: &str) -> Vec<WindowHandle> {
        let Some(pid) = pid_of_process(process) else {
            return Vec::new();
        };
        let app = AXUIElement::application(pid);
        match app.windows() {
            Ok(windows) => {
                windows.iter().filter_map(|window| self.register(window)).collect()
            }
            Err(err) => {
                debug!(%process, %err, "window enumeration failed");
                Vec::new()
            }
        }
    }
}

/// Breadth cap for the accessibility walk; call UIs sit well within it.
const MAX_WALK: usize = 4096;

fn collect_buttons(root: &AXUIElement) -> Vec<AXUIElement> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    let mut visited = 0usize;
    while let Some(element) = stack.pop() {
        visited += 1;
        if visited > MAX_WALK {
            warn!("accessibility walk truncated");
            break;
        }
        if let Ok(role) = element.role() {
            if role == AX_BUTTON_ROLE {
                out.push(element);
                continue;
            }
        }
        if let Ok(children) = element.children() {
            stack.extend(children);
        }
    }
    out
}

fn button_name(button: &AXUIElement) -> Option<String> {
    button
        .title()
        .ok()
        .filter(|title| !title.is_empty())
        .or_else(|| button.description().ok().filter(|desc| !desc.is_empty()))
}

impl AccessibilityOps for MacPlatform {
    fn button_names(&self, window: WindowHandle) -> Result<Vec<String>> {
        let element = self.element_for(window).ok_or(SysError::WindowGone(window))?;
        if let Err(err) = element.role() {
            return Err(SysError::AxFailure(err.to_string()));
        }
        Ok(collect_buttons(&element).iter().filter_map(button_name).collect())
    }

    fn press_button(&self, window: WindowHandle, names: &[String]) -> bool {
        let Some(element) = self.element_for(window) else {
            return false;
        };
        let wanted: Vec<String> = names.iter().map(|name| name.to_lowercase()).collect();
        for button in collect_buttons(&element) {
            let Some(name) = button_name(&button) else {
                continue;
            };
            let name = name.to_lowercase();
            if !wanted.iter().any(|wanted| name.contains(wanted)) {
                continue;
            }
            if !button.enabled().unwrap_or(true) {
                debug!(%window, %name, "matching button is disabled");
                continue;
            }
            match button.press() {
                Ok(()) => return true,
                Err(err) => debug!(%window, %name, %err, "AXPress failed"),
            }
        }
        false
    }
}

struct Chord {
    keycode: u16,
    flags: u64,
}

// CGEventFlags masks.
const FLAG_SHIFT: u64 = 0x0002_0000;
const FLAG_OPTION: u64 = 0x0008_0000;
const FLAG_COMMAND: u64 = 0x0010_0000;

fn keycode_for_char(ch: char) -> Option<u16> {
    // ANSI virtual keycodes.
    Some(match ch.to_ascii_lowercase() {
        'a' => 0,
        's' => 1,
        'd' => 2,
        'f' => 3,
        'h' => 4,
        'g' => 5,
        'z' => 6,
        'x' => 7,
        'c' => 8,
        'v' => 9,
        'b' => 11,
        'q' => 12,
        'w' => 13,
        'e' => 14,
        'r' => 15,
        'y' => 16,
        't' => 17,
        '1' => 18,
        '2' => 19,
        '3' => 20,
        '4' => 21,
        '6' => 22,
        '5' => 23,
        '=' => 24,
        '9' => 25,
        '7' => 26,
        '-' => 27,
        '8' => 28,
        '0' => 29,
        ']' => 30,
        'o' => 31,
        'u' => 32,
        '[' => 33,
        'i' => 34,
        'p' => 35,
        'l' => 37,
        'j' => 38,
        '\'' => 39,
        'k' => 40,
        ';' => 41,
        '\\' => 42,
        ',' => 43,
        '/' => 44,
        'n' => 45,
        'm' => 46,
        '.' => 47,
        ' ' => 49,
        _ => return None,
    })
}

fn keycode_for_named(name: &str) -> Option<u16> {
    Some(match name.to_ascii_uppercase().as_str() {
        "ENTER" | "RETURN" => 36,
        "TAB" => 48,
        "ESC" | "ESCAPE" => 53,
        "LEFT" => 123,
        "RIGHT" => 124,
        "DOWN" => 125,
        "UP" => 126,
        "F1" => 122,
        "F2" => 120,
        "F3" => 99,
        "F4" => 118,
        "F5" => 96,
        "F6" => 97,
        "F7" => 98,
        "F8" => 100,
        _ => return None,
    })
}

/// Parses a SendKeys-style sequence ("^+s", "{F5}", "%{LEFT}") into key
/// chords. The caret prefix is the primary shortcut modifier, which is
/// Command on this platform; "%" is Option and "+" is Shift.
fn parse_sendkeys(format: &str) -> Option<Vec<Chord>> {
    let mut chords = Vec::new();
    let mut flags = 0u64;
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '^' => flags |= FLAG_COMMAND,
            '+' => flags |= FLAG_SHIFT,
            '%' => flags |= FLAG_OPTION,
            '{' => {
                let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let keycode = keycode_for_named(&name)?;
                chords.push(Chord { keycode, flags });
                flags = 0;
            }
            ch => {
                let keycode = keycode_for_char(ch)?;
                chords.push(Chord { keycode, flags });
                flags = 0;
            }
        }
    }
    if chords.is_empty() { None } else { Some(chords) }
}

// kCGHIDEventTap
const HID_EVENT_TAP: u32 = 0;

fn post_chord(chord: &Chord) -> bool {
    unsafe {
        let down = CGEventCreateKeyboardEvent(ptr::null_mut(), chord.keycode, true);
        if down.is_null() {
            return false;
        }
        CGEventSetFlags(down, chord.flags);
        CGEventPost(HID_EVENT_TAP, down);
        CFRelease(down);

        let up = CGEventCreateKeyboardEvent(ptr::null_mut(), chord.keycode, false);
        if up.is_null() {
            return false;
        }
        CGEventSetFlags(up, chord.flags);
        CGEventPost(HID_EVENT_TAP, up);
        CFRelease(up);
    }
    true
}

impl KeyInjector for MacPlatform {
    fn send(&self, target: WindowHandle, format: &str) -> bool {
        if target.is_none() {
            return false;
        }
        let Some(chords) = parse_sendkeys(format) else {
            warn!(%format, "unparseable key sequence");
            return false;
        };
        // Events go to the focused window; the invoker raises the target
        // before injecting.
        chords.iter().all(post_chord)
    }
}

const WINDOW_CREATED: &str = "AXWindowCreated";
const ELEMENT_DESTROYED: &str = "AXUIElementDestroyed";

/// Watches the conferencing process for window lifecycle events and feeds
/// them to the engine.
///
/// Window classes are a foreign concept here; the per-process hook already
/// narrows events to the conferencing app, so every event carries the
/// configured notification class and classification does the real filtering.
pub fn spawn_window_monitor(
    platform: Arc<MacPlatform>,
    raw_tx: UnboundedSender<RawWindowEvent>,
    process_name: String,
    notification_class: String,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            let Some(pid) = pid_of_process(&process_name) else {
                trace!(%process_name, "process not running");
                std::thread::sleep(Duration::from_secs(2));
                continue;
            };
            info!(pid, %process_name, "watching for window events");
            if let Err(err) = watch_app(&platform, &raw_tx, pid, &notification_class) {
                warn!(pid, %err, "window monitor stopped, will re-attach");
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    })
}

fn watch_app(
    platform: &Arc<MacPlatform>,
    raw_tx: &UnboundedSender<RawWindowEvent>,
    pid: pid_t,
    notification_class: &str,
) -> std::result::Result<(), crate::sys::axuielement::Error> {
    let app = AXUIElement::application(pid);
    // New windows must have their destroy notification registered from this
    // thread, so the callback parks them here for the loop below.
    let pending: Arc<Mutex<Vec<AXUIElement>>> = Arc::new(Mutex::new(Vec::new()));

    let observer = {
        let platform = platform.clone();
        let raw_tx = raw_tx.clone();
        let class = notification_class.to_string();
        let pending = pending.clone();
        Observer::new(pid)?.install(move |element, notification| {
            match notification {
                WINDOW_CREATED => {
                    let Some(handle) = platform.register(&element) else {
                        return;
                    };
                    pending.lock().push(element);
                    let _ = raw_tx.send(RawWindowEvent {
                        kind: RawKind::Shown,
                        window: handle,
                        class: class.clone(),
                    });
                }
                ELEMENT_DESTROYED => {
                    // A destroyed element no longer answers the window id
                    // query; when that happens the poller's visibility check
                    // catches the disappearance instead.
                    if let Ok(wid) = element.window_id() {
                        let handle = WindowHandle::new(wid as u64);
                        platform.forget(handle);
                        let _ = raw_tx.send(RawWindowEvent {
                            kind: RawKind::Hidden,
                            window: handle,
                            class: class.clone(),
                        });
                    }
                }
                _ => {}
            }
        })
    };

    observer.add_notification(&app, WINDOW_CREATED)?;
    for window in app.windows().unwrap_or_default() {
        platform.register(&window);
        observer.add_notification(&window, ELEMENT_DESTROYED)?;
    }

    let mode: Option<&CFRunLoopMode> = unsafe { kCFRunLoopDefaultMode };
    loop {
        unsafe {
            CFRunLoop::run_in_mode(mode, 0.25, false);
        }
        for window in pending.lock().drain(..) {
            let _ = observer.add_notification(&window, ELEMENT_DESTROYED);
        }
        if NSRunningApplication::runningApplicationWithProcessIdentifier(pid).is_none() {
            debug!(pid, "watched process exited");
            return Ok(());
        }
    }
}

#[allow(non_snake_case)]
#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGEventCreateKeyboardEvent(
        source: *mut c_void,
        virtual_key: u16,
        key_down: bool,
    ) -> *mut c_void;
    fn CGEventSetFlags(event: *mut c_void, flags: u64);
    fn CGEventPost(tap: u32, event: *mut c_void);
}

#[allow(non_snake_case)]
#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    fn CFRelease(cf: *mut c_void);
}
