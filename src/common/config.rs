use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::classify::CallAction;
use crate::common::collections::HashMap;

pub fn config_file() -> PathBuf {
    dirs::home_dir().unwrap().join(".config").join("touchdeck").join("config.toml")
}

/// One soft button in Normal mode: a labeled keystroke for the focused app.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ShortcutBinding {
    pub display_name: String,
    /// Human-readable combination shown on the button, e.g. "Ctrl+Shift+S".
    #[serde(default)]
    pub key_combination: String,
    /// SendKeys-style injection format, e.g. "^+s".
    pub keys: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DetectorSettings {
    /// Process name of the conferencing application.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Window class of the incoming-call notification window. Events for
    /// any other class are dropped before they reach the coordinator.
    #[serde(default = "default_notification_class")]
    pub notification_window_class: String,
    /// Our own process name; focus changes to it are ignored.
    #[serde(default = "default_own_process")]
    pub own_process: String,
    /// Windows narrower than this are never call notifications, which lets
    /// us skip the accessibility walk for most windows.
    #[serde(default = "default_min_notification_width")]
    pub min_notification_width: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce window after entering a call, while the old notification
    /// window closes and the new call window opens.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Whether a successful decline also starts the call-window search.
    #[serde(default = "no")]
    pub reacquire_on_decline: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            notification_window_class: default_notification_class(),
            own_process: default_own_process(),
            min_notification_width: default_min_notification_width(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            reacquire_on_decline: false,
        }
    }
}

impl DetectorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Accessible-name keyword sets, matched as case-insensitive substrings.
/// Defaults cover the English and Traditional Chinese Teams UI.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct KeywordSettings {
    #[serde(default = "default_video_accept")]
    pub video_accept: Vec<String>,
    #[serde(default = "default_audio_accept")]
    pub audio_accept: Vec<String>,
    #[serde(default = "default_decline")]
    pub decline: Vec<String>,
    #[serde(default = "default_in_call")]
    pub in_call: Vec<String>,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            video_accept: default_video_accept(),
            audio_accept: default_audio_accept(),
            decline: default_decline(),
            in_call: default_in_call(),
        }
    }
}

/// Keystroke fallbacks for call actions, used when the accessibility
/// lookup cannot find a matching button.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct CallKeySettings {
    #[serde(default = "default_key_accept_video")]
    pub accept_video: String,
    #[serde(default = "default_key_accept_audio")]
    pub accept_audio: String,
    #[serde(default = "default_key_decline")]
    pub decline: String,
    #[serde(default = "default_key_toggle_mute")]
    pub toggle_mute: String,
    #[serde(default = "default_key_toggle_video")]
    pub toggle_video: String,
    #[serde(default = "default_key_hang_up")]
    pub hang_up: String,
}

impl Default for CallKeySettings {
    fn default() -> Self {
        Self {
            accept_video: default_key_accept_video(),
            accept_audio: default_key_accept_audio(),
            decline: default_key_decline(),
            toggle_mute: default_key_toggle_mute(),
            toggle_video: default_key_toggle_video(),
            hang_up: default_key_hang_up(),
        }
    }
}

impl CallKeySettings {
    pub fn format_for(&self, action: CallAction) -> &str {
        match action {
            CallAction::AcceptVideo => &self.accept_video,
            CallAction::AcceptAudio => &self.accept_audio,
            CallAction::Decline => &self.decline,
            CallAction::ToggleMute => &self.toggle_mute,
            CallAction::ToggleVideo => &self.toggle_video,
            CallAction::HangUp => &self.hang_up,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct InvokerSettings {
    /// Delay between raising the target window and acting on it.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_search_attempts")]
    pub search_attempts: u32,
    #[serde(default = "default_search_interval_ms")]
    pub search_interval_ms: u64,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            search_attempts: default_search_attempts(),
            search_interval_ms: default_search_interval_ms(),
        }
    }
}

impl InvokerSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn search_interval(&self) -> Duration {
        Duration::from_millis(self.search_interval_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub keywords: KeywordSettings,
    #[serde(default)]
    pub call_keys: CallKeySettings,
    #[serde(default)]
    pub invoker: InvokerSettings,
    /// Shortcut bindings keyed by application. A key matches when the
    /// focused process name contains it, case-insensitively.
    #[serde(default = "default_apps")]
    pub apps: HashMap<String, Vec<ShortcutBinding>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            keywords: KeywordSettings::default(),
            call_keys: CallKeySettings::default(),
            invoker: InvokerSettings::default(),
            apps: default_apps(),
        }
    }
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&buf)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.detector.process_name.is_empty() {
            issues.push("detector.process_name must not be empty".to_string());
        }
        if self.detector.notification_window_class.is_empty() {
            issues.push("detector.notification_window_class must not be empty".to_string());
        }
        if self.detector.poll_interval_ms == 0 {
            issues.push("detector.poll_interval_ms must be at least 1".to_string());
        }
        if self.detector.min_notification_width < 0.0 {
            issues.push("detector.min_notification_width must not be negative".to_string());
        }
        if self.invoker.search_attempts == 0 {
            issues.push("invoker.search_attempts must be at least 1".to_string());
        }
        if self.invoker.search_interval_ms == 0 {
            issues.push("invoker.search_interval_ms must be at least 1".to_string());
        }

        let keyword_sets = [
            ("keywords.video_accept", &self.keywords.video_accept),
            ("keywords.audio_accept", &self.keywords.audio_accept),
            ("keywords.decline", &self.keywords.decline),
            ("keywords.in_call", &self.keywords.in_call),
        ];
        for (name, set) in keyword_sets {
            if set.iter().any(|kw| kw.trim().is_empty()) {
                issues.push(format!("{} contains an empty keyword", name));
            }
        }

        for (app, bindings) in &self.apps {
            if app.trim().is_empty() {
                issues.push("apps contains an empty application key".to_string());
            }
            for binding in bindings {
                if binding.display_name.is_empty() {
                    issues.push(format!("apps.{}: binding without display_name", app));
                }
                if binding.keys.is_empty() {
                    issues.push(format!(
                        "apps.{}: binding '{}' has no key sequence",
                        app, binding.display_name
                    ));
                }
            }
        }

        issues
    }

    /// Bindings offered while `focused_app` has focus, or an empty slice.
    pub fn bindings_for(&self, focused_app: &str) -> &[ShortcutBinding] {
        let focused = focused_app.to_lowercase();
        self.apps
            .iter()
            .find(|(key, _)| focused.contains(&key.to_lowercase()))
            .map(|(_, bindings)| bindings.as_slice())
            .unwrap_or(&[])
    }
}

fn no() -> bool {
    false
}

fn default_process_name() -> String {
    "ms-teams".to_string()
}

fn default_notification_class() -> String {
    "TeamsWebView".to_string()
}

fn default_own_process() -> String {
    "touchdeck".to_string()
}

fn default_min_notification_width() -> f64 {
    300.0
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_settle_ms() -> u64 {
    100
}

fn default_search_attempts() -> u32 {
    20
}

fn default_search_interval_ms() -> u64 {
    250
}

fn default_video_accept() -> Vec<String> {
    vec!["Accept with video".to_string(), "接聽視訊".to_string()]
}

fn default_audio_accept() -> Vec<String> {
    vec![
        "Accept with audio".to_string(),
        "接聽語音".to_string(),
        "Accept".to_string(),
        "接聽".to_string(),
    ]
}

fn default_decline() -> Vec<String> {
    vec!["Decline".to_string(), "拒絕".to_string()]
}

fn default_in_call() -> Vec<String> {
    [
        "Mute", "Unmute", "靜音", "Camera", "攝影機", "Turn camera on", "Turn camera off",
        "Leave", "Hang up", "離開", "掛斷", "Share", "共用",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_key_accept_video() -> String {
    "^+a".to_string()
}

fn default_key_accept_audio() -> String {
    "^+s".to_string()
}

fn default_key_decline() -> String {
    "^+d".to_string()
}

fn default_key_toggle_mute() -> String {
    "^+m".to_string()
}

fn default_key_toggle_video() -> String {
    "^+o".to_string()
}

fn default_key_hang_up() -> String {
    "^+h".to_string()
}

fn binding(display_name: &str, key_combination: &str, keys: &str) -> ShortcutBinding {
    ShortcutBinding {
        display_name: display_name.to_string(),
        key_combination: key_combination.to_string(),
        keys: keys.to_string(),
        description: String::new(),
    }
}

fn default_apps() -> HashMap<String, Vec<ShortcutBinding>> {
    let mut apps = HashMap::default();
    apps.insert(
        "notepad".to_string(),
        vec![
            binding("New", "Ctrl+N", "^n"),
            binding("Open", "Ctrl+O", "^o"),
            binding("Save", "Ctrl+S", "^s"),
            binding("Save As", "Ctrl+Shift+S", "^+s"),
            binding("Find", "Ctrl+F", "^f"),
            binding("Replace", "Ctrl+H", "^h"),
            binding("Undo", "Ctrl+Z", "^z"),
        ],
    );
    apps.insert(
        "code".to_string(),
        vec![
            binding("Save", "Ctrl+S", "^s"),
            binding("Open File", "Ctrl+O", "^o"),
            binding("Find", "Ctrl+F", "^f"),
            binding("Replace", "Ctrl+H", "^h"),
            binding("Comment", "Ctrl+/", "^/"),
            binding("Run", "F5", "{F5}"),
            binding("Format", "Shift+Alt+F", "+%f"),
        ],
    );
    apps.insert(
        "chrome".to_string(),
        vec![
            binding("New Tab", "Ctrl+T", "^t"),
            binding("Close Tab", "Ctrl+W", "^w"),
            binding("Reload", "F5", "{F5}"),
            binding("Back", "Alt+Left", "%{LEFT}"),
            binding("Forward", "Alt+Right", "%{RIGHT}"),
            binding("Bookmark", "Ctrl+D", "^d"),
            binding("Find", "Ctrl+F", "^f"),
        ],
    );
    apps.insert(
        "ms-teams".to_string(),
        vec![
            binding("Search", "Ctrl+E", "^e"),
            binding("New Chat", "Ctrl+N", "^n"),
            binding("Settings", "Ctrl+,", "^,"),
            binding("Zoom In", "Ctrl+=", "^="),
            binding("Zoom Out", "Ctrl+-", "^-"),
            binding("Go to Chat", "Ctrl+2", "^2"),
            binding("Go to Calendar", "Ctrl+4", "^4"),
            binding("Go to Calls", "Ctrl+5", "^5"),
        ],
    );
    apps
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_config_validates_clean() {
        assert_eq!(Config::default().validate(), Vec::<String>::new());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [detector]
            poll_interval_ms = 250
            reacquire_on_decline = true
            "#,
        )
        .unwrap();
        assert_eq!(config.detector.poll_interval_ms, 250);
        assert!(config.detector.reacquire_on_decline);
        assert_eq!(config.detector.grace_period_ms, 5000);
        assert_eq!(config.detector.process_name, "ms-teams");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [detector]
            pol_interval_ms = 250
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_bad_tuning() {
        let mut config = Config::default();
        config.detector.poll_interval_ms = 0;
        config.invoker.search_attempts = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("poll_interval_ms")));
        assert!(issues.iter().any(|i| i.contains("search_attempts")));
    }

    #[test]
    fn validate_flags_binding_without_keys() {
        let mut config = Config::default();
        config
            .apps
            .insert("paint".to_string(), vec![binding("Broken", "Ctrl+B", "")]);
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("Broken")));
    }

    #[test]
    fn bindings_match_by_case_insensitive_substring() {
        let config = Config::default();
        assert!(!config.bindings_for("Notepad.exe").is_empty());
        assert!(!config.bindings_for("Code").is_empty());
        assert!(config.bindings_for("explorer").is_empty());
        assert!(config.bindings_for("").is_empty());
    }

    #[test]
    fn reads_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [apps]
            mspaint = [
                { display_name = "Save", key_combination = "Ctrl+S", keys = "^s" },
            ]
            "#,
        )
        .unwrap();
        let config = Config::read(&path).unwrap();
        assert_eq!(config.bindings_for("mspaint").len(), 1);
        assert_eq!(config.bindings_for("mspaint")[0].keys, "^s");
    }

    #[test]
    fn read_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::read(&dir.path().join("nope.toml")).is_err());
    }
}
