//! Environment definitions as supplied by the settings/storage layer.
//!
//! These are plain value objects. The orchestration core reads them and never
//! edits them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

fn new_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts RFC 3339 as well as offset-less ISO timestamps (read as UTC).
/// Anything unparseable becomes `None` rather than rejecting the environment.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| value.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
            .ok()
    }))
}

/// An application to start as part of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(default = "new_item_id")]
    pub id: String,
    pub name: String,
    /// Executable path; may contain `$VAR`, `${VAR}`, `%VAR%` or a leading `~`.
    pub path: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Block the launch sequence until this process exits.
    #[serde(default)]
    pub wait_for_exit: bool,
}

impl Application {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            name: name.into(),
            path: path.into(),
            arguments: String::new(),
            working_directory: None,
            wait_for_exit: false,
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn waiting_for_exit(mut self) -> Self {
        self.wait_for_exit = true;
        self
    }

    /// Split the argument string the way a POSIX shell would.
    ///
    /// Unbalanced quotes fall back to plain whitespace splitting.
    pub fn argv(&self) -> Vec<String> {
        let trimmed = self.arguments.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        shlex::split(trimmed)
            .unwrap_or_else(|| trimmed.split_whitespace().map(str::to_string).collect())
    }
}

/// A website to open as part of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Website {
    #[serde(default = "new_item_id")]
    pub id: String,
    pub name: String,
    pub url: String,
    /// Browser executable overriding the system default.
    #[serde(default)]
    pub browser: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub new_tab: bool,
}

impl Website {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            name: name.into(),
            url: url.into(),
            browser: None,
            new_tab: true,
        }
    }

    pub fn with_browser(mut self, browser: impl Into<PathBuf>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    /// Only absolute `http` and `https` URLs are launchable.
    pub fn validate_url(&self) -> Result<url::Url, String> {
        let parsed = url::Url::parse(self.url.trim())
            .map_err(|e| format!("invalid URL '{}': {}", self.url, e))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(format!(
                "unsupported URL scheme '{}' (expected http or https)",
                other
            )),
        }
    }
}

/// Per-environment container behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerOptions {
    #[serde(default)]
    pub use_desktop_isolation: bool,
    #[serde(default)]
    pub desktop_index: Option<u32>,
    #[serde(default)]
    pub auto_switch: bool,
    /// Terminate the environment's processes when the container stops.
    #[serde(default = "default_true")]
    pub close_on_stop: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            use_desktop_isolation: false,
            desktop_index: None,
            auto_switch: false,
            close_on_stop: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default = "new_item_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub websites: Vec<Website>,
    /// Seconds to wait before the first item launches.
    #[serde(default)]
    pub startup_delay: u64,
    #[serde(default)]
    pub container: ContainerOptions,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_item_id(),
            name: name.into(),
            description: String::new(),
            applications: Vec::new(),
            websites: Vec::new(),
            startup_delay: 0,
            container: ContainerOptions::default(),
            created_at: None,
            modified_at: None,
        }
    }

    pub fn with_application(mut self, app: Application) -> Self {
        self.applications.push(app);
        self
    }

    pub fn with_website(mut self, site: Website) -> Self {
        self.websites.push(site);
        self
    }

    pub fn total_items(&self) -> usize {
        self.applications.len() + self.websites.len()
    }

    /// Items in launch order: applications first, then websites.
    pub fn items(&self) -> impl Iterator<Item = LaunchItem<'_>> {
        self.applications
            .iter()
            .map(LaunchItem::Application)
            .chain(self.websites.iter().map(LaunchItem::Website))
    }
}

/// Borrowed view of one launchable entry.
#[derive(Debug, Clone, Copy)]
pub enum LaunchItem<'a> {
    Application(&'a Application),
    Website(&'a Website),
}

impl<'a> LaunchItem<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            LaunchItem::Application(app) => &app.name,
            LaunchItem::Website(site) => &site.name,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            LaunchItem::Application(_) => ItemKind::Application,
            LaunchItem::Website(_) => ItemKind::Website,
        }
    }

    pub fn waits_for_exit(&self) -> bool {
        matches!(self, LaunchItem::Application(app) if app.wait_for_exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Application,
    Website,
}
