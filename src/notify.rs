//! Operator notifications ("toasts").
//!
//! Flows never print. They hand a `Notice` to whatever `Notifier` the context was built with:
//! the console prints them, tests record them, headless runs log them.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, description: Option<String>) -> Self {
        Self { level, title: title.into(), description }
    }
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, Some(description.into()))
    }
    pub fn success(title: impl Into<String>) -> Self { Self::new(NoticeLevel::Success, title, None) }
    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, Some(description.into()))
    }
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, Some(description.into()))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notice) {
        let desc = n.description.as_deref().unwrap_or("");
        match n.level {
            NoticeLevel::Error => error!(target: "ispdesk::notice", "{}: {}", n.title, desc),
            NoticeLevel::Warning => warn!(target: "ispdesk::notice", "{}: {}", n.title, desc),
            NoticeLevel::Info | NoticeLevel::Success => info!(target: "ispdesk::notice", "{}: {}", n.title, desc),
        }
    }
}

/// Keeps every notice in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn notices(&self) -> Vec<Notice> { self.notices.lock().clone() }

    pub fn take(&self) -> Vec<Notice> { std::mem::take(&mut *self.notices.lock()) }

    pub fn count_titled(&self, title: &str) -> usize {
        self.notices.lock().iter().filter(|n| n.title == title).count()
    }

    pub fn last(&self) -> Option<Notice> { self.notices.lock().last().cloned() }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
