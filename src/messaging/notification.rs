// Notifications - User-facing status and error messages for the UI

use std::fmt;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Transport,
    Dispatch,
    Capture,
    Audio,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationCategory::Transport => "transport",
            NotificationCategory::Dispatch => "dispatch",
            NotificationCategory::Capture => "capture",
            NotificationCategory::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Notification with timestamp
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    pub timestamp: i64, // Unix timestamp in milliseconds
}

impl Notification {
    /// Create a notification stamped with the current time
    pub fn new(
        level: NotificationLevel,
        category: NotificationCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn info(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, category, message)
    }

    pub fn warning(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, category, message)
    }

    pub fn error(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, category, message)
    }

    /// Forward to the `log` facade at the matching level
    pub fn log(&self) {
        let level = match self.level {
            NotificationLevel::Info => log::Level::Info,
            NotificationLevel::Warning => log::Level::Warn,
            NotificationLevel::Error => log::Level::Error,
        };
        log::log!(level, "[{}] {}", self.category, self.message);
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}
