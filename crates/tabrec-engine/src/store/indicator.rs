use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tabrec_common::protocol::TabId;

pub const BADGE_TEXT: &str = "REC";
pub const BADGE_COLOR: &str = "#ff4757";

/// Tab-scoped "recording" affordance (a toolbar badge in a real browser).
pub trait RecordingIndicator: Send + Sync {
    fn show(&self, tab: TabId);
    fn clear(&self, tab: TabId);
}

pub struct NoopIndicator;

impl RecordingIndicator for NoopIndicator {
    fn show(&self, _tab: TabId) {}
    fn clear(&self, _tab: TabId) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

/// Keeps the badge state per tab, the way the toolbar would show it.
#[derive(Default)]
pub struct BadgeIndicator {
    badges: Mutex<HashMap<TabId, Badge>>,
}

impl BadgeIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn badge(&self, tab: TabId) -> Option<Badge> {
        self.badges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab)
            .cloned()
    }
}

impl RecordingIndicator for BadgeIndicator {
    fn show(&self, tab: TabId) {
        self.badges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                tab,
                Badge {
                    text: BADGE_TEXT.to_string(),
                    color: BADGE_COLOR.to_string(),
                },
            );
    }

    fn clear(&self, tab: TabId) {
        self.badges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
    }
}
