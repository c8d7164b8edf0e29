//! Which event kinds get an outbox record.

use std::collections::BTreeSet;

/// Kinds captured by the unit of work. Anything else is dropped silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAllowList {
    kinds: BTreeSet<String>,
}

impl EventAllowList {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    /// Every blog event except `PostViewed`.
    pub fn blog_defaults() -> Self {
        Self::new(blog_domain::default_allow_listed_kinds())
    }

    pub fn allows(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for EventAllowList {
    fn default() -> Self {
        Self::blog_defaults()
    }
}

impl From<&blog_config_and_utils::OutboxSettings> for EventAllowList {
    fn from(settings: &blog_config_and_utils::OutboxSettings) -> Self {
        Self::new(settings.event_allow_list.iter().cloned())
    }
}
