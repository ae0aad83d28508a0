use serde::{Deserialize, Serialize};

const DEFAULT_DISPOSABLE_TAGS: [&str; 3] = ["temp", "cache", "backup"];

/// Which persistent entries cleanup may evict.
///
/// An entry is disposable when its key is not on the essential allow-list and
/// contains one of the disposable tags as a substring. Untagged entries are
/// never evicted regardless of age or size; this is tag-based eviction, not
/// an LRU. The substring match is a heuristic carried over from the keys this
/// was built for (`message-cache`, `draft-backup`, `temp-upload`); the
/// allow-list is the only guard against an essential key that happens to
/// contain a tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Keys that must never be evicted, even when tagged disposable.
    #[serde(default)]
    pub essential_keys: Vec<String>,

    /// Substrings marking an entry as safe to evict under pressure.
    #[serde(default = "default_disposable_tags")]
    pub disposable_tags: Vec<String>,
}

fn default_disposable_tags() -> Vec<String> {
    DEFAULT_DISPOSABLE_TAGS.iter().map(|t| t.to_string()).collect()
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            essential_keys: Vec::new(),
            disposable_tags: default_disposable_tags(),
        }
    }
}

impl CleanupPolicy {
    /// Add a key to the essential allow-list.
    pub fn with_essential(mut self, key: &str) -> Self {
        self.essential_keys.push(key.to_string());
        self
    }

    /// Add a disposable tag substring.
    pub fn with_disposable_tag(mut self, tag: &str) -> Self {
        self.disposable_tags.push(tag.to_string());
        self
    }

    /// Whether cleanup may evict the entry under `key`.
    pub fn is_disposable(&self, key: &str) -> bool {
        if self.essential_keys.iter().any(|k| k == key) {
            return false;
        }
        self.disposable_tags.iter().any(|tag| key.contains(tag.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_keys_are_disposable() {
        let policy = CleanupPolicy::default();
        assert!(policy.is_disposable("message-cache"));
        assert!(policy.is_disposable("temp-upload-3"));
        assert!(policy.is_disposable("profile-backup"));
    }

    #[test]
    fn test_untagged_keys_are_kept() {
        let policy = CleanupPolicy::default();
        assert!(!policy.is_disposable("user-profile"));
        assert!(!policy.is_disposable("chat-draft"));
    }

    #[test]
    fn test_essential_wins_over_tag() {
        let policy = CleanupPolicy::default().with_essential("session-cache");
        assert!(!policy.is_disposable("session-cache"));
        // Only the exact key is protected
        assert!(policy.is_disposable("session-cache-old"));
    }

    #[test]
    fn test_custom_tag() {
        let policy = CleanupPolicy::default().with_disposable_tag("scratch");
        assert!(policy.is_disposable("scratch-pad"));
    }
}
