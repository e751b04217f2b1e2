//! In-memory content buffer for the selected document.
//!
//! The cache holds exactly one buffer. It is reset whenever the selection
//! changes so content from one document is never visible under another.

use serde::Serialize;
use std::fmt::Display;
use tracing::debug;

/// One of the two representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentField {
    Original,
    Sanitized,
}

impl ContentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentField::Original => "original",
            ContentField::Sanitized => "sanitized",
        }
    }
}

/// The two representations of the selected document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBuffer {
    pub original: String,
    pub sanitized: String,
    pub is_loading: bool,
}

#[derive(Debug, Default)]
pub struct ContentCache {
    buffer: ContentBuffer,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both fields and the loading flag.
    pub fn reset(&mut self) {
        self.buffer = ContentBuffer::default();
    }

    /// Start populating from known metadata. The sanitized field stays empty
    /// until [`complete_load`](Self::complete_load).
    pub fn begin_load(&mut self, original: &str) {
        self.buffer = ContentBuffer {
            original: original.to_string(),
            sanitized: String::new(),
            is_loading: true,
        };
    }

    /// Finish a load with the fetched preview. A failed fetch mirrors the
    /// original into the sanitized field.
    pub fn complete_load<E: Display>(&mut self, preview: Result<String, E>) {
        match preview {
            Ok(sanitized) => self.buffer.sanitized = sanitized,
            Err(e) => {
                debug!("Preview unavailable, mirroring original: {}", e);
                self.buffer.sanitized = self.buffer.original.clone();
            }
        }
        self.buffer.is_loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.buffer.is_loading
    }

    pub fn original(&self) -> &str {
        &self.buffer.original
    }

    pub fn sanitized(&self) -> &str {
        &self.buffer.sanitized
    }

    /// Replace the original text. Returns false when nothing changed.
    pub fn set_original(&mut self, text: &str) -> bool {
        if self.buffer.original == text {
            return false;
        }
        self.buffer.original = text.to_string();
        true
    }

    /// Replace the sanitized text. Returns false when nothing changed.
    pub fn set_sanitized(&mut self, text: &str) -> bool {
        if self.buffer.sanitized == text {
            return false;
        }
        self.buffer.sanitized = text.to_string();
        true
    }

    pub fn snapshot(&self) -> ContentBuffer {
        self.buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_success_populates_both_fields() {
        let mut cache = ContentCache::new();

        cache.begin_load("KEY=secret");
        assert!(cache.is_loading());
        assert_eq!(cache.sanitized(), "");

        cache.complete_load::<String>(Ok("KEY=***".into()));

        assert_eq!(
            cache.snapshot(),
            ContentBuffer {
                original: "KEY=secret".into(),
                sanitized: "KEY=***".into(),
                is_loading: false,
            }
        );
    }

    #[test]
    fn test_load_failure_mirrors_original() {
        let mut cache = ContentCache::new();

        cache.begin_load("plain text");
        cache.complete_load::<&str>(Err("unsupported format"));

        assert_eq!(cache.sanitized(), cache.original());
        assert!(!cache.is_loading());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut cache = ContentCache::new();
        cache.begin_load("a");
        cache.complete_load::<String>(Ok("b".into()));

        cache.reset();

        assert_eq!(cache.snapshot(), ContentBuffer::default());
    }

    #[test]
    fn test_setters_report_changes() {
        let mut cache = ContentCache::new();
        cache.begin_load("x");

        assert!(!cache.set_original("x"));
        assert!(cache.set_original("xy"));
        assert!(cache.set_sanitized("***"));
        assert!(!cache.set_sanitized("***"));
        assert_eq!(cache.original(), "xy");
    }
}
