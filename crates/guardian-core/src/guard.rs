//! Staleness guard: ties async results to the selection they were issued for.
//!
//! Every selection change bumps a generation counter. Operations capture a
//! [`Token`] when they start and check it with [`StalenessGuard::is_current`]
//! before touching the content buffer. A token from an earlier generation is
//! stale even if it names the same document, because the buffer it was issued
//! against has since been reset and reloaded.

use crate::models::DocumentId;

/// Identity an async operation was issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    document: DocumentId,
    generation: u64,
}

impl Token {
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct StalenessGuard {
    selection: Option<DocumentId>,
    generation: u64,
}

impl StalenessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to a new selection, invalidating every outstanding token.
    pub fn select(&mut self, selection: Option<DocumentId>) {
        self.selection = selection;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn selection(&self) -> Option<DocumentId> {
        self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Capture the current identity. `None` when nothing is selected.
    pub fn issue(&self) -> Option<Token> {
        self.selection.map(|document| Token {
            document,
            generation: self.generation,
        })
    }

    pub fn is_current(&self, token: &Token) -> bool {
        self.generation == token.generation && self.selection == Some(token.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_without_selection() {
        let guard = StalenessGuard::new();
        assert!(guard.issue().is_none());
    }

    #[test]
    fn test_token_current_until_selection_changes() {
        let mut guard = StalenessGuard::new();
        guard.select(Some(1));

        let token = guard.issue().unwrap();
        assert_eq!(token.document(), 1);
        assert!(guard.is_current(&token));

        guard.select(Some(2));
        assert!(!guard.is_current(&token));
    }

    #[test]
    fn test_reselecting_same_document_invalidates_old_tokens() {
        let mut guard = StalenessGuard::new();
        guard.select(Some(1));
        let first = guard.issue().unwrap();

        guard.select(Some(2));
        guard.select(Some(1));
        let second = guard.issue().unwrap();

        assert!(!guard.is_current(&first));
        assert!(guard.is_current(&second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_clearing_selection_invalidates_tokens() {
        let mut guard = StalenessGuard::new();
        guard.select(Some(7));
        let token = guard.issue().unwrap();

        guard.select(None);

        assert!(!guard.is_current(&token));
        assert_eq!(guard.selection(), None);
    }
}
