//! SyncEngine: keeps the selected document's buffer and the store in step.
//!
//! Edits update the in-memory buffer synchronously and feed the debounce
//! scheduler. When a timer fires the engine talks to the `PersistenceClient`,
//! and any result that would touch the buffer is checked against the
//! `StalenessGuard` first:
//!
//! ```text
//! select ─► settle timers ─► reset cache ─► bump guard ─► flushed saves ─► load
//! edit ─► buffer ─► schedule(channel) ─► fire ─► client ─► guard ─► buffer
//! ```
//!
//! All engine state sits behind one mutex that is never held across an
//! `.await`, so every read-modify-write of the buffer happens in a single
//! synchronous step after the token has been re-validated.
//!
//! Methods that start timers or background work spawn tokio tasks and must be
//! called from within a tokio runtime.

use crate::cache::{ContentBuffer, ContentCache, ContentField};
use crate::client::{ClientError, Confirmer, PersistenceClient};
use crate::debounce::{Channel, DebounceScheduler};
use crate::events::{EngineEvent, EventBus, NoticeLevel, Subscription};
use crate::guard::{StalenessGuard, Token};
use crate::models::{Document, DocumentId, WorkspaceId};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Delay before persisting edited content.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(1500);

/// Delay before re-deriving the sanitized preview in auto mode.
pub const DEFAULT_DERIVE_DELAY: Duration = Duration::from_millis(800);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No document selected")]
    NoSelection,

    #[error("Sanitized content is read-only in auto mode")]
    ReadOnly,

    #[error("Write cancelled")]
    Cancelled,

    #[error("Selection changed before the operation could run")]
    SelectionChanged,

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Whether the sanitized form is machine-derived or hand-edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationMode {
    #[default]
    Auto,
    Manual,
}

/// What happens to pending timers when the selection moves away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeselectPolicy {
    /// Run pending saves immediately so no edit is lost.
    #[default]
    Flush,
    /// Drop pending saves; edits inside the debounce window are lost.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub save_delay: Duration,
    pub derive_delay: Duration,
    pub deselect_policy: DeselectPolicy,
    pub initial_mode: DerivationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            save_delay: DEFAULT_SAVE_DELAY,
            derive_delay: DEFAULT_DERIVE_DELAY,
            deselect_policy: DeselectPolicy::default(),
            initial_mode: DerivationMode::default(),
        }
    }
}

struct Shared {
    guard: StalenessGuard,
    cache: ContentCache,
    mode: DerivationMode,
    selected: Option<Document>,
}

struct Inner<C> {
    client: C,
    config: EngineConfig,
    scheduler: DebounceScheduler,
    events: EventBus,
    shared: Mutex<Shared>,
}

/// Handle to the engine. Clones share state.
pub struct SyncEngine<C: PersistenceClient> {
    inner: Arc<Inner<C>>,
}

impl<C: PersistenceClient> Clone for SyncEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PersistenceClient> SyncEngine<C> {
    pub fn new(client: C, config: EngineConfig) -> Self {
        let mode = config.initial_mode;
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                scheduler: DebounceScheduler::new(),
                events: EventBus::new(),
                shared: Mutex::new(Shared {
                    guard: StalenessGuard::new(),
                    cache: ContentCache::new(),
                    mode,
                    selected: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: EngineEvent) {
        self.inner.events.emit(event);
    }

    fn notice(&self, level: NoticeLevel, message: String) {
        self.emit(EngineEvent::Notice { level, message });
    }

    // ==================== Read side ====================

    pub fn subscribe(
        &self,
        callback: impl Fn(&EngineEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(callback)
    }

    pub fn snapshot(&self) -> ContentBuffer {
        self.lock().cache.snapshot()
    }

    pub fn selection(&self) -> Option<DocumentId> {
        self.lock().guard.selection()
    }

    pub fn selected_document(&self) -> Option<Document> {
        self.lock().selected.clone()
    }

    pub fn mode(&self) -> DerivationMode {
        self.lock().mode
    }

    pub fn state(&self) -> EngineState {
        let shared = self.lock();
        match shared.guard.selection() {
            None => EngineState::Idle,
            Some(_) if shared.cache.is_loading() => EngineState::Loading,
            Some(_) => EngineState::Ready,
        }
    }

    pub fn is_pending(&self, channel: Channel) -> bool {
        self.inner.scheduler.is_pending(channel)
    }

    fn is_current(&self, token: &Token) -> bool {
        self.lock().guard.is_current(token)
    }

    fn drop_stale(&self, token: &Token, operation: &'static str) {
        debug!(
            "Dropping {} result for document {} (selection moved on)",
            operation,
            token.document()
        );
        self.emit(EngineEvent::StaleResultDropped {
            document: token.document(),
            operation,
        });
    }

    // ==================== Selection ====================

    /// Switch to `document` (or to nothing), loading its content.
    pub fn select(&self, document: Option<Document>) {
        self.select_with(document, self.inner.config.deselect_policy);
    }

    /// Reselecting the current document under the flush policy keeps the
    /// buffer: the caller's metadata may predate the saves being flushed.
    fn select_with(&self, document: Option<Document>, policy: DeselectPolicy) {
        let flushed = self.settle_pending(policy);

        let id = document.as_ref().map(|d| d.id);
        let (token, hand_edited) = {
            let mut shared = self.lock();
            let carried = (id.is_some()
                && id == shared.guard.selection()
                && policy == DeselectPolicy::Flush
                && !shared.cache.is_loading())
            .then(|| shared.cache.snapshot());
            shared.cache.reset();
            shared.guard.select(id);

            let hand_edited = match (&document, carried) {
                (Some(doc), Some(buffer)) => {
                    debug!("Keeping edited buffer for document {}", doc.id);
                    shared.cache.begin_load(&buffer.original);
                    Some(buffer.sanitized)
                }
                (Some(doc), None) => {
                    shared.cache.begin_load(&doc.original_content);
                    doc.sanitized_content.clone()
                }
                (None, _) => None,
            };
            shared.selected = document;
            (shared.guard.issue(), hand_edited)
        };

        match id {
            Some(id) => info!("Selected document {}", id),
            None => info!("Selection cleared"),
        }
        self.emit(EngineEvent::SelectionChanged { document: id });

        match token {
            Some(token) => {
                tokio::spawn(self.clone().load(token, flushed, hand_edited));
            }
            None if !flushed.is_empty() => {
                tokio::spawn(futures::future::join_all(flushed));
            }
            None => {}
        }
    }

    /// Cancel pending timers. Under the flush policy their actions are
    /// returned to be run by the caller.
    fn settle_pending(&self, policy: DeselectPolicy) -> Vec<BoxFuture<'static, ()>> {
        match policy {
            DeselectPolicy::Flush => {
                let actions = self.inner.scheduler.take_pending();
                if !actions.is_empty() {
                    debug!("Flushing {} pending action(s)", actions.len());
                }
                actions
            }
            DeselectPolicy::Discard => {
                let dropped = self.inner.scheduler.cancel_all();
                if dropped > 0 {
                    debug!("Discarded {} pending action(s)", dropped);
                }
                Vec::new()
            }
        }
    }

    /// Populate the buffer for `token`'s document once the flushed saves
    /// have landed. In manual mode a hand-edited sanitized form is shown as
    /// is; otherwise the preview is fetched.
    async fn load(
        self,
        token: Token,
        flushed: Vec<BoxFuture<'static, ()>>,
        hand_edited: Option<String>,
    ) {
        if !flushed.is_empty() {
            futures::future::join_all(flushed).await;
        }

        let result = match hand_edited.filter(|_| self.mode() == DerivationMode::Manual) {
            Some(sanitized) => Ok(sanitized),
            None => {
                self.inner
                    .client
                    .fetch_sanitized_preview(token.document())
                    .await
            }
        };

        let degraded = {
            let mut shared = self.lock();
            if !shared.guard.is_current(&token) {
                None
            } else {
                let degraded = result.is_err();
                shared.cache.complete_load(result);
                Some(degraded)
            }
        };

        match degraded {
            None => self.drop_stale(&token, "load"),
            Some(degraded) => {
                if degraded {
                    warn!(
                        "Preview unavailable for document {}, showing original",
                        token.document()
                    );
                }
                self.emit(EngineEvent::Loaded {
                    document: token.document(),
                    degraded,
                });
            }
        }
    }

    /// The selected document was deleted elsewhere.
    pub fn on_document_deleted(&self, id: DocumentId) {
        if self.selection() == Some(id) {
            self.select_with(None, DeselectPolicy::Discard);
        }
    }

    /// A workspace was removed along with its documents.
    pub fn on_workspace_removed(&self, workspace_id: WorkspaceId) {
        let affected = self
            .lock()
            .selected
            .as_ref()
            .is_some_and(|d| d.workspace_id == workspace_id);
        if affected {
            self.select_with(None, DeselectPolicy::Discard);
        }
    }

    /// Settle pending timers and clear the selection. Under the flush policy
    /// pending saves have completed by the time this returns.
    pub async fn shutdown(&self) {
        match self.inner.config.deselect_policy {
            DeselectPolicy::Flush => {
                let drained = self.inner.scheduler.drain().await;
                if drained > 0 {
                    info!("Flushed {} pending action(s) on shutdown", drained);
                }
            }
            DeselectPolicy::Discard => {
                self.inner.scheduler.cancel_all();
            }
        }
        self.select_with(None, DeselectPolicy::Discard);
    }

    // ==================== Edits ====================

    /// Apply an edit to the original content.
    ///
    /// Edits made while the document is still loading, and edits that leave
    /// the text unchanged, update the buffer but are not persisted: they are
    /// the initial population, not user input.
    pub fn edit_original(&self, text: &str) -> Result<()> {
        let (token, mode, changed, loading) = {
            let mut shared = self.lock();
            let token = shared.guard.issue().ok_or(EngineError::NoSelection)?;
            let changed = shared.cache.set_original(text);
            (token, shared.mode, changed, shared.cache.is_loading())
        };

        if !changed {
            return Ok(());
        }
        self.emit(EngineEvent::ContentChanged {
            document: token.document(),
            field: ContentField::Original,
        });
        if loading {
            return Ok(());
        }

        let scheduler = &self.inner.scheduler;
        let text = text.to_string();
        match mode {
            DerivationMode::Manual => {
                scheduler.cancel(Channel::DeriveSanitized);
                scheduler.schedule(
                    Channel::SaveOriginal,
                    self.inner.config.save_delay,
                    self.clone().persist(token, ContentField::Original, text),
                );
            }
            DerivationMode::Auto => {
                // The derive path saves before it fetches.
                scheduler.cancel(Channel::SaveOriginal);
                scheduler.schedule(
                    Channel::DeriveSanitized,
                    self.inner.config.derive_delay,
                    self.clone().save_and_derive(token, text),
                );
            }
        }
        Ok(())
    }

    /// Apply an edit to the sanitized content. Only allowed in manual mode.
    pub fn edit_sanitized(&self, text: &str) -> Result<()> {
        let (token, changed, loading) = {
            let mut shared = self.lock();
            let token = shared.guard.issue().ok_or(EngineError::NoSelection)?;
            if shared.mode == DerivationMode::Auto {
                return Err(EngineError::ReadOnly);
            }
            let changed = shared.cache.set_sanitized(text);
            (token, changed, shared.cache.is_loading())
        };

        if !changed {
            return Ok(());
        }
        self.emit(EngineEvent::ContentChanged {
            document: token.document(),
            field: ContentField::Sanitized,
        });
        if loading {
            return Ok(());
        }

        self.inner.scheduler.schedule(
            Channel::SaveSanitized,
            self.inner.config.save_delay,
            self.clone()
                .persist(token, ContentField::Sanitized, text.to_string()),
        );
        Ok(())
    }

    async fn store_field(&self, id: DocumentId, field: ContentField, text: &str) -> std::result::Result<(), ClientError> {
        match field {
            ContentField::Original => self.inner.client.update_original_content(id, text).await,
            ContentField::Sanitized => self.inner.client.update_sanitized_content(id, text).await,
        }
    }

    fn background_failure(&self, token: &Token, channel: Channel, err: ClientError) {
        warn!(
            "Background {} failed for document {}: {}",
            channel,
            token.document(),
            err
        );
        self.emit(EngineEvent::BackgroundFailure {
            document: token.document(),
            channel,
            message: err.to_string(),
        });
    }

    /// Debounced save. Does not touch the buffer, so it runs to completion
    /// even if the selection has moved on.
    async fn persist(self, token: Token, field: ContentField, text: String) {
        let channel = match field {
            ContentField::Original => Channel::SaveOriginal,
            ContentField::Sanitized => Channel::SaveSanitized,
        };
        match self.store_field(token.document(), field, &text).await {
            Ok(()) => self.emit(EngineEvent::Persisted {
                document: token.document(),
                field,
            }),
            Err(e) => self.background_failure(&token, channel, e),
        }
    }

    /// Save the original, then fetch a preview derived from it.
    async fn save_and_derive(self, token: Token, text: String) {
        let id = token.document();
        if let Err(e) = self.inner.client.update_original_content(id, &text).await {
            self.background_failure(&token, Channel::DeriveSanitized, e);
            return;
        }
        self.emit(EngineEvent::Persisted {
            document: id,
            field: ContentField::Original,
        });

        if !self.is_current(&token) {
            self.drop_stale(&token, "derive");
            return;
        }
        self.fetch_and_apply(token).await;
    }

    async fn fetch_and_apply(&self, token: Token) {
        match self.inner.client.fetch_sanitized_preview(token.document()).await {
            Ok(preview) => self.apply_preview(&token, &preview),
            Err(e) => self.background_failure(&token, Channel::DeriveSanitized, e),
        }
    }

    fn apply_preview(&self, token: &Token, preview: &str) {
        enum Outcome {
            Stale,
            ModeChanged,
            Applied(bool),
        }

        let outcome = {
            let mut shared = self.lock();
            if !shared.guard.is_current(token) {
                Outcome::Stale
            } else if shared.mode != DerivationMode::Auto {
                Outcome::ModeChanged
            } else {
                Outcome::Applied(shared.cache.set_sanitized(preview))
            }
        };

        match outcome {
            Outcome::Stale => self.drop_stale(token, "derive"),
            Outcome::ModeChanged => {
                debug!("Discarding preview for {}: manual mode", token.document())
            }
            Outcome::Applied(true) => self.emit(EngineEvent::ContentChanged {
                document: token.document(),
                field: ContentField::Sanitized,
            }),
            Outcome::Applied(false) => {}
        }
    }

    // ==================== Mode ====================

    /// Switch derivation mode. Entering auto mode refreshes the preview
    /// immediately; entering manual mode does nothing else.
    pub fn set_mode(&self, mode: DerivationMode) {
        let token = {
            let mut shared = self.lock();
            if shared.mode == mode {
                return;
            }
            shared.mode = mode;
            shared.guard.issue()
        };

        info!("Derivation mode: {:?}", mode);
        self.emit(EngineEvent::ModeChanged { mode });

        if mode != DerivationMode::Auto {
            return;
        }
        let Some(token) = token else {
            return;
        };

        // A pending manual save holds newer text than the store; save it
        // now so the refresh derives from it.
        let unsaved = if self.inner.scheduler.cancel(Channel::SaveOriginal) {
            Some(self.lock().cache.original().to_string())
        } else {
            None
        };
        tokio::spawn(self.clone().refresh_preview(token, unsaved));
    }

    async fn refresh_preview(self, token: Token, unsaved: Option<String>) {
        if let Some(text) = unsaved {
            match self
                .inner
                .client
                .update_original_content(token.document(), &text)
                .await
            {
                Ok(()) => self.emit(EngineEvent::Persisted {
                    document: token.document(),
                    field: ContentField::Original,
                }),
                Err(e) => self.background_failure(&token, Channel::SaveOriginal, e),
            }
        }
        self.fetch_and_apply(token).await;
    }

    // ==================== Explicit actions ====================

    /// Persist the current buffer right away, bypassing the debounce.
    /// Failures are returned and announced.
    pub async fn save_now(&self) -> Result<()> {
        let (token, mode, buffer) = {
            let shared = self.lock();
            let token = shared.guard.issue().ok_or(EngineError::NoSelection)?;
            (token, shared.mode, shared.cache.snapshot())
        };

        let scheduler = &self.inner.scheduler;
        scheduler.cancel(Channel::SaveOriginal);
        scheduler.cancel(Channel::DeriveSanitized);
        if mode == DerivationMode::Manual {
            scheduler.cancel(Channel::SaveSanitized);
        }

        let id = token.document();
        let result = async {
            self.store_field(id, ContentField::Original, &buffer.original)
                .await?;
            if mode == DerivationMode::Manual {
                self.store_field(id, ContentField::Sanitized, &buffer.sanitized)
                    .await?;
            }
            Ok::<(), ClientError>(())
        }
        .await;

        if let Err(e) = result {
            error!("Save failed for document {}: {}", id, e);
            self.notice(NoticeLevel::Error, format!("Save failed: {}", e));
            return Err(e.into());
        }

        self.emit(EngineEvent::Persisted {
            document: id,
            field: ContentField::Original,
        });
        self.notice(NoticeLevel::Info, "Saved".to_string());

        if mode == DerivationMode::Auto && self.is_current(&token) {
            self.fetch_and_apply(token).await;
        }
        Ok(())
    }

    /// Write one representation of the selected document to its file.
    ///
    /// Asks `confirmer` first, then persists the buffer's current value of
    /// `target` so the store matches what is written, then writes.
    pub async fn write_to_file(
        &self,
        target: ContentField,
        workspace_root: &str,
        confirmer: &dyn Confirmer,
    ) -> Result<()> {
        let token = self.lock().guard.issue().ok_or(EngineError::NoSelection)?;
        let label = target.as_str();

        if !confirmer
            .confirm(&format!("Write {} content to file?", label))
            .await
        {
            debug!("Write of {} content cancelled", label);
            return Err(EngineError::Cancelled);
        }

        let content = {
            let shared = self.lock();
            if !shared.guard.is_current(&token) {
                None
            } else {
                Some(match target {
                    ContentField::Original => shared.cache.original().to_string(),
                    ContentField::Sanitized => shared.cache.sanitized().to_string(),
                })
            }
        };
        let Some(content) = content else {
            self.notice(
                NoticeLevel::Error,
                "Selection changed, nothing was written".to_string(),
            );
            return Err(EngineError::SelectionChanged);
        };

        let id = token.document();
        let client = &self.inner.client;
        let result = async {
            self.store_field(id, target, &content).await?;
            match target {
                ContentField::Original => client.write_original_to_file(id, workspace_root).await,
                ContentField::Sanitized => {
                    client.write_sanitized_to_file(id, workspace_root).await
                }
            }
        }
        .await;

        match result {
            Ok(()) => {
                info!("Wrote {} content of document {} to file", label, id);
                self.emit(EngineEvent::Persisted {
                    document: id,
                    field: target,
                });
                self.notice(NoticeLevel::Info, format!("Wrote {} content to file", label));
                Ok(())
            }
            Err(e) => {
                error!("Failed to write {} content of {}: {}", label, id, e);
                self.notice(NoticeLevel::Error, format!("Failed to write file: {}", e));
                Err(e.into())
            }
        }
    }
}
