//! guardian-core: Keeps an edited config document and its sanitized twin in
//! sync with a persistence store.
//!
//! This crate provides:
//! - `SyncEngine`, the orchestrator that turns edit events into debounced
//!   saves and preview derivations
//! - `StalenessGuard`, `DebounceScheduler` and `ContentCache`, the pieces the
//!   engine is built from
//! - `PersistenceClient` and `FileSystem` trait abstractions
//! - `DocumentStore` and the sanitizer, a reference implementation of the
//!   persistence side

pub mod cache;
pub mod client;
pub mod debounce;
pub mod engine;
pub mod events;
pub mod fs;
pub mod guard;
pub mod models;
pub mod sanitizer;
pub mod store;

pub use cache::{ContentBuffer, ContentCache, ContentField};
pub use client::{AlwaysConfirm, ClientError, Confirmer, PersistenceClient};
pub use debounce::{Channel, DebounceScheduler};
pub use engine::{
    DeselectPolicy, DerivationMode, EngineConfig, EngineError, EngineState, SyncEngine,
};
pub use events::{EngineEvent, EventBus, NoticeLevel, Subscription};
pub use fs::{FileSystem, FsError, InMemoryFs};
pub use guard::{StalenessGuard, Token};
pub use models::{Catalog, Document, DocumentId, Workspace, WorkspaceId};
pub use store::DocumentStore;
