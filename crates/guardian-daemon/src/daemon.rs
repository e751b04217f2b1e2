//! Daemon state and command execution.

use anyhow::{anyhow, Result};
use guardian_core::{
    Confirmer, DerivationMode, EngineError, EngineState, SyncEngine,
};
use std::sync::Arc;
use tracing::info;

use crate::command::{Command, HELP};
use crate::config::{expand_tilde, DaemonConfig};
use crate::storage::PersistentStore;

/// Daemon state holding the store and the engine over it.
pub struct Daemon {
    store: Arc<PersistentStore>,
    engine: SyncEngine<Arc<PersistentStore>>,
    confirmer: Box<dyn Confirmer>,
}

impl Daemon {
    pub fn open(config: &DaemonConfig, confirmer: Box<dyn Confirmer>) -> Result<Self> {
        let store = Arc::new(PersistentStore::open(&config.data_dir)?);
        info!("Catalog: {}", store.catalog_path().display());

        let engine = SyncEngine::new(Arc::clone(&store), config.engine.clone());
        Ok(Self {
            store,
            engine,
            confirmer,
        })
    }

    pub fn engine(&self) -> &SyncEngine<Arc<PersistentStore>> {
        &self.engine
    }

    /// Run one command and return the text to print (possibly empty).
    pub async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::WorkspaceAdd { name, root } => {
                let root = std::path::absolute(expand_tilde(&root))?;
                let workspace = self
                    .store
                    .add_workspace(&name, &root.to_string_lossy())?;
                Ok(format!(
                    "Added workspace {}: {} ({})",
                    workspace.id, workspace.name, workspace.root_path
                ))
            }
            Command::WorkspaceList => {
                let workspaces = self.store.workspaces();
                if workspaces.is_empty() {
                    return Ok("No workspaces".into());
                }
                Ok(workspaces
                    .iter()
                    .map(|w| format!("{}\t{}\t{}", w.id, w.name, w.root_path))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::WorkspaceRemove(id) => {
                self.engine.on_workspace_removed(id);
                let removed = self.store.remove_workspace(id)?;
                Ok(format!(
                    "Removed workspace {} and {} document(s)",
                    id,
                    removed.len()
                ))
            }
            Command::DocAdd {
                workspace,
                name,
                path,
            } => {
                let document = self.store.add_document(workspace, &name, &path).await?;
                Ok(format!(
                    "Added document {}: {} ({})",
                    document.id, document.name, document.path
                ))
            }
            Command::DocList => {
                let documents = self.store.documents();
                if documents.is_empty() {
                    return Ok("No documents".into());
                }
                let selected = self.engine.selection();
                Ok(documents
                    .iter()
                    .map(|d| {
                        let marker = if selected == Some(d.id) { '*' } else { ' ' };
                        format!("{} {}\t{}\t{}\t{}", marker, d.id, d.workspace_id, d.name, d.path)
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::DocRemove(id) => {
                self.engine.on_document_deleted(id);
                self.store.delete_document(id)?;
                Ok(format!("Removed document {}", id))
            }
            Command::Select(None) => {
                self.engine.select(None);
                Ok("Selection cleared".into())
            }
            Command::Select(Some(id)) => {
                let document = self
                    .store
                    .document(id)
                    .ok_or_else(|| anyhow!("no document with id {}", id))?;
                let summary = format!("Selected {} ({})", document.name, document.path);
                self.engine.select(Some(document));
                Ok(summary)
            }
            Command::Original(text) => {
                self.engine.edit_original(&text)?;
                Ok(String::new())
            }
            Command::Sanitized(text) => {
                self.engine.edit_sanitized(&text)?;
                Ok(String::new())
            }
            Command::Mode(mode) => {
                self.engine.set_mode(mode);
                Ok(format!("Mode: {}", mode_name(mode)))
            }
            Command::Show => Ok(self.render()),
            Command::Save => {
                self.engine.save_now().await?;
                Ok(String::new())
            }
            Command::Write(field) => {
                let document = self
                    .engine
                    .selected_document()
                    .ok_or(EngineError::NoSelection)?;
                let workspace = self
                    .store
                    .workspace(document.workspace_id)
                    .ok_or_else(|| anyhow!("workspace {} no longer exists", document.workspace_id))?;

                match self
                    .engine
                    .write_to_file(field, &workspace.root_path, self.confirmer.as_ref())
                    .await
                {
                    Ok(()) => Ok(String::new()),
                    Err(EngineError::Cancelled) => Ok("Write cancelled".into()),
                    Err(e) => Err(e.into()),
                }
            }
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => Ok(String::new()),
        }
    }

    fn render(&self) -> String {
        let Some(document) = self.engine.selected_document() else {
            return "No document selected".into();
        };
        let buffer = self.engine.snapshot();
        let state = match self.engine.state() {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
        };

        format!(
            "[{}] {} ({}), mode {}, {}\n--- original ---\n{}\n--- sanitized ---\n{}",
            document.id,
            document.name,
            document.path,
            mode_name(self.engine.mode()),
            state,
            buffer.original,
            buffer.sanitized
        )
    }

    /// Flush (or discard) pending saves and clear the selection.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

fn mode_name(mode: DerivationMode) -> &'static str {
    match mode {
        DerivationMode::Auto => "auto",
        DerivationMode::Manual => "manual",
    }
}

/// Whether the engine already published a notice for this error.
pub fn is_announced(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Client(_) | EngineError::SelectionChanged)
    )
}
