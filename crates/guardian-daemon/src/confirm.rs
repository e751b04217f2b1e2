//! Interactive confirmation over the daemon's stdin.

use async_trait::async_trait;
use guardian_core::Confirmer;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Stdin line reader shared by the command loop and the confirmer.
pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Asks on stdout and reads the answer from the shared stdin reader.
pub struct StdinConfirmer {
    lines: SharedLines,
}

impl StdinConfirmer {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        let _ = std::io::stdout().flush();

        match self.lines.lock().await.next_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            // EOF or a read error never counts as consent
            _ => false,
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
