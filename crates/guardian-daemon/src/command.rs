//! Line commands read from stdin.

use guardian_core::{ContentField, DerivationMode, DocumentId, WorkspaceId};
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  workspace add <name> <root>        register a workspace directory
  workspace list                     list workspaces
  workspace rm <id>                  remove a workspace and its documents
  doc add <workspace> <name> <path>  track a file (path relative to the root)
  doc list                           list documents (* marks the selection)
  doc rm <id>                        stop tracking a document
  select <id>|none                   select a document
  original <text>                    replace the original content
  sanitized <text>                   replace the sanitized content (manual mode)
  mode auto|manual                   switch derivation mode
  show                               print the selected document's buffer
  save                               save the buffer now
  write original|sanitized           write content to the document's file
  help                               show this text
  quit                               flush pending saves and exit

Text arguments accept \\n and \\t escapes.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    WorkspaceAdd { name: String, root: String },
    WorkspaceList,
    WorkspaceRemove(WorkspaceId),
    DocAdd {
        workspace: WorkspaceId,
        name: String,
        path: String,
    },
    DocList,
    DocRemove(DocumentId),
    Select(Option<DocumentId>),
    Original(String),
    Sanitized(String),
    Mode(DerivationMode),
    Show,
    Save,
    Write(ContentField),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not a valid id: {0}")]
    InvalidId(String),
}

/// Split off the first whitespace-delimited word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

fn parse_id<'a>(word: Option<(&str, &'a str)>, usage: &'static str) -> Result<(i64, &'a str), CommandError> {
    let (word, rest) = word.ok_or(CommandError::Usage(usage))?;
    let id = word
        .parse()
        .map_err(|_| CommandError::InvalidId(word.to_string()))?;
    Ok((id, rest))
}

fn expect_end(rest: &str, usage: &'static str) -> Result<(), CommandError> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(CommandError::Usage(usage))
    }
}

/// Text argument: everything after the keyword and one separating space.
fn text_argument(rest: &str) -> String {
    let text = rest
        .strip_prefix(' ')
        .or_else(|| rest.strip_prefix('\t'))
        .unwrap_or(rest);
    unescape(text)
}

/// Decode `\n`, `\t` and `\\`. Other escapes are kept verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (keyword, rest) = next_word(line).ok_or(CommandError::Empty)?;

        match keyword {
            "workspace" => {
                const ADD: &str = "workspace add <name> <root>";
                const RM: &str = "workspace rm <id>";
                match next_word(rest) {
                    Some(("add", rest)) => {
                        let (name, root) = next_word(rest).ok_or(CommandError::Usage(ADD))?;
                        let root = root.trim();
                        if root.is_empty() {
                            return Err(CommandError::Usage(ADD));
                        }
                        Ok(Command::WorkspaceAdd {
                            name: name.to_string(),
                            root: root.to_string(),
                        })
                    }
                    Some(("list", rest)) => {
                        expect_end(rest, "workspace list")?;
                        Ok(Command::WorkspaceList)
                    }
                    Some(("rm", rest)) => {
                        let (id, rest) = parse_id(next_word(rest), RM)?;
                        expect_end(rest, RM)?;
                        Ok(Command::WorkspaceRemove(id))
                    }
                    _ => Err(CommandError::Usage("workspace add|list|rm")),
                }
            }
            "doc" => {
                const ADD: &str = "doc add <workspace> <name> <path>";
                const RM: &str = "doc rm <id>";
                match next_word(rest) {
                    Some(("add", rest)) => {
                        let (workspace, rest) = parse_id(next_word(rest), ADD)?;
                        let (name, path) = next_word(rest).ok_or(CommandError::Usage(ADD))?;
                        let path = path.trim();
                        if path.is_empty() {
                            return Err(CommandError::Usage(ADD));
                        }
                        Ok(Command::DocAdd {
                            workspace,
                            name: name.to_string(),
                            path: path.to_string(),
                        })
                    }
                    Some(("list", rest)) => {
                        expect_end(rest, "doc list")?;
                        Ok(Command::DocList)
                    }
                    Some(("rm", rest)) => {
                        let (id, rest) = parse_id(next_word(rest), RM)?;
                        expect_end(rest, RM)?;
                        Ok(Command::DocRemove(id))
                    }
                    _ => Err(CommandError::Usage("doc add|list|rm")),
                }
            }
            "select" => {
                const USAGE: &str = "select <id>|none";
                match next_word(rest) {
                    Some(("none", rest)) => {
                        expect_end(rest, USAGE)?;
                        Ok(Command::Select(None))
                    }
                    word => {
                        let (id, rest) = parse_id(word, USAGE)?;
                        expect_end(rest, USAGE)?;
                        Ok(Command::Select(Some(id)))
                    }
                }
            }
            "original" => Ok(Command::Original(text_argument(rest))),
            "sanitized" => Ok(Command::Sanitized(text_argument(rest))),
            "mode" => {
                const USAGE: &str = "mode auto|manual";
                let mode = match next_word(rest) {
                    Some(("auto", rest)) => {
                        expect_end(rest, USAGE)?;
                        DerivationMode::Auto
                    }
                    Some(("manual", rest)) => {
                        expect_end(rest, USAGE)?;
                        DerivationMode::Manual
                    }
                    _ => return Err(CommandError::Usage(USAGE)),
                };
                Ok(Command::Mode(mode))
            }
            "write" => {
                const USAGE: &str = "write original|sanitized";
                let field = match next_word(rest) {
                    Some(("original", rest)) => {
                        expect_end(rest, USAGE)?;
                        ContentField::Original
                    }
                    Some(("sanitized", rest)) => {
                        expect_end(rest, USAGE)?;
                        ContentField::Sanitized
                    }
                    _ => return Err(CommandError::Usage(USAGE)),
                };
                Ok(Command::Write(field))
            }
            "show" => Ok(Command::Show),
            "save" => Ok(Command::Save),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
