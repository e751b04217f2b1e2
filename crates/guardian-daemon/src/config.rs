//! Command-line arguments and the validated daemon configuration.

use clap::Parser;
use guardian_core::{DerivationMode, DeselectPolicy, EngineConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "guardian-daemon")]
#[command(about = "Edit config files alongside their sanitized copies")]
pub struct Args {
    /// Directory holding the catalog (supports ~ for home directory)
    #[arg(long, env = "GUARDIAN_DATA_DIR", default_value = "~/.config-guardian")]
    pub data_dir: String,

    /// Debounce window before edits are saved
    #[arg(long, env = "GUARDIAN_SAVE_DELAY_MS", default_value_t = 1500)]
    pub save_delay_ms: u64,

    /// Debounce window before the sanitized preview is re-derived
    #[arg(long, env = "GUARDIAN_DERIVE_DELAY_MS", default_value_t = 800)]
    pub derive_delay_ms: u64,

    /// Start in manual mode (sanitized content is hand-edited)
    #[arg(long, env = "GUARDIAN_MANUAL")]
    pub manual: bool,

    /// Drop pending saves when the selection changes instead of flushing them
    #[arg(long, env = "GUARDIAN_DISCARD_ON_DESELECT")]
    pub discard_on_deselect: bool,

    /// Write files without asking for confirmation
    #[arg(long, env = "GUARDIAN_YES")]
    pub yes: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Daemon configuration after validation.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub engine: EngineConfig,
    pub auto_confirm: bool,
}

impl DaemonConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.save_delay_ms == 0 {
            return Err(ConfigError::ZeroDelay("save-delay-ms"));
        }
        if args.derive_delay_ms == 0 {
            return Err(ConfigError::ZeroDelay("derive-delay-ms"));
        }

        let data_dir = expand_tilde(&args.data_dir);
        if data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }

        Ok(Self {
            data_dir,
            engine: EngineConfig {
                save_delay: Duration::from_millis(args.save_delay_ms),
                derive_delay: Duration::from_millis(args.derive_delay_ms),
                deselect_policy: if args.discard_on_deselect {
                    DeselectPolicy::Discard
                } else {
                    DeselectPolicy::Flush
                },
                initial_mode: if args.manual {
                    DerivationMode::Manual
                } else {
                    DerivationMode::Auto
                },
            },
            auto_confirm: args.yes,
        })
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--{0} must be greater than zero")]
    ZeroDelay(&'static str),

    #[error("--data-dir must not be empty")]
    EmptyDataDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("guardian-daemon").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_args(&parse(&["--data-dir", "/var/lib/guardian"])).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/guardian"));
        assert_eq!(config.engine.save_delay, Duration::from_millis(1500));
        assert_eq!(config.engine.derive_delay, Duration::from_millis(800));
        assert_eq!(config.engine.deselect_policy, DeselectPolicy::Flush);
        assert_eq!(config.engine.initial_mode, DerivationMode::Auto);
        assert!(!config.auto_confirm);
    }

    #[test]
    fn test_flags() {
        let config = DaemonConfig::from_args(&parse(&[
            "--data-dir",
            "/tmp/g",
            "--save-delay-ms",
            "200",
            "--manual",
            "--discard-on-deselect",
            "--yes",
        ]))
        .unwrap();

        assert_eq!(config.engine.save_delay, Duration::from_millis(200));
        assert_eq!(config.engine.deselect_policy, DeselectPolicy::Discard);
        assert_eq!(config.engine.initial_mode, DerivationMode::Manual);
        assert!(config.auto_confirm);
    }

    #[test]
    fn test_zero_delay_rejected() {
        let err = DaemonConfig::from_args(&parse(&["--data-dir", "/tmp/g", "--derive-delay-ms", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDelay("derive-delay-ms")));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.config-guardian"), home.join(".config-guardian"));
            assert_eq!(expand_tilde("~"), home);
        }
    }
}
