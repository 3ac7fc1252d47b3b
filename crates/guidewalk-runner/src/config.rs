//! Runner configuration, read from `GUIDEWALK_*` environment variables.

use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};

pub const DEFAULT_LOGIN_URL: &str = "https://system.reins.jp/login/main/KG/GKG001200";

/// Program name reported in configuration errors.
const PROGRAM: &str = "guidewalk";

/// Settings shared by every exploration binary.
///
/// The binaries take no arguments: [`RunnerConfig::from_env`] ignores the
/// command line. The hidden long flags exist for embedding and tests.
#[derive(Debug, Clone, Parser)]
#[command(name = PROGRAM)]
pub struct RunnerConfig {
    /// Portal account name.
    #[arg(long, hide = true, env = "GUIDEWALK_USERNAME", hide_env_values = true)]
    pub username: String,

    /// Portal account password.
    #[arg(long, hide = true, env = "GUIDEWALK_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Run Chromium without a window.
    #[arg(long, hide = true, env = "GUIDEWALK_HEADLESS", default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Taxonomy database. Defaults to ~/.guidewalk/taxonomy.db.
    #[arg(long, hide = true, env = "GUIDEWALK_DB")]
    pub db: Option<PathBuf>,

    /// Chromium executable. Searched for when unset.
    #[arg(long, hide = true, env = "GUIDEWALK_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Portal login page.
    #[arg(long, hide = true, env = "GUIDEWALK_LOGIN_URL", default_value = DEFAULT_LOGIN_URL)]
    pub login_url: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, hide = true, env = "GUIDEWALK_LOG", default_value = "guidewalk=info,guidewalk_runner=info")]
    pub log_level: String,

    /// Legacy JSON location cache to import before the first run.
    #[arg(long, hide = true, env = "GUIDEWALK_LEGACY_LOCATIONS")]
    pub legacy_locations: Option<PathBuf>,

    /// Legacy JSON line cache to import before the first run.
    #[arg(long, hide = true, env = "GUIDEWALK_LEGACY_LINES")]
    pub legacy_lines: Option<PathBuf>,
}

impl RunnerConfig {
    /// Read the configuration from the environment alone.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from([PROGRAM])
    }

    pub fn db_path(&self) -> PathBuf {
        resolve_db_path(self.db.as_deref())
    }
}

/// Resolve the database path.
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".guidewalk")
        .join("taxonomy.db")
}
