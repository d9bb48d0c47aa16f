//! Authentication token storage.
//!
//! The token lives in a single file under the config directory: `.token`, or
//! `.token.dev` when talking to a server on localhost, so a development login
//! never overwrites a production one.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use todo_tracker::tokens::validate_token_plaintext;
use todo_tracker::validator::Validator;

const TOKEN_FILE: &str = ".token";
const DEV_TOKEN_FILE: &str = ".token.dev";

/// `$HOME/.config/tt`
pub fn default_config_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set; pass --config-dir")?;
    Ok(PathBuf::from(home).join(".config").join("tt"))
}

/// Whether `server_url` points at this machine
pub fn is_local_server(server_url: &str) -> bool {
    reqwest::Url::parse(server_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

/// Reads and writes the token file
#[derive(Debug, Clone)]
pub struct TokenManager {
    config_dir: PathBuf,
    is_dev: bool,
}

impl TokenManager {
    pub fn new(config_dir: impl Into<PathBuf>, is_dev: bool) -> Self {
        Self {
            config_dir: config_dir.into(),
            is_dev,
        }
    }

    /// Pick the dev or regular file from the server URL.
    pub fn for_server(config_dir: impl Into<PathBuf>, server_url: &str) -> Self {
        Self::new(config_dir, is_local_server(server_url))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn token_file(&self) -> PathBuf {
        let name = if self.is_dev { DEV_TOKEN_FILE } else { TOKEN_FILE };
        self.config_dir.join(name)
    }

    /// Write `token`, creating the config directory if needed. The file is
    /// readable by the owner only.
    pub fn save(&self, token: &str) -> Result<()> {
        fs::create_dir_all(&self.config_dir).with_context(|| {
            format!("failed to create {}", self.config_dir.display())
        })?;

        let path = self.token_file();
        fs::write(&path, token).with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict {}", path.display()))?;
        }

        log::debug!("saved token to {}", path.display());
        Ok(())
    }

    /// Read the stored token, checking it is well formed.
    pub fn load(&self) -> Result<String> {
        let path = self.token_file();
        let token = fs::read_to_string(&path).with_context(|| {
            format!("no saved token at {}; run `tt auth` first", path.display())
        })?;
        let token = token.trim().to_string();

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &token);
        if !v.valid() {
            anyhow::bail!("invalid token in {}; run `tt auth` again", path.display());
        }
        Ok(token)
    }

    pub fn delete(&self) -> Result<()> {
        let path = self.token_file();
        fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))
    }
}
