use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 8;
const DEFAULT_USER: &str = "local";

/// Remote recipe catalog connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// `None` means offline: recommendations use locally stored recipes.
    pub catalog: Option<CatalogSettings>,
    pub catalog_timeout: Duration,
    pub user_id: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "glyco").context("Could not determine home directory")?;
        Self::with_data_dir(proj_dirs.data_dir().to_path_buf(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Build a config rooted at `data_dir`, reading settings through `var`.
    pub fn with_data_dir(
        data_dir: PathBuf,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("glyco.db");

        let catalog = var("GLYCO_CATALOG_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .map(|base_url| CatalogSettings {
                base_url,
                api_key: var("GLYCO_CATALOG_KEY").filter(|k| !k.trim().is_empty()),
            });

        let catalog_timeout = match var("GLYCO_CATALOG_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().with_context(|| {
                    format!("GLYCO_CATALOG_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'")
                })?;
                if secs == 0 {
                    bail!("GLYCO_CATALOG_TIMEOUT_SECS must be greater than 0");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_CATALOG_TIMEOUT_SECS),
        };

        let user_id = var("GLYCO_USER")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        Ok(Config {
            db_path,
            data_dir,
            catalog,
            catalog_timeout,
            user_id,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
