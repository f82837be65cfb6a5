use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{error::Result, types::Credential};

/// Persistence for the OAuth credential, so a rotated refresh token survives
/// restarts.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Returns `None` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Credential>>;

    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// Stores the credential as pretty printed JSON, readable by the owner only
/// on Unix.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// `<data_local_dir>/spotwatch/cache/token.json`
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("spotwatch/cache/token.json");
        path
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential: Credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(credential)?;

        // Restrict the file before the refresh token goes in, then swap it
        // into place so readers never see a partial write.
        let tmp = self.path.with_extension("json.tmp");
        async_fs::write(&tmp, b"").await?;
        restrict_to_owner(&tmp).await?;
        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    async_fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Keeps the credential in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: tokio::sync::Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.credential.lock().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.credential.lock().await = Some(credential.clone());
        Ok(())
    }
}
