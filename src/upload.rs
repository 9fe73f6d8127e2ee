use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::error::Result;
use crate::types::FileArtifact;

/// Receives packaged messages. Transfer is the host's job, not ours.
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn enqueue(&self, artifacts: Vec<FileArtifact>) -> Result<()>;
}

/// Writes each artifact into a directory, for use from the command line.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl UploadSink for DirectorySink {
    async fn enqueue(&self, artifacts: Vec<FileArtifact>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for artifact in artifacts {
            let path = self.dir.join(&artifact.name);
            tokio::fs::write(&path, artifact.content.as_bytes()).await?;
            info!(message_id = %artifact.message_id, path = %path.display(), "wrote artifact");
        }
        Ok(())
    }
}
