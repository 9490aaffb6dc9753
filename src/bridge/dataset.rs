//! Peer channel realized as a shared dataset directory
//!
//! The bridge writes `DOOM.GAMESTAT` and consumes `DOOM.COMMANDS`. Writes go
//! through a temp file and rename so the peer never reads a partial batch.
//! Commands are claimed by renaming before reading for the same reason.
//! Connecting discards whatever an earlier session left in the directory.

use std::io;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::{debug, info};

use super::transport::{PeerConnection, PeerConnector, TransportError};

pub const GAMESTAT_DATASET: &str = "DOOM.GAMESTAT";
pub const COMMANDS_DATASET: &str = "DOOM.COMMANDS";

#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetConnector;

impl PeerConnector for DatasetConnector {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn PeerConnection>, TransportError>> {
        Box::pin(async move {
            let root = PathBuf::from(endpoint);
            let meta = tokio::fs::metadata(&root)
                .await
                .map_err(|e| TransportError::ConnectFailed(format!("{endpoint}: {e}")))?;
            if !meta.is_dir() {
                return Err(TransportError::ConnectFailed(format!(
                    "{endpoint}: not a directory"
                )));
            }
            let connection = DatasetConnection::new(root);
            connection
                .clear_leftovers()
                .await
                .map_err(|e| TransportError::ConnectFailed(format!("{endpoint}: {e}")))?;
            info!(endpoint, "Dataset directory attached");
            Ok(Box::new(connection) as Box<dyn PeerConnection>)
        })
    }
}

#[derive(Debug)]
pub struct DatasetConnection {
    root: PathBuf,
}

impl DatasetConnection {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn dataset(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Remove both datasets and any temp or claimed copies
    async fn clear_leftovers(&self) -> io::Result<()> {
        for name in [GAMESTAT_DATASET, COMMANDS_DATASET] {
            let path = self.dataset(name);
            for stale in [sibling(&path, "tmp"), sibling(&path, "taken"), path] {
                match tokio::fs::remove_file(&stale).await {
                    Ok(()) => debug!(path = %stale.display(), "Discarded leftover dataset"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

impl PeerConnection for DatasetConnection {
    fn upload(&mut self, records: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let path = self.dataset(GAMESTAT_DATASET);
            write_atomic(&path, &records)
                .await
                .map_err(|e| TransportError::WriteFailed(format!("{}: {e}", path.display())))?;
            debug!(bytes = records.len(), "Uploaded records");
            Ok(())
        })
    }

    fn download(&mut self) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            let path = self.dataset(COMMANDS_DATASET);
            let claimed = sibling(&path, "taken");
            let read_failed =
                |e: io::Error| TransportError::ReadFailed(format!("{}: {e}", path.display()));

            match tokio::fs::rename(&path, &claimed).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(read_failed(e)),
            }

            let bytes = tokio::fs::read(&claimed).await.map_err(read_failed)?;
            tokio::fs::remove_file(&claimed).await.map_err(read_failed)?;
            debug!(bytes = bytes.len(), "Downloaded commands");
            Ok(bytes)
        })
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = sibling(path, "tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
