//! Peer channel over FTP to a record-oriented host
//!
//! Datasets are addressed by their quoted fully qualified names and moved in
//! binary mode, so records keep their encoding byte for byte.

use async_ftp::types::FileType;
use async_ftp::FtpStream;
use futures::future::BoxFuture;
use tracing::{debug, info};

use super::dataset::{COMMANDS_DATASET, GAMESTAT_DATASET};
use super::transport::{PeerConnection, TransportError};

/// Where and how to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl FtpTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Server reply for a dataset that does not exist
const REPLY_UNAVAILABLE: &str = "550";

fn quoted(dataset: &str) -> String {
    format!("'{dataset}'")
}

fn is_absent(reply: &str) -> bool {
    reply.contains(REPLY_UNAVAILABLE)
}

pub struct FtpConnection {
    stream: FtpStream,
}

impl FtpConnection {
    /// Log in, switch to binary and drop both datasets left by an earlier session
    pub async fn open(target: &FtpTarget) -> Result<Self, TransportError> {
        let addr = target.addr();
        let failed = |e: async_ftp::FtpError| TransportError::ConnectFailed(format!("{addr}: {e}"));

        let mut stream = FtpStream::connect(addr.as_str()).await.map_err(failed)?;
        stream
            .login(&target.user, &target.password)
            .await
            .map_err(failed)?;
        stream
            .transfer_type(FileType::Binary)
            .await
            .map_err(failed)?;

        let mut connection = Self { stream };
        for dataset in [GAMESTAT_DATASET, COMMANDS_DATASET] {
            connection
                .remove(dataset)
                .await
                .map_err(TransportError::ConnectFailed)?;
        }
        info!(addr = %addr, user = %target.user, "FTP peer attached");
        Ok(connection)
    }

    /// Delete a dataset; a missing one is not an error
    async fn remove(&mut self, dataset: &str) -> Result<(), String> {
        match self.stream.rm(&quoted(dataset)).await {
            Ok(()) => {
                debug!(dataset, "Removed dataset");
                Ok(())
            }
            Err(e) if is_absent(&e.to_string()) => Ok(()),
            Err(e) => Err(format!("{dataset}: {e}")),
        }
    }
}

impl PeerConnection for FtpConnection {
    fn upload(&mut self, records: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let mut reader = records.as_slice();
            self.stream
                .put(&quoted(GAMESTAT_DATASET), &mut reader)
                .await
                .map_err(|e| TransportError::WriteFailed(format!("{GAMESTAT_DATASET}: {e}")))?;
            debug!(bytes = records.len(), "Uploaded records");
            Ok(())
        })
    }

    fn download(&mut self) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            let bytes = match self.stream.simple_retr(&quoted(COMMANDS_DATASET)).await {
                Ok(cursor) => cursor.into_inner(),
                Err(e) if is_absent(&e.to_string()) => return Ok(Vec::new()),
                Err(e) => {
                    return Err(TransportError::ReadFailed(format!(
                        "{COMMANDS_DATASET}: {e}"
                    )))
                }
            };

            // Consume so the next cycle does not replay these commands
            self.remove(COMMANDS_DATASET)
                .await
                .map_err(TransportError::ReadFailed)?;
            debug!(bytes = bytes.len(), "Downloaded commands");
            Ok(bytes)
        })
    }
}
