//! `PEER_ENDPOINT` parsing and transport selection
//!
//! `ftp://[user[:password]@]host[:port]` reaches a remote peer over FTP.
//! Anything else, with or without a `file://` prefix, is a dataset directory.

use futures::future::BoxFuture;

use super::dataset::DatasetConnector;
use super::ftp::{FtpConnection, FtpTarget};
use super::transport::{PeerConnection, PeerConnector, TransportError};

const FTP_SCHEME: &str = "ftp://";
const FILE_SCHEME: &str = "file://";
const DEFAULT_FTP_PORT: u16 = 21;
const DEFAULT_FTP_USER: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEndpoint {
    Directory(String),
    Ftp(FtpTarget),
}

impl PeerEndpoint {
    pub fn parse(endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = endpoint.trim();
        if let Some(rest) = endpoint.strip_prefix(FTP_SCHEME) {
            return parse_ftp(rest)
                .map(Self::Ftp)
                .ok_or_else(|| TransportError::ConnectFailed(format!("bad FTP endpoint: {endpoint}")));
        }
        let path = endpoint.strip_prefix(FILE_SCHEME).unwrap_or(endpoint);
        Ok(Self::Directory(path.to_string()))
    }
}

fn parse_ftp(rest: &str) -> Option<FtpTarget> {
    let authority = rest.trim_end_matches('/');
    let (credentials, host_port) = match authority.rsplit_once('@') {
        Some((credentials, host_port)) => (Some(credentials), host_port),
        None => (None, authority),
    };
    let (user, password) = match credentials {
        Some(credentials) => match credentials.split_once(':') {
            Some((user, password)) => (user, password),
            None => (credentials, ""),
        },
        None => (DEFAULT_FTP_USER, ""),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (host_port, DEFAULT_FTP_PORT),
    };
    if host.is_empty() || host.contains('/') || user.is_empty() {
        return None;
    }
    Some(FtpTarget {
        host: host.to_string(),
        port,
        user: user.to_string(),
        password: password.to_string(),
    })
}

/// Picks the transport from the endpoint's scheme on every connect
#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointConnector;

impl PeerConnector for EndpointConnector {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn PeerConnection>, TransportError>> {
        Box::pin(async move {
            match PeerEndpoint::parse(endpoint)? {
                PeerEndpoint::Directory(path) => DatasetConnector.connect(&path).await,
                PeerEndpoint::Ftp(target) => {
                    let connection = FtpConnection::open(&target).await?;
                    Ok(Box::new(connection) as Box<dyn PeerConnection>)
                }
            }
        })
    }
}
