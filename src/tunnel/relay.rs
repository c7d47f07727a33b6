//! Raw byte relay between two upgraded connections.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const BUFFER_SIZE: usize = 8 * 1024;

/// Which leg stopped the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The browser side closed or failed.
    Client,
    /// The remote side closed or failed.
    Remote,
}

/// Result of a finished relay.
#[derive(Debug)]
pub struct RelayOutcome {
    pub ended_by: RelayEnd,
    /// Bytes copied from the browser to the remote.
    pub upstream_bytes: u64,
    /// Bytes copied from the remote to the browser.
    pub downstream_bytes: u64,
    pub error: Option<io::Error>,
}

/// Copy bytes both ways until either side finishes, then shut both down.
///
/// There is no half-closed state: EOF or an error on one leg tears down the
/// other. Frames are not parsed. Both directions are counted, including
/// whatever was written before a failure.
pub async fn relay<C, R>(client: C, remote: R) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);
    let mut upstream_bytes = 0;
    let mut downstream_bytes = 0;

    let (ended_by, result) = tokio::select! {
        res = pump(&mut client_read, &mut remote_write, &mut upstream_bytes) => (RelayEnd::Client, res),
        res = pump(&mut remote_read, &mut client_write, &mut downstream_bytes) => (RelayEnd::Remote, res),
    };

    let _ = client_write.shutdown().await;
    let _ = remote_write.shutdown().await;

    RelayOutcome {
        ended_by,
        upstream_bytes,
        downstream_bytes,
        error: result.err(),
    }
}

/// Copy until EOF, adding every written chunk to `copied`.
async fn pump<Rd, Wr>(reader: &mut Rd, writer: &mut Wr, copied: &mut u64) -> io::Result<()>
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}
