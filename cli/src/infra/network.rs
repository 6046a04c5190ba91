//! Network infrastructure — implements `NetworkProbe` over tokio TCP.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::application::ports::NetworkProbe;
use crate::domain::error::ProbeError;

/// Upper bound on one API response.
pub const MAX_RESPONSE_BYTES: usize = 4096;

/// Production implementation that performs real network checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioNetworkProbe;

impl NetworkProbe for TokioNetworkProbe {
    async fn connect(&self, address: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
        let stream = open(address, port, timeout).await?;
        drop(stream);
        Ok(())
    }

    async fn exchange(
        &self,
        address: &str,
        port: u16,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ProbeError> {
        tokio::time::timeout(timeout, async {
            let mut stream = open(address, port, timeout).await?;
            stream.write_all(request).await.map_err(classify)?;
            read_response(&mut stream).await
        })
        .await
        .map_err(|_| ProbeError::Timeout)?
    }
}

async fn open(address: &str, port: u16, timeout: Duration) -> Result<TcpStream, ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            tracing::trace!(address, port, error = %e, "connect failed");
            Err(classify(e))
        }
        Err(_) => Err(ProbeError::Timeout),
    }
}

/// Read until the peer closes, sends a NUL terminator, or the buffer is full.
async fn read_response(stream: &mut TcpStream) -> Result<Vec<u8>, ProbeError> {
    let mut buf = Vec::with_capacity(MAX_RESPONSE_BYTES);
    let mut chunk = [0u8; 1024];
    while buf.len() < MAX_RESPONSE_BYTES {
        let n = stream.read(&mut chunk).await.map_err(classify)?;
        if n == 0 {
            break;
        }
        let take = n.min(MAX_RESPONSE_BYTES - buf.len());
        buf.extend_from_slice(&chunk[..take]);
        if chunk[..take].contains(&0) {
            break;
        }
    }
    Ok(buf)
}

fn classify(e: std::io::Error) -> ProbeError {
    match e.kind() {
        ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
        ErrorKind::TimedOut => ProbeError::Timeout,
        _ => ProbeError::Io(e.to_string()),
    }
}
