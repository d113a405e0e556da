//! TCP transport for DNS queries.
//!
//! Used when a UDP reply comes back truncated. TCP DNS messages are
//! prefixed with a 2-byte big-endian length.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Send `query` to `server` over a new TCP connection and read one reply.
pub async fn exchange(server: SocketAddr, query: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true)?;

    write_dns_message(&mut stream, query).await?;
    debug!(%server, bytes = query.len(), "TCP query sent");

    let response = read_dns_message(&mut stream).await?;
    debug!(%server, bytes = response.len(), "TCP response received");

    Ok(response)
}

/// Write `message` with its length prefix.
pub async fn write_dns_message<W>(stream: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "DNS message too large for TCP framing",
        )
    })?;

    let mut framed = Vec::with_capacity(2 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);

    stream.write_all(&framed).await?;
    stream.flush().await
}

/// Read one length-prefixed DNS message, returned without its prefix.
pub async fn read_dns_message<R>(stream: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let mut message = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut message).await?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn framing_survives_split_writes() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            client.write_all(&[0x00, 0x05, b'h', b'e']).await.unwrap();
            client.write_all(b"llo").await.unwrap();
        });

        let message = read_dns_message(&mut server).await.unwrap();
        assert_eq!(message, b"hello");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn write_prefixes_length() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_dns_message(&mut client, b"abc").await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, [0x00, 0x03, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn early_eof_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_all(&[0x00, 0x10, 0x01]).await.unwrap();
        drop(client);

        let err = read_dns_message(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
