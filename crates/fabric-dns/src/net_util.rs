use bytes::BytesMut;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;

use dns_types::protocol::serialise::frame_tcp;

/// Read a DNS message from a TCP stream.
///
/// A DNS TCP message is slightly different to a DNS UDP message: it
/// has a big-endian u16 prefix giving the total length of the
/// message.  This is redundant (since the header is fixed-size and
/// says how many fields there are, and the fields contain length
/// information), but it means the entire message can be read before
/// parsing begins.
///
/// A stream which ends cleanly before a new length prefix gives
/// `TcpError::Closed`.
pub async fn read_tcp_bytes<R: AsyncRead + Unpin>(stream: &mut R) -> Result<BytesMut, TcpError> {
    let expected = match stream.read_u16().await {
        Ok(size) => size as usize,
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(TcpError::Closed)
        }
        Err(error) => return Err(TcpError::IO { id: None, error }),
    };

    let mut bytes = BytesMut::zeroed(expected);
    let mut filled = 0;
    while filled < expected {
        match stream.read(&mut bytes[filled..]).await {
            Ok(0) => {
                return Err(TcpError::TooShort {
                    id: id_of(&bytes[..filled]),
                    expected,
                    actual: filled,
                });
            }
            Ok(size) => filled += size,
            Err(error) => {
                return Err(TcpError::IO {
                    id: id_of(&bytes[..filled]),
                    error,
                })
            }
        }
    }

    Ok(bytes)
}

fn id_of(bytes: &[u8]) -> Option<u16> {
    if bytes.len() >= 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// An error that can occur when reading a DNS TCP message.
#[derive(Debug)]
pub enum TcpError {
    Closed,
    TooShort {
        id: Option<u16>,
        expected: usize,
        actual: usize,
    },
    IO {
        id: Option<u16>,
        error: io::Error,
    },
}

impl fmt::Display for TcpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TcpError::Closed => write!(f, "connection closed"),
            TcpError::TooShort {
                expected, actual, ..
            } => write!(f, "expected {expected} octets but got {actual}"),
            TcpError::IO { error, .. } => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for TcpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TcpError::IO { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Write a serialised message to a UDP socket.  The message should
/// already have been cut down to fit.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    bytes: &[u8],
) -> Result<(), io::Error> {
    sock.send_to(bytes, target).await?;
    Ok(())
}

/// Write a serialised message to a TCP stream, with its two-octet
/// length prefix.
pub async fn send_tcp_bytes<W: AsyncWrite + Unpin>(
    stream: &mut W,
    bytes: &[u8],
) -> Result<(), io::Error> {
    let framed =
        frame_tcp(bytes).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
    stream.write_all(&framed).await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_tcp_bytes_reads_one_message() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 4, 0x12, 0x34, 5, 6]).await.unwrap();

        let bytes = read_tcp_bytes(&mut server).await.unwrap();

        assert_eq!(&[0x12u8, 0x34, 5, 6][..], &bytes[..]);
    }

    #[tokio::test]
    async fn read_tcp_bytes_reads_messages_in_turn() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_all(&[0, 2, 1, 2]).await.unwrap();
        assert_eq!(&[1u8, 2][..], &read_tcp_bytes(&mut server).await.unwrap()[..]);

        client.write_all(&[0, 3, 3, 4, 5]).await.unwrap();
        assert_eq!(&[3u8, 4, 5][..], &read_tcp_bytes(&mut server).await.unwrap()[..]);
    }

    #[tokio::test]
    async fn read_tcp_bytes_closed() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        assert!(matches!(
            read_tcp_bytes(&mut server).await,
            Err(TcpError::Closed)
        ));
    }

    #[tokio::test]
    async fn read_tcp_bytes_too_short() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 10, 0x12, 0x34, 5]).await.unwrap();
        drop(client);

        match read_tcp_bytes(&mut server).await {
            Err(TcpError::TooShort {
                id,
                expected,
                actual,
            }) => {
                assert_eq!(Some(0x1234), id);
                assert_eq!(10, expected);
                assert_eq!(3, actual);
            }
            other => panic!("expected TooShort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_tcp_bytes_adds_prefix() {
        let (mut client, mut server) = tokio::io::duplex(64);

        send_tcp_bytes(&mut server, &[9, 8, 7]).await.unwrap();
        drop(server);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();

        assert_eq!(vec![0u8, 3, 9, 8, 7], received);
    }

    #[tokio::test]
    async fn send_then_read_tcp_bytes() {
        let (mut client, mut server) = tokio::io::duplex(64);

        send_tcp_bytes(&mut client, &[1, 2, 3, 4]).await.unwrap();

        assert_eq!(
            &[1u8, 2, 3, 4][..],
            &read_tcp_bytes(&mut server).await.unwrap()[..]
        );
    }

    #[tokio::test]
    async fn send_udp_bytes_to_delivers() {
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send_udp_bytes_to(&sender, receiver.local_addr().unwrap(), &[1, 2, 3])
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (size, peer) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(3, size);
        assert_eq!(&[1u8, 2, 3], &buf[..size]);
        assert_eq!(sender.local_addr().unwrap(), peer);
    }
}
