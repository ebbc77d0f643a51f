use bytes::Bytes;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, Receiver, UnboundedSender};
use tokio::time::timeout;

use respkv::codec::{parse_stream, DecodeError, Payload, ProtocolError, DEFAULT_MAX_BULK_LEN};
use respkv::frame::Frame;

/// Returns a sender whose chunks are written to a loopback socket, and the decoded stream of the
/// other end. Dropping the sender closes the writing side.
async fn create_tcp_connection() -> Result<(UnboundedSender<Vec<u8>>, Receiver<Payload>), std::io::Error>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            while let Some(data) = rx.recv().await {
                if socket.write_all(&data).await.is_err() {
                    break;
                }
            }
            let _ = socket.shutdown().await;
        }
    });

    let stream = TcpStream::connect(local_addr).await?;

    Ok((tx, parse_stream(stream, DEFAULT_MAX_BULK_LEN)))
}

async fn next(payloads: &mut Receiver<Payload>) -> Payload {
    timeout(Duration::from_secs(5), payloads.recv())
        .await
        .expect("timed out waiting for a payload")
        .expect("stream ended without a final error")
}

fn args(items: &[&str]) -> Frame {
    Frame::Array(items.iter().map(|s| Bytes::from(s.to_string())).collect())
}

#[tokio::test]
async fn test_parse_single_string() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(b"+OK\r\n".to_vec()).unwrap();

    assert_eq!(next(&mut payloads).await.unwrap(), Frame::Simple("OK".to_string()));
}

#[tokio::test]
async fn test_parse_array() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(b"*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n".to_vec())
        .unwrap();

    assert_eq!(
        next(&mut payloads).await.unwrap(),
        args(&["SET", "mykey", "myvalue"])
    );
}

#[tokio::test]
async fn test_parse_frame_split_across_writes() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    for chunk in ["*2\r", "\n$4\r\nEC", "HO\r\n$5", "\r\nhello", "\r\n"] {
        tx.send(chunk.as_bytes().to_vec()).unwrap();
        tokio::task::yield_now().await;
    }

    assert_eq!(next(&mut payloads).await.unwrap(), args(&["ECHO", "hello"]));
}

#[tokio::test]
async fn test_parse_pipelined_frames_in_order() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(
        b"*1\r\n$4\r\nPING\r\n:1000\r\n-Error message\r\n$-1\r\n*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n"
            .to_vec(),
    )
    .unwrap();

    assert_eq!(next(&mut payloads).await.unwrap(), args(&["PING"]));
    assert_eq!(next(&mut payloads).await.unwrap(), Frame::Integer(1000));
    assert_eq!(
        next(&mut payloads).await.unwrap(),
        Frame::Error("Error message".to_string())
    );
    assert_eq!(next(&mut payloads).await.unwrap(), Frame::Null);
    assert_eq!(next(&mut payloads).await.unwrap(), args(&["DEL", "k"]));
}

#[tokio::test]
async fn test_protocol_error_does_not_end_the_stream() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(b"*x\r\n*1\r\n$4\r\nPING\r\n".to_vec()).unwrap();

    let err = next(&mut payloads).await.unwrap_err();
    assert!(!err.is_transport());
    assert!(matches!(
        err,
        DecodeError::Protocol(ProtocolError::InvalidArrayLength(ref s)) if s == "x"
    ));

    assert_eq!(next(&mut payloads).await.unwrap(), args(&["PING"]));
}

#[tokio::test]
async fn test_clean_close_ends_with_eof() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(b"+OK\r\n".to_vec()).unwrap();
    drop(tx);

    assert_eq!(next(&mut payloads).await.unwrap(), Frame::Simple("OK".to_string()));
    assert!(matches!(next(&mut payloads).await, Err(DecodeError::Eof)));
    assert!(payloads.recv().await.is_none());
}

#[tokio::test]
async fn test_close_in_the_middle_of_a_frame() {
    let (tx, mut payloads) = create_tcp_connection().await.unwrap();

    tx.send(b"*2\r\n$3\r\nGET\r\n".to_vec()).unwrap();
    drop(tx);

    let err = next(&mut payloads).await.unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEof));
    assert!(err.is_transport());
    assert!(payloads.recv().await.is_none());
}
