//! Blocking reads against a scripted RESP server
//!
//! The server answers every command with `+OK` except `XREADGROUP`, which is
//! held for a fixed delay to stand in for an empty BLOCK window.

use queue_worker::{QueueTransport, RedisStreamTransport};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const STREAM: &str = "emails";

/// One entry in stream `emails` carrying `{"id": 1}`
const ONE_ENTRY: &str = "*1\r\n*2\r\n$6\r\nemails\r\n*1\r\n*2\r\n$15\r\n1700000000000-0\r\n*2\r\n$3\r\njob\r\n$9\r\n{\"id\": 1}\r\n";

/// Nil array: BLOCK elapsed with nothing to read
const NIL: &str = "*-1\r\n";

async fn read_command(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

async fn serve(socket: TcpStream, read_delay: Duration, read_reply: &'static str) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    while let Some(args) = read_command(&mut reader).await {
        let reply = match args.first().map(|a| a.to_ascii_uppercase()).as_deref() {
            Some("XREADGROUP") => {
                tokio::time::sleep(read_delay).await;
                read_reply
            }
            _ => "+OK\r\n",
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Start the server and return its URL
async fn start_server(read_delay: Duration, read_reply: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, read_delay, read_reply));
        }
    });

    format!("redis://{}", addr)
}

async fn transport(url: &str, config: ConnectionManagerConfig) -> RedisStreamTransport {
    let client = redis::Client::open(url).unwrap();
    let manager = ConnectionManager::new_with_config(client, config).await.unwrap();
    RedisStreamTransport::new(manager, "email-workers", "worker-1")
}

#[tokio::test]
async fn test_block_longer_than_default_response_timeout() {
    let url = start_server(Duration::from_millis(1500), ONE_ENTRY).await;
    let wait_time = Duration::from_secs(2);
    let transport = transport(&url, RedisStreamTransport::connection_config(wait_time)).await;

    let messages = transport.receive(STREAM, 10, wait_time).await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].receipt_handle.as_str(), "1700000000000-0");
    assert_eq!(messages[0].body, r#"{"id": 1}"#);
}

#[tokio::test]
async fn test_empty_block_window_is_empty_receive() {
    let url = start_server(Duration::from_millis(1500), NIL).await;
    let wait_time = Duration::from_secs(1);
    let transport = transport(&url, RedisStreamTransport::connection_config(wait_time)).await;

    let messages = transport.receive(STREAM, 10, wait_time).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_client_side_timeout_during_block_is_empty_receive() {
    // Reply arrives after the manager has given up on it
    let url = start_server(Duration::from_secs(2), NIL).await;
    let config = ConnectionManagerConfig::new().set_response_timeout(Some(Duration::from_millis(200)));
    let transport = transport(&url, config).await;

    let messages = transport
        .receive(STREAM, 10, Duration::from_secs(20))
        .await
        .unwrap();
    assert!(messages.is_empty());
}
