use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

use crate::common::protocol::is_replayable_line;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
/// One resend after a dropped connection, then give up.
const MAX_ATTEMPTS: usize = 2;

type Request = (String, oneshot::Sender<String>);

#[derive(Default)]
pub struct ChatService {
    /// Sender used to hand a command to the background task and wait for its response.
    pub tx: Option<mpsc::UnboundedSender<Request>>,
    /// Keep the background task handle so it stays alive for the lifetime of the service
    pub _bg: Option<tokio::task::JoinHandle<()>>,
    host: Option<String>,
}

enum Exchange {
    Reply(String),
    /// The request never left the client.
    NotSent(std::io::Error),
    /// The request was flushed but no reply came back; the server may have run it.
    NoReply(String),
}

async fn open(host: &str) -> std::io::Result<(BufReader<OwnedReadHalf>, BufWriter<OwnedWriteHalf>)> {
    let stream = TcpStream::connect(host).await?;
    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), BufWriter::new(writer)))
}

async fn write_line(writer: &mut BufWriter<OwnedWriteHalf>, cmd: &str) -> std::io::Result<()> {
    writer.write_all(cmd.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn exchange(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut BufWriter<OwnedWriteHalf>,
    cmd: &str,
) -> Exchange {
    if let Err(e) = write_line(writer, cmd).await {
        return Exchange::NotSent(e);
    }
    let mut line = String::new();
    match timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => Exchange::NoReply("server closed connection".to_string()),
        Ok(Ok(_)) => Exchange::Reply(line.trim().to_string()),
        Ok(Err(e)) => Exchange::NoReply(e.to_string()),
        Err(_) => Exchange::NoReply("response timed out".to_string()),
    }
}

impl ChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the connection and the background task
    pub async fn reset(&mut self) {
        self.tx = None;
        if let Some(handle) = self._bg.take() {
            handle.abort();
        }
        self.host = None;
    }

    /// Ensure there is an active background task connected to `host`.
    pub async fn ensure_connected(&mut self, host: &str) -> anyhow::Result<()> {
        if self.tx.is_some() && self.host.as_deref() == Some(host) {
            return Ok(());
        }
        if self.tx.is_some() {
            self.reset().await;
        }

        let host = host.to_string();
        let (mut reader, mut writer) = open(&host).await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        let task_host = host.clone();

        // Commands are processed one at a time. A command that never reached
        // the server is resent on a fresh connection. Once written, only
        // replayable commands are resent; `/send` and friends answer `ERR:`.
        let handle = tokio::spawn(async move {
            while let Some((cmd, resp_tx)) = rx.recv().await {
                let replayable = is_replayable_line(&cmd);
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let (failure, resend) = match exchange(&mut reader, &mut writer, &cmd).await {
                        Exchange::Reply(resp) => {
                            let _ = resp_tx.send(resp);
                            break;
                        }
                        Exchange::NotSent(e) => (e.to_string(), attempt < MAX_ATTEMPTS),
                        Exchange::NoReply(reason) => (reason, replayable && attempt < MAX_ATTEMPTS),
                    };
                    log::warn!("[CLIENT:SVC] {} (attempt {}), reconnecting...", failure, attempt);

                    // a late reply on the old connection would answer the next command
                    let reconnected = match open(&task_host).await {
                        Ok((r, w)) => {
                            reader = r;
                            writer = w;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    if !resend {
                        let _ = resp_tx.send(format!("ERR: connection lost: {}", failure));
                        break;
                    }
                    if let Err(e) = reconnected {
                        let _ = resp_tx.send(format!("ERR: reconnect failed: {}", e));
                        break;
                    }
                }
            }
        });

        log::info!("[CLIENT:SVC] Connected to {}", host);
        self.tx = Some(tx);
        self._bg = Some(handle);
        self.host = Some(host);
        Ok(())
    }

    /// Send a command and wait for the single-line response from the server.
    pub async fn send_command(&mut self, host: &str, cmd: String) -> anyhow::Result<String> {
        self.ensure_connected(host).await?;
        let tx = self.tx.as_ref().ok_or_else(|| anyhow::anyhow!("not connected"))?;
        let (resp_tx, resp_rx) = oneshot::channel();
        if tx.send((cmd, resp_tx)).is_err() {
            // background task is gone, start over on the next call
            self.reset().await;
            return Err(anyhow::anyhow!("send failed: background task ended"));
        }
        let resp = resp_rx
            .await
            .map_err(|_| anyhow::anyhow!("response channel closed before response"))?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Accepts connections, reads one line from each and counts it. Replies
    /// `OK: []` only once `answer_from` lines have been seen; otherwise hangs up.
    async fn flaky_server(answer_from: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let (r, mut w) = stream.into_split();
                    let mut reader = BufReader::new(r);
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n >= answer_from {
                        let _ = w.write_all(b"OK: []\n").await;
                        let _ = w.flush().await;
                    }
                });
            }
        });
        (addr, seen)
    }

    #[tokio::test]
    async fn lost_reply_to_send_is_not_resent() {
        let (addr, seen) = flaky_server(usize::MAX).await;
        let mut svc = ChatService::new();
        let resp = svc.send_command(&addr, "/send tok 2 for sam only".to_string()).await.unwrap();
        assert!(resp.starts_with("ERR:"), "got {}", resp);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lost_reply_to_a_read_is_retried_once() {
        let (addr, seen) = flaky_server(2).await;
        let mut svc = ChatService::new();
        let resp = svc.send_command(&addr, "/threads tok".to_string()).await.unwrap();
        assert_eq!(resp, "OK: []");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn service_keeps_working_after_a_lost_send() {
        let (addr, seen) = flaky_server(2).await;
        let mut svc = ChatService::new();
        let first = svc.send_command(&addr, "/send tok 2 hello".to_string()).await.unwrap();
        assert!(first.starts_with("ERR:"));
        let second = svc.send_command(&addr, "/threads tok".to_string()).await.unwrap();
        assert_eq!(second, "OK: []");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
