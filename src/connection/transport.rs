use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, connect};

use crate::error::TransportError;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a link reports back to the hub. Tagged with the link generation so
/// frames from a superseded link can be dropped.
#[derive(Debug)]
pub enum LinkFrame {
    Opened,
    Text(String),
    Closed(TransportError),
}

pub type LinkSender = mpsc::Sender<(u64, LinkFrame)>;

/// Handle to one live link. Closing is a request; the link confirms with a
/// final `LinkFrame::Closed`.
pub trait LinkHandle {
    fn close(&mut self);
}

/// Opens socket links. `open` must not block on the network: it reports
/// `Opened`, `Text` and `Closed` frames through `frames` as they happen.
pub trait Transport {
    fn open(&mut self, url: &str, generation: u64, frames: LinkSender) -> Box<dyn LinkHandle>;
}

/// Blocking tungstenite client, one listener thread per link.
#[derive(Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

struct WsLink {
    shutdown: Arc<AtomicBool>,
}

impl LinkHandle for WsLink {
    fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str, generation: u64, frames: LinkSender) -> Box<dyn LinkHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let url = url.to_string();
        thread::spawn(move || {
            let reason = run_listener(&url, generation, &frames, &flag);
            let _ = frames.send((generation, LinkFrame::Closed(reason)));
        });
        Box::new(WsLink { shutdown })
    }
}

fn set_read_timeout(stream: &MaybeTlsStream<TcpStream>, timeout: Duration) {
    let result = match stream {
        MaybeTlsStream::Plain(tcp) => tcp.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(tls) => tls.sock.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    };
    if let Err(err) = result {
        tracing::debug!(%err, "cannot set socket read timeout");
    }
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(io)
            if matches!(io.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

/// Runs until the link ends; returns why it ended.
fn run_listener(
    url: &str,
    generation: u64,
    frames: &LinkSender,
    shutdown: &AtomicBool,
) -> TransportError {
    let mut socket = match connect(url) {
        Ok((socket, _)) => socket,
        Err(err) => return TransportError::Connect(err.to_string()),
    };
    if shutdown.load(Ordering::SeqCst) {
        let _ = socket.close(None);
        return TransportError::Closed("closed by client".to_string());
    }
    set_read_timeout(socket.get_ref(), READ_POLL_INTERVAL);
    if frames.send((generation, LinkFrame::Opened)).is_err() {
        return TransportError::Closed("hub dropped".to_string());
    }

    loop {
        if shutdown.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            let _ = socket.flush();
            return TransportError::Closed("closed by client".to_string());
        }

        let message = match socket.read() {
            Ok(message) => message,
            Err(err) if is_timeout(&err) => continue,
            Err(tungstenite::Error::ConnectionClosed) => {
                return TransportError::Closed("socket closed".to_string());
            }
            Err(err) => return TransportError::Read(err.to_string()),
        };

        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Binary(binary) => match String::from_utf8(binary.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload));
                continue;
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|frame| frame.reason.as_str().to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "socket closed".to_string());
                return TransportError::Closed(reason);
            }
            _ => continue,
        };

        if frames.send((generation, LinkFrame::Text(text))).is_err() {
            let _ = socket.close(None);
            return TransportError::Closed("hub dropped".to_string());
        }
    }
}
