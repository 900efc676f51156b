use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::lifecycle::{SocketCloser, StopFlag, WorkerSet};
use super::protocol::{CodecError, MAX_FRAME_SIZE};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);
const PUBLISH_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const GREETING: &[u8] = b"hello";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed")]
    Closed,
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("reply attempted with no pending request")]
    NoPendingRequest,
    #[error("unexpected greeting from publisher")]
    BadGreeting,
    #[error("worker set is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed | Self::ShuttingDown => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_closed(reader, &mut len_buf)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload)?;
    Ok(payload)
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(e.into()),
    }
}

/// Connects, retrying refused attempts until `timeout` runs out so the
/// remote end may bind slightly after we start connecting.
pub fn connect_with_retry(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    connect_until(addr, timeout, &StopFlag::new())
}

/// Like [`connect_with_retry`], but gives up with `Interrupted` as soon as
/// `stop` is set.
pub fn connect_until(addr: &str, timeout: Duration, stop: &StopFlag) -> io::Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.is_set() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                format!("connect to {addr} stopped"),
            ));
        }
        match TcpStream::connect(addr) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused && Instant::now() < deadline => {
                thread::sleep(CONNECT_RETRY_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reply side of a request/reply pair. Serves one requester at a time and
/// one request at a time; the next requester is accepted once the current
/// one hangs up.
pub struct Replier {
    listener: TcpListener,
    local_addr: SocketAddr,
    peer: Option<(TcpStream, u64)>,
    closer: SocketCloser,
}

impl Replier {
    pub fn bind<A: ToSocketAddrs>(addr: A, closer: SocketCloser) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        closer.track_listener(local_addr);

        Ok(Self {
            listener,
            local_addr,
            peer: None,
            closer,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closer.is_closed() {
            return Err(TransportError::Closed);
        }

        if self.peer.is_none() {
            let (stream, addr) = self.listener.accept()?;
            if self.closer.is_closed() {
                return Err(TransportError::Closed);
            }
            stream.set_nodelay(true)?;
            let token = self.closer.track_stream(&stream)?;
            log::debug!("Replier {} accepted {}", self.local_addr, addr);
            self.peer = Some((stream, token));
        }

        let Some((stream, _)) = self.peer.as_mut() else {
            return Err(TransportError::Closed);
        };
        let result = read_frame(stream);
        if result.is_err() {
            self.drop_peer();
        }
        result
    }

    pub fn reply(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let (stream, _) = self
            .peer
            .as_mut()
            .ok_or(TransportError::NoPendingRequest)?;
        let result = write_frame(stream, payload);
        if result.is_err() {
            self.drop_peer();
        }
        result
    }

    fn drop_peer(&mut self) {
        if let Some((_, token)) = self.peer.take() {
            self.closer.untrack(token);
        }
    }
}

pub struct Requester {
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl Requester {
    pub fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let stream = connect_with_retry(addr, timeout)?;
        let remote_addr = stream.peer_addr()?;
        Ok(Self {
            stream,
            remote_addr,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        write_frame(&mut self.stream, payload)?;
        read_frame(&mut self.stream)
    }
}

/// Fan-out side of publish/subscribe. Subscribers are accepted by a
/// background worker; a subscriber whose write fails is dropped for good.
pub struct Publisher {
    local_addr: SocketAddr,
    subscribers: Arc<Mutex<Vec<TcpStream>>>,
}

impl Publisher {
    pub fn bind<A: ToSocketAddrs>(addr: A, workers: &WorkerSet) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let subscribers = Arc::new(Mutex::new(Vec::new()));

        let closer = SocketCloser::new();
        closer.track_listener(local_addr);

        let accepted = Arc::clone(&subscribers);
        let accept_closer = closer.clone();
        workers.spawn(
            format!("publisher-accept-{}", local_addr.port()),
            closer,
            move |stop| {
                while !stop.is_set() {
                    let (mut stream, addr) = match listener.accept() {
                        Ok(conn) => conn,
                        Err(e) => {
                            log::error!("Publisher {} accept failed: {}", local_addr, e);
                            break;
                        }
                    };
                    if stop.is_set() {
                        break;
                    }
                    // Greeting under the lock: once a subscriber has read it,
                    // every later publish includes that subscriber.
                    let mut subscribers = accepted.lock();
                    if let Err(e) = register_subscriber(&mut stream, &accept_closer) {
                        log::warn!("Dropping subscriber {} on {}: {}", addr, local_addr, e);
                        continue;
                    }
                    log::debug!("Publisher {} gained subscriber {}", local_addr, addr);
                    subscribers.push(stream);
                }
            },
        )?;

        Ok(Self {
            local_addr,
            subscribers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Sends `payload` to every subscriber and returns how many received it.
    pub fn publish(&self, payload: &[u8]) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|stream| match write_frame(stream, payload) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Publisher {} dropped subscriber {:?}: {}",
                    self.local_addr,
                    stream.peer_addr().ok(),
                    e
                );
                false
            }
        });
        subscribers.len()
    }
}

fn register_subscriber(stream: &mut TcpStream, closer: &SocketCloser) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(PUBLISH_WRITE_TIMEOUT))?;
    closer.track_stream(stream)?;
    write_frame(stream, GREETING)
}

pub struct Subscriber {
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl Subscriber {
    /// Connects and waits for the publisher's greeting, so by the time this
    /// returns every later publish reaches us.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        Self::connect_until(addr, timeout, &StopFlag::new())
    }

    /// [`Subscriber::connect`] for worker threads, abandoned once `stop` is set.
    pub fn connect_until(
        addr: &str,
        timeout: Duration,
        stop: &StopFlag,
    ) -> Result<Self, TransportError> {
        let mut stream = connect_until(addr, timeout, stop)?;
        let remote_addr = stream.peer_addr()?;

        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        if read_frame(&mut stream)? != GREETING {
            return Err(TransportError::BadGreeting);
        }
        stream.set_read_timeout(None)?;

        Ok(Self {
            stream,
            remote_addr,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut self.stream)
    }
}
