use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::transport::TransportError;

const WAKE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct CloserState {
    next_token: u64,
    streams: Vec<(u64, TcpStream)>,
    listeners: Vec<SocketAddr>,
    closed: bool,
}

/// Unblocks a thread stuck in a blocking socket call from the outside.
///
/// Streams are shut down, which makes pending reads return end-of-file, and
/// listeners are woken with a throwaway connection so `accept` returns.
#[derive(Debug, Clone, Default)]
pub struct SocketCloser {
    inner: Arc<Mutex<CloserState>>,
}

impl SocketCloser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_stream(&self, stream: &TcpStream) -> io::Result<u64> {
        let clone = stream.try_clone()?;
        let mut state = self.inner.lock();
        if state.closed {
            let _ = clone.shutdown(Shutdown::Both);
        }
        let token = state.next_token;
        state.next_token += 1;
        state.streams.push((token, clone));
        Ok(token)
    }

    pub fn untrack(&self, token: u64) {
        self.inner.lock().streams.retain(|(t, _)| *t != token);
    }

    pub fn track_listener(&self, addr: SocketAddr) {
        self.inner.lock().listeners.push(addr);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn close(&self) {
        let listeners = {
            let mut state = self.inner.lock();
            state.closed = true;
            for (_, stream) in state.streams.drain(..) {
                let _ = stream.shutdown(Shutdown::Both);
            }
            std::mem::take(&mut state.listeners)
        };

        for addr in listeners {
            let _ = TcpStream::connect_timeout(&wake_addr(addr), WAKE_TIMEOUT);
        }
    }
}

fn wake_addr(mut addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}

struct Worker {
    name: String,
    stop: StopFlag,
    closer: SocketCloser,
    handle: JoinHandle<()>,
}

/// Every background thread of a session. Shutdown always runs
/// stop flags, then socket closure, then joins.
#[derive(Default)]
pub struct WorkerSet {
    workers: Mutex<Vec<Worker>>,
    stopping: AtomicBool,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(
        &self,
        name: impl Into<String>,
        closer: SocketCloser,
        body: F,
    ) -> Result<(), TransportError>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let name = name.into();
        let mut workers = self.workers.lock();
        if self.stopping.load(Ordering::SeqCst) {
            closer.close();
            return Err(TransportError::ShuttingDown);
        }

        reap_finished(&mut workers);

        let stop = StopFlag::new();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(thread_stop))?;

        log::debug!("Started worker {}", name);
        workers.push(Worker {
            name,
            stop,
            closer,
            handle,
        });
        Ok(())
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        {
            let _workers = self.workers.lock();
            self.stopping.store(true, Ordering::SeqCst);
        }

        loop {
            let batch = std::mem::take(&mut *self.workers.lock());
            if batch.is_empty() {
                break;
            }

            for worker in &batch {
                worker.stop.set();
            }
            for worker in &batch {
                worker.closer.close();
            }
            for worker in batch {
                if worker.handle.join().is_err() {
                    log::error!("Worker {} panicked", worker.name);
                } else {
                    log::debug!("Joined worker {}", worker.name);
                }
            }
        }
    }
}

/// Joins workers whose threads already returned, so short-lived receivers do
/// not pile up until shutdown.
fn reap_finished(workers: &mut Vec<Worker>) {
    let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(workers)
        .into_iter()
        .partition(|w| w.handle.is_finished());
    *workers = running;

    for worker in finished {
        if worker.handle.join().is_err() {
            log::error!("Worker {} panicked", worker.name);
        } else {
            log::debug!("Reaped worker {}", worker.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn closing_unblocks_accept_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let closer = SocketCloser::new();
        closer.track_listener(addr);

        let workers = WorkerSet::new();
        let exits = Arc::new(AtomicUsize::new(0));
        let thread_exits = Arc::clone(&exits);
        let thread_closer = closer.clone();

        workers
            .spawn("accept-test", closer, move |stop| {
                while !stop.is_set() {
                    let Ok((mut stream, _)) = listener.accept() else {
                        break;
                    };
                    if stop.is_set() {
                        break;
                    }
                    thread_closer.track_stream(&stream).unwrap();
                    let mut buf = [0u8; 1];
                    let _ = stream.read(&mut buf);
                }
                thread_exits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let _client = TcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        workers.shutdown();
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert!(workers.is_empty());
    }

    #[test]
    fn spawn_refused_after_shutdown() {
        let workers = WorkerSet::new();
        workers.shutdown();

        let result = workers.spawn("late", SocketCloser::new(), |_| {});
        assert!(matches!(result, Err(TransportError::ShuttingDown)));
    }

    #[test]
    fn finished_workers_are_reaped_on_spawn() {
        let workers = WorkerSet::new();
        for round in 0..5 {
            workers
                .spawn(format!("short-{round}"), SocketCloser::new(), |_| {})
                .unwrap();
            while !workers.is_empty() {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        assert!(workers.workers.lock().len() <= 1);

        workers
            .spawn("parked", SocketCloser::new(), |stop| {
                while !stop.is_set() {
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
            .unwrap();
        assert_eq!(workers.workers.lock().len(), 1);
        assert_eq!(workers.len(), 1);
        workers.shutdown();
    }

    #[test]
    fn tracked_stream_after_close_is_shut() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();

        let closer = SocketCloser::new();
        closer.close();
        closer.track_stream(&client).unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(server_side.read(&mut buf).unwrap(), 0);
    }
}
