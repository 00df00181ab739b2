use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufReader};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use may::io::{SplitIo, SplitWriter};
use may::net::TcpStream;
use may::sync::Mutex;
use may::{coroutine, go};
use may_waiter::TokenWaiter;

use crate::errors::Error;
use crate::frame::{Frame, ReqBuf};
use crate::queued_writer::QueuedWriter;

type Waiter = TokenWaiter<io::Result<Frame>>;

/// ids of the calls still waiting for a response
#[derive(Debug, Default)]
struct Pending {
    // set once the listener stops reading, no call can be answered after that
    closed: bool,
    ids: HashSet<usize>,
}

fn lock(pending: &Mutex<Pending>) -> may::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn connection_closed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed")
}

/// marks the channel closed and fails every outstanding call,
/// also when the listener is canceled
struct CloseGuard(Arc<Mutex<Pending>>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let mut pending = lock(&self.0);
        pending.closed = true;
        for id in pending.ids.drain() {
            debug!("fail pending call: id={id}");
            let id = unsafe { may_waiter::ID::from_usize(id) };
            Waiter::set_rsp(id, Err(connection_closed()));
        }
    }
}

/// A multiplexed connection to a server.
///
/// Calls may be issued from any number of coroutines at once. Each call
/// parks on a waiter keyed by the frame id and a listener coroutine hands
/// every response frame to its waiter. Once the peer goes away all waiting
/// calls fail and later calls fail straight away.
pub struct Channel {
    sock: QueuedWriter<SplitWriter<TcpStream>>,
    pending: Arc<Mutex<Pending>>,
    listener: Option<coroutine::JoinHandle<()>>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .field("listener", &self.listener)
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(h) = self.listener.take() {
            unsafe { h.coroutine().cancel() };
            h.join().ok();
        }
    }
}

impl Channel {
    /// connect to the server address
    pub fn connect<L: ToSocketAddrs>(addr: L) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Channel::new(stream)
    }

    /// wrap an established connection
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.split()?;
        let mut r_stream = BufReader::new(reader);
        let pending = Arc::new(Mutex::new(Pending::default()));
        let guard = CloseGuard(pending.clone());
        let listener = go!(
            coroutine::Builder::new().name("ChannelListener".to_owned()),
            move || {
                let guard = guard;
                let mut buf = BytesMut::with_capacity(1024 * 32);
                loop {
                    let rsp_frame = match Frame::decode_from(&mut r_stream, &mut buf) {
                        Ok(r) => r,
                        Err(ref e) => {
                            if e.kind() == io::ErrorKind::UnexpectedEof {
                                info!("channel closed: peer={peer:?}");
                            } else {
                                error!("channel decode rsp failed: peer={peer:?}, err={e:?}");
                            }
                            break;
                        }
                    };
                    debug!("receive rsp: id={}", rsp_frame.id);

                    let id = rsp_frame.id as usize;
                    let mut pending = lock(&guard.0);
                    if pending.ids.remove(&id) {
                        let id = unsafe { may_waiter::ID::from_usize(id) };
                        Waiter::set_rsp(id, Ok(rsp_frame));
                    } else {
                        warn!("drop rsp without caller: id={id}");
                    }
                }
            }
        )?;

        Ok(Channel {
            sock: QueuedWriter::new(writer),
            pending,
            listener: Some(listener),
        })
    }

    /// true once the connection can no longer answer calls
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// send one request frame and wait for the frame answering it
    ///
    /// `timeout` bounds the wait, `None` waits until the response arrives
    /// or the connection closes.
    pub fn call(&self, req: ReqBuf, timeout: Option<Duration>) -> Result<Frame, Error> {
        let waiter = Waiter::new();
        let id: usize = waiter
            .id()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("waiter id: {e:?}")))?
            .into();
        debug!("request id = {id}");

        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(Error::Io(connection_closed()));
            }
            pending.ids.insert(id);
        }

        let sent = req
            .finish(id as u64)
            .and_then(|data| self.sock.write(data));
        if let Err(e) = sent {
            lock(&self.pending).ids.remove(&id);
            return Err(Error::Io(e));
        }

        let ret = waiter.wait_rsp(timeout);
        // a response that raced the timeout was already taken out by the listener
        lock(&self.pending).ids.remove(&id);
        match ret {
            Ok(rsp) => rsp.map_err(Error::Io),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
