use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use co_managed::Manager;
use may::net::{TcpListener, TcpStream};
use may::sync::{Mutex, MutexGuard};
use may::{coroutine, go};

use crate::frame::{Frame, RspBuf};
use crate::queued_writer::QueuedWriter;
use crate::status::Status;

// how long a stopping server waits for its connections to end
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

macro_rules! t {
    ($e: expr) => {
        match $e {
            Ok(val) => val,
            Err(err) => {
                error!("call = {:?}\nerr = {:?}", stringify!($e), err);
                continue;
            }
        }
    };
}

/// must impl this trait for your service
pub trait Server: Send + Sync + Sized + 'static {
    /// serve one request, running in its own coroutine
    ///
    /// the request payload is passed in raw, the reply must be serialized into `rsp`.
    /// a returned `Err` is sent back to the client as the call status
    fn service(&self, req: &[u8], rsp: &mut RspBuf) -> Result<(), Status>;
}

/// streams of the live connections, shut down when the server stops
#[derive(Default)]
struct Connections {
    closing: bool,
    next_id: u64,
    streams: HashMap<u64, TcpStream>,
}

type Registry = Arc<Mutex<Connections>>;

fn lock(registry: &Registry) -> MutexGuard<'_, Connections> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// removes a connection from the registry when its coroutine ends
struct Registered {
    id: u64,
    registry: Registry,
}

impl Drop for Registered {
    fn drop(&mut self) {
        lock(&self.registry).streams.remove(&self.id);
    }
}

/// a running server, dropping it stops accepting and closes all connections
pub struct ServerInstance {
    addr: SocketAddr,
    connections: Registry,
    handle: Option<coroutine::JoinHandle<()>>,
}

impl ServerInstance {
    /// the address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// join the service, this would wait until the service is stopped
    pub fn join(mut self) -> std::thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// stop the service
    pub fn shutdown(self) {
        drop(self)
    }

    // wake every connection parked on a read, they then end on their own
    fn close_connections(&self) {
        let mut conns = lock(&self.connections);
        conns.closing = true;
        for (id, stream) in conns.streams.iter() {
            debug!("shutdown connection: id={id}");
            stream.shutdown(Shutdown::Both).ok();
        }
    }

    fn wait_connections(&self) {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        loop {
            let live = lock(&self.connections).streams.len();
            if live == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!("{live} connections still open on {}", self.addr);
                return;
            }
            coroutine::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("stopping server on {}", self.addr);
            self.close_connections();
            self.wait_connections();
            unsafe { handle.coroutine().cancel() };
            handle.join().ok();
        }
    }
}

/// Provides a function for starting the tcp service.
pub trait TcpServer: Server {
    /// bind to the given address and serve connections in a background coroutine
    fn start<L: ToSocketAddrs>(self, addr: L) -> io::Result<ServerInstance> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        let connections: Registry = Arc::new(Mutex::new(Connections::default()));
        let registry = connections.clone();
        let handle = go!(
            coroutine::Builder::new().name("FactorServer".to_owned()),
            move || {
                let server = Arc::new(self);
                // by the time the listener is canceled its connections have ended
                let manager = Manager::new();
                for stream in listener.incoming() {
                    let stream = t!(stream);
                    t!(stream.set_nodelay(true));
                    let registered = t!(register(&registry, &stream));
                    let server = server.clone();
                    manager.add(move || serve_connection(server, stream, registered));
                }
            }
        )?;
        info!("server listening on {addr}");

        Ok(ServerInstance {
            addr,
            connections,
            handle: Some(handle),
        })
    }
}

impl<T: Server> TcpServer for T {}

fn register(registry: &Registry, stream: &TcpStream) -> io::Result<Registered> {
    let mut conns = lock(registry);
    if conns.closing {
        stream.shutdown(Shutdown::Both).ok();
        return Err(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "server is stopping",
        ));
    }
    let id = conns.next_id;
    conns.next_id += 1;
    conns.streams.insert(id, stream.try_clone()?);
    Ok(Registered {
        id,
        registry: registry.clone(),
    })
}

fn serve_connection<S: Server>(server: Arc<S>, stream: TcpStream, registered: Registered) {
    let _registered = registered;
    let peer = stream.peer_addr().ok();
    info!("accepted connection: peer={peer:?}");

    let rs = match stream.try_clone() {
        Ok(rs) => rs,
        Err(e) => {
            error!("failed to clone stream: peer={peer:?}, err={e}");
            return;
        }
    };
    // the read half of the stream
    let mut rs = BufReader::new(rs);
    // replies of concurrent requests share the write half
    let ws = Arc::new(QueuedWriter::new(stream));
    let mut buf = BytesMut::with_capacity(1024 * 32);

    loop {
        let req = match Frame::decode_from(&mut rs, &mut buf) {
            Ok(r) => r,
            Err(ref e) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    info!("connection closed: peer={peer:?}");
                } else {
                    error!("decode request failed: peer={peer:?}, err={e:?}");
                }
                break;
            }
        };

        debug!("get request: id={}", req.id);
        let ws = ws.clone();
        let server = server.clone();
        go!(move || {
            let mut rsp = RspBuf::new();
            let ret = server.service(req.decode_req(), &mut rsp);
            let data = rsp.finish(req.id, ret);

            debug!("send rsp: id={}", req.id);
            if let Err(e) = ws.write(data) {
                error!("send rsp failed: id={}, err={e}", req.id);
            }
        });
    }
}
