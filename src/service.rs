use std::fmt;
use std::io;
use std::net::ToSocketAddrs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use may::sync::Mutex;
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::errors::Error;
use crate::factor::prime_factors;
use crate::factor_log::FactorLog;
use crate::frame::{ReqBuf, RspBuf};
use crate::server::Server;
use crate::status::Status;

/// Ask the server to factor `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorRequest {
    /// The integer to factor.
    pub target: i32,
}

/// Prime factors of the requested target, with multiplicity, in non-decreasing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorReply {
    /// The factors; empty for targets below 2.
    pub factors: Vec<i32>,
}

/// The factor service interface.
pub trait Factorer {
    /// Factor the requested target.
    fn factor(&self, request: FactorRequest) -> Result<FactorReply, Status>;
}

/// The request sent over the wire from the client to the server.
#[allow(missing_docs)]
#[derive(Debug, Serialize, Deserialize)]
pub enum FactorerRequest {
    Factor { request: FactorRequest },
}

/// Routes a decoded request to the matching `Factorer` method.
pub trait FactorerServiceDispatch: Factorer {
    /// Call the method and serialize its reply into `rsp`.
    ///
    /// A panic inside the method fails the call with an `Unknown` status
    /// naming the target; nothing of a partial reply is sent.
    fn dispatch_req(&self, req: FactorerRequest, rsp: &mut RspBuf) -> Result<(), Status> {
        match req {
            FactorerRequest::Factor { request } => {
                let target = request.target;
                match panic::catch_unwind(AssertUnwindSafe(|| self.factor(request))) {
                    Ok(Ok(reply)) => bincode::serialize_into(rsp, &reply)
                        .map_err(|e| Status::internal(format!("failed to encode reply: {e}"))),
                    Ok(Err(status)) => Err(status),
                    Err(_) => {
                        error!("factor panicked: target={target}");
                        Err(Status::unknown(format!("Unable to factor {target}")))
                    }
                }
            }
        }
    }
}

impl<T: Factorer> FactorerServiceDispatch for T {}

/// The client stub that makes `Factorer` calls to the server.
///
/// A stub made with [`FactorerClient::lazy`] connects on its first call, so
/// an unreachable server fails each call with an `Io` error instead of
/// failing construction. A connection that later closes is not replaced.
pub struct FactorerClient {
    target: Option<String>,
    timeout: Option<Duration>,
    transport: Mutex<Option<Arc<Channel>>>,
}

impl fmt::Debug for FactorerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorerClient")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FactorerClient {
    /// Returns a new client stub that sends requests over the given channel.
    pub fn new(transport: Channel) -> Self {
        FactorerClient {
            target: None,
            timeout: None,
            transport: Mutex::new(Some(Arc::new(transport))),
        }
    }

    /// Connect to the server address.
    pub fn connect<L: ToSocketAddrs>(addr: L) -> io::Result<Self> {
        Channel::connect(addr).map(FactorerClient::new)
    }

    /// A stub that connects to `target` (`host:port`) when it is first used.
    pub fn lazy(target: impl Into<String>) -> Self {
        FactorerClient {
            target: Some(target.into()),
            timeout: None,
            transport: Mutex::new(None),
        }
    }

    /// set the read timeout value for the client
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn transport(&self) -> io::Result<Arc<Channel>> {
        let mut transport = self.transport.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(channel) = transport.as_ref() {
            return Ok(channel.clone());
        }
        let target = self
            .target
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no target to connect"))?;
        let channel = Arc::new(Channel::connect(target)?);
        info!("connected to {target}");
        *transport = Some(channel.clone());
        Ok(channel)
    }

    /// Factor `request.target` on the server.
    pub fn factor(&self, request: FactorRequest) -> Result<FactorReply, Error> {
        let mut req = ReqBuf::new();
        // serialize the request
        let request = FactorerRequest::Factor { request };
        bincode::serialize_into(&mut req, &request)
            .map_err(|e| Error::ClientSerialize(e.to_string()))?;
        // call the server
        let rsp_frame = self.transport()?.call(req, self.timeout)?;
        let rsp = rsp_frame.decode_rsp()?;
        // deserialize the response
        bincode::deserialize(rsp).map_err(|e| Error::ClientDeserialize(e.to_string()))
    }
}

/// Trial-division factorization, recording every request in a [`FactorLog`].
#[derive(Debug)]
pub struct FactorService {
    log: Arc<FactorLog>,
}

impl FactorService {
    /// A service appending to `log`.
    pub fn new(log: Arc<FactorLog>) -> Self {
        FactorService { log }
    }
}

impl Factorer for FactorService {
    fn factor(&self, request: FactorRequest) -> Result<FactorReply, Status> {
        let outcome = prime_factors(request.target);
        self.log.record(request.target, &outcome);
        let factors = outcome?;
        Ok(FactorReply { factors })
    }
}

impl Server for FactorService {
    fn service(&self, req: &[u8], rsp: &mut RspBuf) -> Result<(), Status> {
        // deserialize the request
        let request: FactorerRequest = bincode::deserialize(req)
            .map_err(|e| Status::internal(format!("failed to decode request: {e}")))?;
        debug!("request = {request:?}");
        self.dispatch_req(request, rsp)
    }
}
