//! simple_factors factors integers into primes on a server, one unary RPC per integer.
//!
//! The server runs trial division and appends a line per request to a log
//! file. The client sends pseudo-random targets in batches and prints the
//! factors it gets back.
//!
//! The transport is a small framed protocol over TCP running on `may`
//! coroutines:
//! 1. client encodes a request frame and sends it
//! 2. server decodes it and serves it in its own coroutine
//! 3. server sends back a response frame carrying a status code
//! 4. client hands the response to the caller waiting on that frame id
//!
//! Example usage:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use simple_factors::{FactorLog, FactorRequest, FactorService, FactorerClient, TcpServer};
//!
//! let log = Arc::new(FactorLog::new("log.txt"));
//! let server = FactorService::new(log).start("127.0.0.1:50051").unwrap();
//!
//! let client = FactorerClient::connect(server.local_addr()).unwrap();
//! let reply = client.factor(FactorRequest { target: 360 }).unwrap();
//! assert_eq!(reply.factors, vec![2, 2, 2, 3, 3, 5]);
//! ```

#![deny(missing_docs)]

#[macro_use]
extern crate log;

pub use channel::Channel;
pub use config::{ClientConfig, ServerConfig};
pub use driver::{random_target, BatchReport, Driver, FAILED};
pub use errors::Error;
pub use factor::{prime_factors, FactorError};
pub use factor_log::FactorLog;
pub use frame::{Frame, ReqBuf, RspBuf};
pub use server::{Server, ServerInstance, TcpServer};
pub use service::{
    FactorReply, FactorRequest, FactorService, Factorer, FactorerClient, FactorerRequest,
    FactorerServiceDispatch,
};
pub use status::{Code, Status};

/// multiplexed client connection
mod channel;
pub mod config;
/// batches of calls issued by the client binary
mod driver;
mod errors;
pub mod factor;
/// append-only record of served requests
mod factor_log;
/// raw frame protocol
mod frame;
mod queued_writer;
/// Provides server framework
mod server;
/// the factor service definition, client stub and implementation
mod service;
mod status;
