use std::io;

use thiserror::Error;

use crate::status::Status;

/// All errors a client can observe while calling the factor service.
#[derive(Debug, Error)]
pub enum Error {
    /// Any IO error on the connection.
    #[error("IO err: {0}")]
    Io(#[from] io::Error),
    /// Error in serializing a client request.
    #[error("serializing a client request err: {0}")]
    ClientSerialize(String),
    /// Error in deserializing a server response.
    ///
    /// Typically this indicates client and server disagree on the message layout.
    #[error("deserializing a server response err: {0}")]
    ClientDeserialize(String),
    /// The server was unable to reply to the client within the configured timeout.
    #[error("the server was unable to reply within the timeout")]
    Timeout,
    /// The server answered with a failed status.
    #[error("server status: {0}")]
    Status(#[from] Status),
}

impl Error {
    /// Fold the error into the status the caller reports to the user.
    ///
    /// Server statuses are passed through, local failures are classified
    /// the way a gRPC client would classify them.
    pub fn to_status(&self) -> Status {
        match self {
            Error::Status(status) => status.clone(),
            Error::Io(e) => Status::unavailable(e.to_string()),
            Error::Timeout => Status::deadline_exceeded(self.to_string()),
            Error::ClientSerialize(_) | Error::ClientDeserialize(_) => {
                Status::internal(self.to_string())
            }
        }
    }
}
