use std::io::{self, ErrorKind, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use bytes::{Bytes, BytesMut};

use crate::status::{Code, Status};

// req frame layout
// id(u64) + len(u64) + req_data([u8; len])

// rsp frame layout
// id(u64) + len(u64) + code(u8) + rsp_data([u8; len - 1])
//
// rsp_data is the encoded reply when code is Ok, the utf8 status message otherwise

const HEAD_LEN: usize = 16;
const RSP_HEAD_LEN: usize = HEAD_LEN + 1;

/// max body length of a single frame
pub const FRAME_MAX_LEN: u64 = 1024 * 1024;

/// raw frame read from a connection, the body excludes the id and len head
#[derive(Debug)]
pub struct Frame {
    /// frame id, req and rsp share the same id
    pub id: u64,
    body: Bytes,
}

impl Frame {
    /// decode a frame from the reader, `buf` is reused between frames
    pub fn decode_from<R: Read>(r: &mut R, buf: &mut BytesMut) -> io::Result<Self> {
        let id = r.read_u64::<BigEndian>()?;
        let len = r.read_u64::<BigEndian>()?;
        debug!("decode frame: id={id}, len={len}");

        if len > FRAME_MAX_LEN {
            let s = format!("decode too big frame length. len={len}");
            error!("{s}");
            return Err(io::Error::new(ErrorKind::InvalidInput, s));
        }

        let len = len as usize;
        buf.clear();
        buf.resize(len, 0);
        r.read_exact(&mut buf[..])?;
        let body = buf.split_to(len).freeze();

        Ok(Frame { id, body })
    }

    /// the raw request payload
    pub fn decode_req(&self) -> &[u8] {
        &self.body
    }

    /// the raw reply payload, or the status the server failed with
    pub fn decode_rsp(&self) -> Result<&[u8], Status> {
        let (&code, data) = self
            .body
            .split_first()
            .ok_or_else(|| Status::internal("response frame without status code"))?;

        match Code::from_u8(code) {
            Some(Code::Ok) => Ok(data),
            Some(code) => Err(Status::new(code, String::from_utf8_lossy(data))),
            None => {
                let s = format!("invalid response code. code={code}");
                error!("{s}");
                Err(Status::internal(s))
            }
        }
    }
}

/// req frame buffer that a request can be serialized into
pub struct ReqBuf(Vec<u8>);

impl Default for ReqBuf {
    fn default() -> Self {
        ReqBuf::new()
    }
}

impl ReqBuf {
    /// create a new `ReqBuf` with room for the frame head
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.resize(HEAD_LEN, 0);
        ReqBuf(buf)
    }

    /// fill in the head and return the bytes to send
    pub fn finish(self, id: u64) -> io::Result<Vec<u8>> {
        let mut buf = self.0;
        let len = (buf.len() - HEAD_LEN) as u64;
        if len > FRAME_MAX_LEN {
            let s = format!("encode too big request. len={len}");
            return Err(io::Error::new(ErrorKind::InvalidInput, s));
        }

        BigEndian::write_u64(&mut buf[0..8], id);
        BigEndian::write_u64(&mut buf[8..HEAD_LEN], len);
        debug!("encode req: id={id}, len={len}");
        Ok(buf)
    }
}

impl Write for ReqBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// rsp frame buffer that a reply can be serialized into
pub struct RspBuf(Vec<u8>);

impl Default for RspBuf {
    fn default() -> Self {
        RspBuf::new()
    }
}

impl RspBuf {
    /// create a new `RspBuf` with room for the frame head and code
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.resize(RSP_HEAD_LEN, 0);
        RspBuf(buf)
    }

    /// fill in the head and return the bytes to send
    ///
    /// a failed `ret` discards anything already written and carries the status message instead
    pub fn finish(self, id: u64, ret: Result<(), Status>) -> Vec<u8> {
        let mut buf = self.0;

        let code = match ret {
            Ok(()) => Code::Ok,
            Err(status) => {
                buf.truncate(RSP_HEAD_LEN);
                buf.extend_from_slice(status.message().as_bytes());
                status.code()
            }
        };

        let len = (buf.len() - HEAD_LEN) as u64;
        BigEndian::write_u64(&mut buf[0..8], id);
        BigEndian::write_u64(&mut buf[8..HEAD_LEN], len);
        buf[HEAD_LEN] = code.as_u8();
        debug!("encode rsp: id={id}, len={len}, code={code}");
        buf
    }
}

impl Write for RspBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
