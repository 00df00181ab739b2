use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use may::queue::mpsc::Queue;
use may::sync::Mutex;

/// Serializes frames written concurrently by many coroutines onto one writer.
///
/// Every frame is pushed onto a queue; whoever finds the queue empty becomes
/// the flusher and drains it, so each frame reaches the writer whole.
#[derive(Debug)]
pub struct QueuedWriter<W: Write> {
    pending: AtomicUsize,
    queue: Queue<Vec<u8>>,
    writer: Mutex<Batch<W>>,
}

#[derive(Debug)]
struct Batch<W: Write> {
    writer: W,
    buf: BytesMut,
}

impl<W: Write> QueuedWriter<W> {
    pub fn new(writer: W) -> Self {
        QueuedWriter {
            pending: AtomicUsize::new(0),
            queue: Queue::new(),
            writer: Mutex::new(Batch {
                writer,
                buf: BytesMut::with_capacity(1024 * 32),
            }),
        }
    }

    /// queue one frame, flushing the whole queue if no one else is
    ///
    /// the error of a failed flush is returned to the coroutine that flushed
    pub fn write(&self, frame: Vec<u8>) -> io::Result<()> {
        self.queue.push(frame);
        if self.pending.fetch_add(1, Ordering::AcqRel) != 0 {
            // another coroutine is draining and will pick this frame up
            return Ok(());
        }

        let mut batch = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let mut cnt = 0;
            while let Some(frame) = self.queue.pop() {
                batch.buf.extend_from_slice(&frame);
                cnt += 1;
            }
            if self.pending.fetch_sub(cnt, Ordering::AcqRel) == cnt {
                break;
            }
        }

        let Batch { writer, buf } = &mut *batch;
        let ret = writer.write_all(&buf[..]).and_then(|_| writer.flush());
        buf.clear();
        if let Err(ref e) = ret {
            error!("queued writer flush failed, err={e}");
        }
        ret
    }
}
