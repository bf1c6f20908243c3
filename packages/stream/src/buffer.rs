//! Ordered queue of received chunks, shared between the socket pump (producer)
//! and a single handshake reader that parks on a wake signal while it is empty.

use bytes::{Bytes, BytesMut};
use diatomic_waker::{WakeSink, WakeSource};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::mem::take;
use std::sync::Arc;

#[derive(Default)]
struct Chunks {
    queue: VecDeque<Bytes>,
    /// The remote stopped sending. Queued chunks stay readable.
    finished: bool,
    /// Nothing is read past this point, queued or not.
    closed: bool,
}

/// Producer side. Every push and the close fire the reader's signal.
pub(crate) struct ReadBuffer {
    chunks: Arc<Mutex<Chunks>>,
    signal: WakeSource,
}

/// Consumer side. Owning it by `&mut` is what keeps readers to one at a time.
pub(crate) struct BufferReader {
    chunks: Arc<Mutex<Chunks>>,
    signal: WakeSink,
}

pub(crate) fn read_buffer() -> (ReadBuffer, BufferReader) {
    let chunks = Arc::new(Mutex::new(Chunks::default()));
    let signal = WakeSink::new();
    (ReadBuffer { chunks: chunks.clone(), signal: signal.source() }, BufferReader { chunks, signal })
}

impl ReadBuffer {
    pub fn push(&self, chunk: Bytes) {
        {
            let mut chunks = self.chunks.lock();
            if chunks.closed {
                return;
            }
            chunks.queue.push_back(chunk);
        }
        self.signal.notify();
    }

    /// Marks the end of input. Readers drain what is queued before they see
    /// the end of stream. Returns `false` if the buffer was already finished
    /// or closed.
    pub fn finish(&self) -> bool {
        let transitioned = {
            let mut chunks = self.chunks.lock();
            let transitioned = !chunks.finished && !chunks.closed;
            chunks.finished = true;
            transitioned
        };
        self.signal.notify();
        transitioned
    }

    /// Marks the buffer closed. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        let transitioned = !std::mem::replace(&mut self.chunks.lock().closed, true);
        self.signal.notify();
        transitioned
    }

    pub fn is_closed(&self) -> bool {
        self.chunks.lock().closed
    }

    /// Takes every queued chunk, oldest first.
    pub fn drain(&self) -> VecDeque<Bytes> {
        take(&mut self.chunks.lock().queue)
    }
}

impl BufferReader {
    /// Returns at most `size` bytes from the head of the queue, waiting for data
    /// if it is empty. `None` means end of stream: the buffer is closed, or it
    /// is finished and nothing is left in the queue.
    pub async fn read_up_to(&mut self, size: usize) -> Option<Bytes> {
        if self.chunks.lock().closed {
            return None;
        }
        if size == 0 {
            return Some(Bytes::new());
        }

        let chunks = &self.chunks;
        self.signal
            .wait_until(|| {
                let mut chunks = chunks.lock();
                if chunks.closed {
                    return Some(None);
                }

                if chunks.queue.is_empty() {
                    return chunks.finished.then_some(None);
                }

                let front = chunks.queue.front_mut()?;
                if front.len() <= size {
                    chunks.queue.pop_front().map(Some)
                } else {
                    Some(Some(front.split_to(size)))
                }
            })
            .await
    }

    /// Reads until `size` bytes are collected. A shorter result means the
    /// stream ended first.
    pub async fn read_exact(&mut self, size: usize) -> Bytes {
        let Some(first) = self.read_up_to(size).await else {
            return Bytes::new();
        };
        if first.len() == size {
            return first;
        }

        let mut output = BytesMut::with_capacity(size);
        output.extend_from_slice(&first);
        while output.len() < size {
            match self.read_up_to(size - output.len()).await {
                Some(chunk) => output.extend_from_slice(&chunk),
                None => break,
            }
        }
        output.freeze()
    }
}
