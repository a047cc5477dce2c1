//! Byte-stream pipes connecting processes.
//!
//! A pipe is a bounded FIFO of byte chunks. Closing the write end is the sole
//! clean end-of-stream signal; a forced termination is announced in-band with
//! the reserved [`INTERRUPT_MARKER`] byte, so a blocked reader can tell
//! "killed" apart from "writer finished". Write ends are cheap to clone,
//! which is how the kernel injects the marker into a victim's output while
//! the victim still owns its own end.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::mpsc;

/// Reserved byte announcing a forced termination (Ctrl-C style).
pub const INTERRUPT_MARKER: u8 = 0x03;
/// Reserved byte ending an interactive input feed (Ctrl-D style).
pub const END_OF_INPUT: u8 = 0x04;

/// Largest chunk transferred at once.
pub const PIPE_CHUNK_SIZE: usize = 64 * 1024;
/// Chunk slots per pipe. Together with [`PIPE_CHUNK_SIZE`] this bounds a
/// pipe at roughly 4 MiB of buffered data.
pub const PIPE_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    /// The other end is gone; writers stop cleanly on this.
    #[error("pipe closed")]
    Closed,
    /// The interrupt marker was observed in the stream.
    #[error("interrupted")]
    Interrupted,
}

/// Create a new pipe. The writer feeds the reader in FIFO order.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    (
        PipeWriter { tx: Some(tx) },
        PipeReader {
            rx,
            buf: VecDeque::new(),
            interrupted: false,
            eof: false,
        },
    )
}

/// Write end of a pipe.
#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl PipeWriter {
    /// Write all bytes, blocking while the pipe is full.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<(), PipeError> {
        let tx = self.tx.as_ref().ok_or(PipeError::Closed)?;
        for chunk in bytes.chunks(PIPE_CHUNK_SIZE) {
            tx.send(chunk.to_vec())
                .await
                .map_err(|_| PipeError::Closed)?;
        }
        Ok(())
    }

    pub async fn write_str(&self, text: &str) -> Result<(), PipeError> {
        self.write_all(text.as_bytes()).await
    }

    /// Close this end. The reader sees end-of-stream once every clone of the
    /// write end has been closed or dropped.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Announce a forced termination: push the interrupt marker and give this
    /// end up. Used by the kernel on a victim's output.
    pub(crate) async fn interrupt(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(vec![INTERRUPT_MARKER]).await;
        }
    }
}

/// One line pulled from a pipe. `newline` is false when the stream ended
/// before a terminator, i.e. this is the final partial line.
#[derive(Debug, PartialEq, Eq)]
pub struct LineChunk {
    pub text: String,
    pub newline: bool,
}

/// Read end of a pipe. Single consumer.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Vec<u8>>,
    buf: VecDeque<u8>,
    interrupted: bool,
    eof: bool,
}

impl PipeReader {
    /// Next byte, `Ok(None)` on clean end-of-stream,
    /// `Err(Interrupted)` once the interrupt marker is reached.
    pub async fn read_byte(&mut self) -> Result<Option<u8>, PipeError> {
        loop {
            if let Some(byte) = self.buf.pop_front() {
                return Ok(Some(byte));
            }
            if self.interrupted {
                return Err(PipeError::Interrupted);
            }
            if self.eof {
                return Ok(None);
            }
            match self.rx.recv().await {
                Some(chunk) => {
                    for byte in chunk {
                        if byte == INTERRUPT_MARKER {
                            self.interrupted = true;
                            break;
                        }
                        self.buf.push_back(byte);
                    }
                }
                None => self.eof = true,
            }
        }
    }

    /// Drain the stream to completion. Carriage returns are dropped.
    pub async fn read_to_string(&mut self) -> Result<String, PipeError> {
        let mut bytes = Vec::new();
        while let Some(byte) = self.read_byte().await? {
            if byte != b'\r' {
                bytes.push(byte);
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read up to the next newline or the end of the stream.
    pub async fn read_line(&mut self) -> Result<LineChunk, PipeError> {
        let mut bytes = Vec::new();
        loop {
            match self.read_byte().await? {
                Some(b'\n') => {
                    return Ok(LineChunk {
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        newline: true,
                    })
                }
                Some(b'\r') => {}
                Some(byte) => bytes.push(byte),
                None => {
                    return Ok(LineChunk {
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        newline: false,
                    })
                }
            }
        }
    }
}
