//! Bounded capture buffers for child process output.
//!
//! One [`OutputBuffer`] per stream. The reader task owns appends; anyone
//! holding the `Arc` may take a [`snapshot`](OutputBuffer::snapshot) at any
//! time and sees a prefix that only ever grows.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Which child stream a buffer captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Captured text plus whether anything was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Default)]
struct Inner {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Append-only byte sink with a hard cap.
#[derive(Debug)]
pub struct OutputBuffer {
    kind: StreamKind,
    cap: usize,
    inner: Mutex<Inner>,
}

impl OutputBuffer {
    pub fn new(kind: StreamKind, cap: usize) -> Self {
        Self {
            kind,
            cap,
            inner: Mutex::new(Inner {
                bytes: Vec::with_capacity(cap.min(8 * 1024)),
                truncated: false,
            }),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk. Bytes past the cap are dropped; the cut is moved back
    /// so a multi-byte UTF-8 sequence is never split.
    pub fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.lock();
        if inner.truncated {
            return;
        }

        let room = self.cap.saturating_sub(inner.bytes.len());
        if chunk.len() <= room {
            inner.bytes.extend_from_slice(chunk);
            return;
        }

        // Join what we already hold with the part that still fits, then trim
        // any sequence that the cap would cut in half.
        inner.bytes.extend_from_slice(&chunk[..room]);
        let clean = utf8_boundary(&inner.bytes);
        inner.bytes.truncate(clean);
        inner.truncated = true;
        debug!(
            stream = self.kind.as_str(),
            cap = self.cap,
            kept = inner.bytes.len(),
            "output truncated"
        );
    }

    pub fn is_truncated(&self) -> bool {
        self.lock().truncated
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text committed so far. A trailing sequence that is still incomplete
    /// (its remaining bytes have not arrived yet) is held back.
    pub fn snapshot(&self) -> CapturedOutput {
        let inner = self.lock();
        let clean = utf8_boundary(&inner.bytes);
        self.decode(&inner.bytes[..clean], inner.truncated)
    }

    /// Final text once the stream has closed. Invalid bytes are replaced
    /// with U+FFFD rather than dropped.
    pub fn finish(&self) -> CapturedOutput {
        let inner = self.lock();
        self.decode(&inner.bytes, inner.truncated)
    }

    /// Lossy decode, then hold the text itself to the cap: each invalid byte
    /// becomes a three-byte U+FFFD, so the decoded form can outgrow the bytes.
    fn decode(&self, bytes: &[u8], truncated: bool) -> CapturedOutput {
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        if text.len() <= self.cap {
            return CapturedOutput { text, truncated };
        }
        let mut end = self.cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        CapturedOutput {
            text,
            truncated: true,
        }
    }
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// incomplete UTF-8 sequence.
///
/// Only the last (at most four) bytes are inspected. Invalid bytes earlier in
/// the buffer are left alone; they are not a boundary problem.
pub fn utf8_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let start = len.saturating_sub(4);
    for i in (start..len).rev() {
        let b = bytes[i];
        if b & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep scanning back for the lead
            continue;
        }
        let width = match b {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if i + width > len { i } else { len };
    }
    len
}
