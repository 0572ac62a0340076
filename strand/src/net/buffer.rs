//! Receive buffering for TCP connections.
//!
//! Bytes received from the socket accumulate in a [`StreamBuffer`] until a
//! read request can be satisfied. Satisfying a request removes exactly
//! the bytes it covers from the front of the buffer; anything after them
//! stays for the next request.

use crate::error::Error;
use crate::runtime::Suspend;
use crate::runtime::suspend::{Resumer, suspension};

use bytes::{Bytes, BytesMut};

/// Spare capacity below which the buffer grows before appending.
const LOW_WATER: usize = 256;

/// What a pending read is waiting for.
#[derive(Clone, Debug)]
pub(crate) enum ReadRequest {
    /// Exactly this many bytes.
    Exact(usize),

    /// Everything up to and including the first occurrence of
    /// `delimiter`. The delimiter itself is not returned; when `ignore` is
    /// set and immediately precedes the delimiter, it is dropped as well.
    Until {
        delimiter: Bytes,
        ignore: Option<Bytes>,
    },
}

struct PendingRead {
    request: ReadRequest,
    resumer: Resumer<Bytes>,

    /// Offset before which no delimiter can start; avoids rescanning the
    /// whole buffer on every append.
    scanned: usize,
}

/// A growable receive buffer with at most one pending read.
pub(crate) struct StreamBuffer {
    data: BytesMut,
    pending: Option<PendingRead>,
}

impl StreamBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            pending: None,
        }
    }

    /// Number of buffered, unconsumed bytes.
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if a task is parked on this buffer.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.resumer.is_abandoned())
    }

    /// Appends received bytes, then completes the pending read if the
    /// buffer now satisfies it.
    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        self.reserve(chunk.len());
        self.data.extend_from_slice(chunk);

        self.complete_pending();
    }

    fn reserve(&mut self, incoming: usize) {
        let spare = self.data.capacity() - self.data.len();

        if spare < incoming.max(LOW_WATER) {
            self.data.reserve(self.data.capacity().max(incoming));
        }
    }

    /// Starts a read.
    ///
    /// Resolves immediately when the buffered bytes already satisfy
    /// `request`; otherwise the returned future is resumed by a later
    /// [`feed`](Self::feed) or failure. Fails with
    /// [`Error::ReadInProgress`] if another task is already parked here.
    pub(crate) fn read(&mut self, request: ReadRequest) -> Suspend<Bytes> {
        if self.has_pending() {
            return Suspend::ready(Err(Error::ReadInProgress));
        }
        self.pending = None;

        if let Some(bytes) = self.take(&request, 0) {
            return Suspend::ready(Ok(bytes));
        }

        let (resumer, suspend) = suspension();
        self.pending = Some(PendingRead {
            scanned: self.scan_start(&request),
            request,
            resumer,
        });

        suspend
    }

    /// Consumes the bytes covered by `request`, if they are all here.
    pub(crate) fn take(&mut self, request: &ReadRequest, from: usize) -> Option<Bytes> {
        match request {
            ReadRequest::Exact(n) => (self.data.len() >= *n).then(|| self.data.split_to(*n).freeze()),
            ReadRequest::Until { delimiter, ignore } => {
                let at = find(&self.data, delimiter, from)?;

                let end = match ignore {
                    Some(suffix)
                        if !suffix.is_empty()
                            && suffix.len() <= at
                            && self.data[at - suffix.len()..at] == suffix[..] =>
                    {
                        at - suffix.len()
                    }
                    _ => at,
                };

                let mut line = self.data.split_to(at + delimiter.len());
                line.truncate(end);

                Some(line.freeze())
            }
        }
    }

    fn scan_start(&self, request: &ReadRequest) -> usize {
        match request {
            ReadRequest::Exact(_) => 0,
            ReadRequest::Until { delimiter, .. } => {
                (self.data.len() + 1).saturating_sub(delimiter.len())
            }
        }
    }

    fn complete_pending(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        if pending.resumer.is_abandoned() {
            self.pending = None;
            return;
        }

        let request = pending.request.clone();
        let from = pending.scanned;

        match self.take(&request, from) {
            Some(bytes) => {
                if let Some(pending) = self.pending.take() {
                    pending.resumer.resume(Ok(bytes));
                }
            }
            None => {
                let next = self.scan_start(&request);
                if let Some(pending) = self.pending.as_mut() {
                    pending.scanned = next;
                }
            }
        }
    }

    /// Resumes the pending read, if any, with `error`.
    pub(crate) fn fail_pending(&mut self, error: Error) {
        if let Some(pending) = self.pending.take() {
            pending.resumer.resume(Err(error));
        }
    }

    /// Drops the buffered bytes and releases the storage.
    pub(crate) fn release(&mut self) {
        self.data = BytesMut::new();
    }
}

/// Position of the first occurrence of `needle` in `haystack` at or after
/// `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() || from > haystack.len() - needle.len() {
        return None;
    }

    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
