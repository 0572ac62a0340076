//! Outbound byte queue of a TCP connection.

use crate::error::Error;
use crate::runtime::suspend::Resumer;

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;

/// Destination of queued bytes.
///
/// Implemented by the connection's socket; tests use in-memory sinks
/// that accept a limited number of bytes per call.
pub(crate) trait Sink {
    /// Writes a prefix of `buf` and returns its length.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// A payload waiting to be written.
struct WriteJob {
    data: Bytes,

    /// Bytes of `data` already written.
    written: usize,

    /// Task waiting for the whole payload to be written, if any.
    resumer: Option<Resumer<usize>>,
}

/// Result of a [`WriteQueue::flush`].
#[derive(Debug)]
pub(crate) enum Flush {
    /// Every queued payload has been written.
    Drained,

    /// The sink cannot take more bytes right now.
    Blocked,

    /// The sink failed; the connection is unusable.
    Failed(io::Error),
}

/// FIFO of payloads written in submission order.
///
/// A payload is written completely before the next one starts, and its
/// waiter is resumed with the payload length once the last byte is out.
#[derive(Default)]
pub(crate) struct WriteQueue {
    jobs: VecDeque<WriteJob>,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a payload. Returns `true` if the queue was empty, meaning
    /// write readiness has to be requested.
    pub(crate) fn push(&mut self, data: Bytes, resumer: Option<Resumer<usize>>) -> bool {
        let was_empty = self.jobs.is_empty();

        self.jobs.push_back(WriteJob {
            data,
            written: 0,
            resumer,
        });

        was_empty
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Bytes still to be written across all payloads.
    pub(crate) fn queued_bytes(&self) -> usize {
        self.jobs.iter().map(|job| job.data.len() - job.written).sum()
    }

    /// Writes as much as the sink accepts.
    pub(crate) fn flush(&mut self, sink: &mut impl Sink) -> Flush {
        while let Some(job) = self.jobs.front_mut() {
            match sink.write(&job.data[job.written..]) {
                Ok(0) => {
                    return Flush::Failed(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted zero bytes",
                    ));
                }
                Ok(n) => {
                    job.written += n;
                    debug_assert!(job.written <= job.data.len());

                    if job.written == job.data.len() {
                        if let Some(done) = self.jobs.pop_front() {
                            if let Some(resumer) = done.resumer {
                                resumer.resume(Ok(done.data.len()));
                            }
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Flush::Blocked,
                Err(e) => return Flush::Failed(e),
            }
        }

        Flush::Drained
    }

    /// Discards every queued payload, resuming their waiters with
    /// [`Error::Disconnected`].
    pub(crate) fn fail_all(&mut self) {
        for job in self.jobs.drain(..) {
            if let Some(resumer) = job.resumer {
                resumer.resume(Err(Error::Disconnected));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Suspend;
    use crate::runtime::suspend::suspension;
    use crate::runtime::suspend::tests::{CountingWaker, poll_once};

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::task::Poll;

    /// Sink accepting at most `per_call` bytes, then blocking after
    /// `calls_before_block` writes.
    struct Throttled {
        out: Vec<u8>,
        per_call: usize,
        calls_before_block: usize,
    }

    impl Sink for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.calls_before_block == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.calls_before_block -= 1;

            let n = buf.len().min(self.per_call);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    struct Broken;

    impl Sink for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn waiter(queue: &mut WriteQueue, data: &'static [u8]) -> Suspend<usize> {
        let (resumer, suspend) = suspension();
        queue.push(Bytes::from_static(data), Some(resumer));
        suspend
    }

    fn poll(suspend: &mut Suspend<usize>) -> Poll<crate::Result<usize>> {
        poll_once(suspend, &Arc::new(CountingWaker(AtomicUsize::new(0))))
    }

    #[test]
    fn partial_writes_resume_in_order() {
        let mut queue = WriteQueue::new();
        let mut first = waiter(&mut queue, b"hello ");
        let mut second = waiter(&mut queue, b"world");

        let mut sink = Throttled {
            out: Vec::new(),
            per_call: 4,
            calls_before_block: 2,
        };

        assert!(matches!(queue.flush(&mut sink), Flush::Blocked));
        assert!(matches!(poll(&mut first), Poll::Ready(Ok(6))));
        assert!(poll(&mut second).is_pending());
        assert_eq!(queue.queued_bytes(), 5);

        sink.calls_before_block = usize::MAX;
        assert!(matches!(queue.flush(&mut sink), Flush::Drained));
        assert!(matches!(poll(&mut second), Poll::Ready(Ok(5))));
        assert_eq!(sink.out, b"hello world");
        assert!(queue.is_empty());
    }

    #[test]
    fn push_reports_an_empty_queue() {
        let mut queue = WriteQueue::new();

        assert!(queue.push(Bytes::from_static(b"a"), None));
        assert!(!queue.push(Bytes::from_static(b"b"), None));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn failure_leaves_jobs_until_failed_explicitly() {
        let mut queue = WriteQueue::new();
        let mut pending = waiter(&mut queue, b"data");

        assert!(matches!(queue.flush(&mut Broken), Flush::Failed(_)));
        assert_eq!(queue.len(), 1);

        queue.fail_all();
        assert!(matches!(
            poll(&mut pending),
            Poll::Ready(Err(Error::Disconnected))
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_length_write_is_a_failure() {
        struct Zero;

        impl Sink for Zero {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
        }

        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"x"), None);

        match queue.flush(&mut Zero) {
            Flush::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::WriteZero),
            other => panic!("unexpected flush result: {other:?}"),
        }
    }
}
