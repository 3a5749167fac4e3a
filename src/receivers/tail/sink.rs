// SPDX-License-Identifier: Apache-2.0

//! Downstream destinations for batches of records.

use std::io::{self, Write};

use tracing::debug;

use crate::bounded_channel::{BoundedSender, TrySendError};
use crate::receivers::tail::error::{Error, Result};

/// What happened to a batch handed to a [`Sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The batch was taken; its offset can be committed
    Accepted,
    /// Transient backpressure; deliver the same batch again later
    Rejected,
}

/// A destination for record batches.
///
/// `deliver` must not block waiting for capacity. An `Err` means the sink is gone
/// for good and the receiver stops.
pub trait Sink: Send {
    fn deliver(&mut self, records: &[String]) -> Result<Delivery>;
}

/// Sends each batch over a bounded channel.
pub struct ChannelSink {
    tx: BoundedSender<Vec<String>>,
}

impl ChannelSink {
    pub fn new(tx: BoundedSender<Vec<String>>) -> Self {
        Self { tx }
    }
}

impl Sink for ChannelSink {
    fn deliver(&mut self, records: &[String]) -> Result<Delivery> {
        match self.tx.try_send(records.to_vec()) {
            Ok(()) => Ok(Delivery::Accepted),
            Err(TrySendError::Full(_)) => {
                debug!(records = records.len(), "Channel full, batch rejected");
                Ok(Delivery::Rejected)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::SinkClosed),
        }
    }
}

/// Writes records to a byte stream, one per line.
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_batch(&mut self, records: &[String]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(records.iter().map(|r| r.len() + 1).sum());
        for record in records {
            buf.extend_from_slice(record.as_bytes());
            buf.push(b'\n');
        }
        self.writer.write_all(&buf)?;
        self.writer.flush()
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn deliver(&mut self, records: &[String]) -> Result<Delivery> {
        match self.write_batch(records) {
            Ok(()) => Ok(Delivery::Accepted),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Delivery::Rejected),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(Error::SinkClosed),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::bounded;

    fn batch(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_channel_sink_accepts_until_full() {
        let (tx, rx) = bounded(1);
        let mut sink = ChannelSink::new(tx);

        assert_eq!(sink.deliver(&batch(&["a", "b"])).unwrap(), Delivery::Accepted);
        assert_eq!(sink.deliver(&batch(&["c"])).unwrap(), Delivery::Rejected);

        assert_eq!(rx.try_recv(), Some(batch(&["a", "b"])));
        assert_eq!(sink.deliver(&batch(&["c"])).unwrap(), Delivery::Accepted);
        assert_eq!(rx.try_recv(), Some(batch(&["c"])));
    }

    #[test]
    fn test_channel_sink_closed() {
        let (tx, rx) = bounded(1);
        let mut sink = ChannelSink::new(tx);
        drop(rx);

        let err = sink.deliver(&batch(&["a"])).unwrap_err();
        assert!(matches!(err, Error::SinkClosed));
    }

    #[test]
    fn test_writer_sink_writes_lines() {
        let mut sink = WriterSink::new(Vec::new());

        assert_eq!(sink.deliver(&batch(&["one", "two"])).unwrap(), Delivery::Accepted);
        assert_eq!(sink.deliver(&batch(&["three"])).unwrap(), Delivery::Accepted);

        assert_eq!(sink.into_inner(), b"one\ntwo\nthree\n".to_vec());
    }

    struct Failing(io::ErrorKind);

    impl Write for Failing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_sink_errors() {
        let mut sink = WriterSink::new(Failing(io::ErrorKind::WouldBlock));
        assert_eq!(sink.deliver(&batch(&["a"])).unwrap(), Delivery::Rejected);

        let mut sink = WriterSink::new(Failing(io::ErrorKind::BrokenPipe));
        assert!(matches!(sink.deliver(&batch(&["a"])), Err(Error::SinkClosed)));

        let mut sink = WriterSink::new(Failing(io::ErrorKind::PermissionDenied));
        assert!(matches!(sink.deliver(&batch(&["a"])), Err(Error::Io(_))));
    }
}
