//! Message source abstraction.

use crate::error::{ConsumerError, ConsumerResult};
use std::collections::VecDeque;
use std::io::{BufRead, ErrorKind};
use std::time::Duration;
use tracing::debug;

/// One message delivered by a [`MessageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Raw payload, expected to be UTF-8 JSON.
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a message on partition 0.
    pub fn new(topic: impl Into<String>, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset,
            payload: payload.into(),
        }
    }
}

/// A subscribable stream of messages with manual offset commits.
///
/// This trait abstracts the broker client, allowing for different
/// implementations (Kafka, files, in-memory for tests).
pub trait MessageSource: Send {
    /// Subscribes to `topics`, replacing any earlier subscription.
    fn subscribe(&mut self, topics: &[String]) -> ConsumerResult<()>;

    /// Waits up to `timeout` for the next message.
    fn poll(&mut self, timeout: Duration) -> ConsumerResult<Option<Message>>;

    /// Commits the offset of `message`.
    fn commit(&mut self, message: &Message) -> ConsumerResult<()>;

    /// Leaves the group and releases the connection.
    fn close(&mut self) -> ConsumerResult<()>;

    /// Returns true if no message will ever arrive again.
    ///
    /// Broker sources never run dry; finite sources return true once
    /// drained so the consumer can stop.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// In-memory source for testing.
///
/// Messages are delivered in push order, skipping topics that are not
/// subscribed. Queued errors are returned from `poll` in place.
#[derive(Debug, Default)]
pub struct MemorySource {
    queue: VecDeque<Result<Message, String>>,
    subscribed: Vec<String>,
    committed: Vec<Message>,
    closed: bool,
    fail_commits: bool,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source preloaded with `messages`.
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut source = Self::new();
        for message in messages {
            source.push(message);
        }
        source
    }

    /// Queues a message.
    pub fn push(&mut self, message: Message) {
        self.queue.push_back(Ok(message));
    }

    /// Queues a poll error.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.queue.push_back(Err(error.into()));
    }

    /// Makes every commit fail.
    pub fn fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Current subscription.
    pub fn subscribed(&self) -> &[String] {
        &self.subscribed
    }

    /// Messages committed so far, in commit order.
    pub fn committed(&self) -> &[Message] {
        &self.committed
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of queued entries not yet polled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn ensure_open(&self) -> ConsumerResult<()> {
        if self.closed {
            return Err(ConsumerError::NotReady("source is closed"));
        }
        Ok(())
    }
}

impl MessageSource for MemorySource {
    fn subscribe(&mut self, topics: &[String]) -> ConsumerResult<()> {
        self.ensure_open()?;
        self.subscribed = topics.to_vec();
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> ConsumerResult<Option<Message>> {
        self.ensure_open()?;
        if self.subscribed.is_empty() {
            return Err(ConsumerError::NotReady("poll before subscribe"));
        }

        while let Some(entry) = self.queue.pop_front() {
            match entry {
                Ok(message) if self.subscribed.contains(&message.topic) => {
                    return Ok(Some(message))
                }
                Ok(message) => {
                    debug!(topic = %message.topic, offset = message.offset, "dropping message from unsubscribed topic");
                }
                Err(error) => return Err(ConsumerError::Source(error)),
            }
        }
        Ok(None)
    }

    fn commit(&mut self, message: &Message) -> ConsumerResult<()> {
        self.ensure_open()?;
        if self.fail_commits {
            return Err(ConsumerError::Source("commit rejected".into()));
        }
        self.committed.push(message.clone());
        Ok(())
    }

    fn close(&mut self) -> ConsumerResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Reads one JSON payload per line from a reader.
///
/// Every line is delivered on the topic given at construction, with its
/// one-based line number as offset. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    topic: String,
    line: i64,
    subscribed: bool,
    exhausted: bool,
    committed: Option<i64>,
}

impl<R: BufRead + Send> JsonLinesSource<R> {
    /// Creates a source reading `reader` as `topic`.
    pub fn new(reader: R, topic: impl Into<String>) -> Self {
        Self {
            reader,
            topic: topic.into(),
            line: 0,
            subscribed: false,
            exhausted: false,
            committed: None,
        }
    }

    /// Offset of the last committed line.
    pub fn committed_offset(&self) -> Option<i64> {
        self.committed
    }
}

impl<R: BufRead + Send> MessageSource for JsonLinesSource<R> {
    fn subscribe(&mut self, topics: &[String]) -> ConsumerResult<()> {
        if !topics.contains(&self.topic) {
            return Err(ConsumerError::Config(format!(
                "input topic {} is not among {topics:?}",
                self.topic
            )));
        }
        self.subscribed = true;
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> ConsumerResult<Option<Message>> {
        if !self.subscribed {
            return Err(ConsumerError::NotReady("poll before subscribe"));
        }

        let mut buf = String::new();
        loop {
            if self.exhausted {
                return Ok(None);
            }
            buf.clear();
            let read = match self.reader.read_line(&mut buf) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::InvalidData => {
                    // the undecodable line is consumed; keep offsets aligned
                    self.line += 1;
                    return Err(err.into());
                }
                Err(err) => {
                    self.exhausted = true;
                    return Err(err.into());
                }
            };
            if read == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.line += 1;

            let payload = buf.trim();
            if !payload.is_empty() {
                return Ok(Some(Message::new(
                    self.topic.clone(),
                    self.line,
                    payload.as_bytes(),
                )));
            }
        }
    }

    fn commit(&mut self, message: &Message) -> ConsumerResult<()> {
        self.committed = Some(message.offset);
        Ok(())
    }

    fn close(&mut self) -> ConsumerResult<()> {
        self.exhausted = true;
        self.subscribed = false;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
