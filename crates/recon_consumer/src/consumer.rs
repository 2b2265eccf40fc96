//! The poll loop.

use crate::cancel::CancellationToken;
use crate::config::ConsumerConfig;
use crate::error::ConsumerResult;
use crate::handler::MessageHandler;
use crate::source::{Message, MessageSource};
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn};

/// Counters for one [`Consumer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages handled successfully.
    pub processed: u64,
    /// Messages whose decoding or handling failed.
    pub failed: u64,
    /// Offsets committed.
    pub committed: u64,
    /// Polls that returned an error.
    pub source_errors: u64,
}

/// Feeds messages from a [`MessageSource`] to a [`MessageHandler`].
pub struct Consumer<S: MessageSource, H: MessageHandler> {
    config: ConsumerConfig,
    source: S,
    handler: H,
}

impl<S: MessageSource, H: MessageHandler> Consumer<S, H> {
    /// Creates a new consumer.
    pub fn new(config: ConsumerConfig, source: S, handler: H) -> Self {
        Self {
            config,
            source,
            handler,
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Gets the message source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Gets the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the consumer, returning its source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Polls until `token` is cancelled or the source is exhausted.
    ///
    /// Handler failures and source errors are logged and do not stop the
    /// loop. The source is closed before returning.
    pub fn run(&mut self, token: &CancellationToken) -> ConsumerResult<ConsumerStats> {
        self.config.validate()?;
        let topics = self.config.topics();
        let span = info_span!("consumer", group_id = self.config.group_id());
        let _enter = span.enter();

        info!(?topics, "starting consumer");
        let result = self
            .source
            .subscribe(&topics)
            .map(|()| self.poll_loop(token));
        info!("closing consumer");
        let closed = self.source.close();

        let stats = result?;
        closed?;
        info!(
            processed = stats.processed,
            failed = stats.failed,
            committed = stats.committed,
            "consumer stopped"
        );
        Ok(stats)
    }

    fn poll_loop(&mut self, token: &CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        let timeout = self.config.poll_timeout();

        while !token.is_cancelled() {
            let message = match self.source.poll(timeout) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    if self.source.is_exhausted() {
                        debug!("source exhausted");
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    error!(error = %err, "failed to poll message");
                    stats.source_errors += 1;
                    if self.source.is_exhausted() {
                        debug!("source exhausted after error");
                        break;
                    }
                    continue;
                }
            };

            info!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "processing message"
            );
            match self.process(&message) {
                Ok(()) => stats.processed += 1,
                Err(err) => {
                    error!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %err,
                        "failed to process message"
                    );
                    stats.failed += 1;
                }
            }

            match self.source.commit(&message) {
                Ok(()) => stats.committed += 1,
                Err(err) => warn!(offset = message.offset, error = %err, "failed to commit offset"),
            }
        }

        if token.is_cancelled() {
            info!("consumer cancelled");
        }
        stats
    }

    fn process(&self, message: &Message) -> ConsumerResult<()> {
        let payload: Value = serde_json::from_slice(&message.payload)?;
        self.handler.handle(&message.topic, payload)
    }
}
