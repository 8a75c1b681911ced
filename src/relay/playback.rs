use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};

use crate::error::{RelayError, Result};

/// Bounded single-producer single-consumer queue of decoded PCM payloads
///
/// The producer (downlink) suspends while the queue is full; a push that
/// stays blocked past `push_timeout` is a resource error.
pub fn playback_queue(capacity: usize, push_timeout: Duration) -> (PlaybackProducer, PlaybackConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PlaybackProducer {
            tx,
            push_timeout,
            capacity: capacity.max(1),
        },
        PlaybackConsumer { rx },
    )
}

/// Downlink side of the playback queue
#[derive(Debug)]
pub struct PlaybackProducer {
    tx: mpsc::Sender<Vec<u8>>,
    push_timeout: Duration,
    capacity: usize,
}

impl PlaybackProducer {
    /// Append one payload, waiting for room
    pub async fn push(&self, pcm: Vec<u8>) -> Result<()> {
        match self.tx.send_timeout(pcm, self.push_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(RelayError::Resource(format!(
                "playback queue full ({} payloads) for {:?}",
                self.capacity, self.push_timeout
            ))),
            Err(SendTimeoutError::Closed(_)) => Err(RelayError::Cancelled),
        }
    }

    /// Payloads currently queued
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outbound side of the playback queue
#[derive(Debug)]
pub struct PlaybackConsumer {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PlaybackConsumer {
    /// Next payload if one is queued; never waits
    pub fn try_pop(&mut self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(pcm) => Some(pcm),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let (producer, mut consumer) = playback_queue(4, Duration::from_millis(10));
        producer.push(vec![1]).await.unwrap();
        producer.push(vec![2]).await.unwrap();
        assert_eq!(producer.len(), 2);
        assert_eq!(consumer.try_pop(), Some(vec![1]));
        assert_eq!(consumer.try_pop(), Some(vec![2]));
        assert_eq!(consumer.try_pop(), None);
        assert!(producer.is_empty());
    }

    #[tokio::test]
    async fn test_push_after_consumer_dropped_is_cancelled() {
        let (producer, consumer) = playback_queue(1, Duration::from_millis(10));
        drop(consumer);
        assert!(matches!(producer.push(vec![0]).await, Err(RelayError::Cancelled)));
    }
}
