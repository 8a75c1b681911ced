// Integration tests for outbound pacing
//
// The outbound track keeps a steady cadence, filling gaps with silence, and
// forwards text replies as they arrive.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_relay::media::{ChannelSink, SinkItem};
use voice_relay::relay::playback_queue;
use voice_relay::session::RelayCounters;
use voice_relay::{CancelToken, OutboundTrackAdapter};

#[tokio::test]
async fn test_cadence_with_silence() -> Result<()> {
    let counters = Arc::new(RelayCounters::default());
    let (sink, mut sink_rx) = ChannelSink::new(256);
    let (_producer, consumer) = playback_queue(8, Duration::from_millis(50));
    let (_text_tx, text_rx) = mpsc::channel::<String>(8);

    let outbound = OutboundTrackAdapter::new(
        Box::new(sink),
        consumer,
        text_rx,
        Duration::from_millis(20),
        counters.clone(),
    );
    let cancel = CancelToken::new();
    let task = tokio::spawn(outbound.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    task.await??;

    let mut frames = Vec::new();
    while let Ok(item) = sink_rx.try_recv() {
        if let SinkItem::Frame(frame) = item {
            frames.push(frame);
        }
    }

    // ~10 ticks in 200 ms, allowing for scheduler jitter
    assert!((8..=13).contains(&frames.len()), "got {} frames", frames.len());
    assert!(frames.iter().all(|f| f.len() == 640 && f.iter().all(|b| *b == 0)));
    assert_eq!(RelayCounters::get(&counters.silence_frames), frames.len() as u64);
    assert_eq!(RelayCounters::get(&counters.frames_out), frames.len() as u64);
    Ok(())
}

#[tokio::test]
async fn test_queued_audio_then_silence() -> Result<()> {
    let counters = Arc::new(RelayCounters::default());
    let (sink, mut sink_rx) = ChannelSink::new(256);
    let (producer, consumer) = playback_queue(8, Duration::from_millis(50));
    let (_text_tx, text_rx) = mpsc::channel::<String>(8);

    producer.push(vec![7u8; 1280]).await?;

    let outbound = OutboundTrackAdapter::new(
        Box::new(sink),
        consumer,
        text_rx,
        Duration::from_millis(20),
        counters.clone(),
    );
    let cancel = CancelToken::new();
    let task = tokio::spawn(outbound.run(cancel.clone()));

    let mut frames = Vec::new();
    while frames.len() < 3 {
        match tokio::time::timeout(Duration::from_secs(1), sink_rx.recv()).await? {
            Some(SinkItem::Frame(frame)) => frames.push(frame),
            Some(SinkItem::Text(_)) => {}
            None => break,
        }
    }
    cancel.cancel();
    task.await??;

    assert_eq!(frames[0], vec![7u8; 640]);
    assert_eq!(frames[1], vec![7u8; 640]);
    assert_eq!(frames[2], vec![0u8; 640]);
    assert!(RelayCounters::get(&counters.silence_frames) >= 1);
    Ok(())
}

#[tokio::test]
async fn test_text_is_forwarded() -> Result<()> {
    let counters = Arc::new(RelayCounters::default());
    let (sink, mut sink_rx) = ChannelSink::new(256);
    let (_producer, consumer) = playback_queue(8, Duration::from_millis(50));
    let (text_tx, text_rx) = mpsc::channel::<String>(8);

    let outbound = OutboundTrackAdapter::new(Box::new(sink), consumer, text_rx, Duration::from_millis(20), counters);
    let cancel = CancelToken::new();
    let task = tokio::spawn(outbound.run(cancel.clone()));

    text_tx.send("hello".to_string()).await?;

    let mut text = None;
    while text.is_none() {
        match tokio::time::timeout(Duration::from_secs(1), sink_rx.recv()).await? {
            Some(SinkItem::Text(t)) => text = Some(t),
            Some(SinkItem::Frame(_)) => {}
            None => break,
        }
    }
    assert_eq!(text.as_deref(), Some("hello"));

    cancel.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn test_sink_failure_stops_quietly() -> Result<()> {
    let counters = Arc::new(RelayCounters::default());
    let (sink, sink_rx) = ChannelSink::new(4);
    let (_producer, consumer) = playback_queue(8, Duration::from_millis(50));
    let (_text_tx, text_rx) = mpsc::channel::<String>(8);

    // Device gone before the first tick
    drop(sink_rx);

    let outbound = OutboundTrackAdapter::new(Box::new(sink), consumer, text_rx, Duration::from_millis(20), counters);
    let result = tokio::time::timeout(Duration::from_secs(1), outbound.run(CancelToken::new())).await?;

    assert!(result.is_ok());
    Ok(())
}
