// Integration tests for the response path
//
// Text replies go to the device text channel, audio lands in the playback
// queue in arrival order, and a full queue eventually becomes a resource error.

mod common;

use anyhow::Result;
use common::{audio_event, text_event, ScriptedResponses};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_relay::relay::playback_queue;
use voice_relay::session::RelayCounters;
use voice_relay::{CancelToken, DownlinkReceiver, RelayError};

fn pcm(value: u8, len: usize) -> Vec<u8> {
    vec![value; len]
}

#[tokio::test]
async fn test_response_is_routed_in_order() -> Result<()> {
    let script = vec![
        text_event("hi"),
        audio_event(&pcm(1, 640), 1),
        audio_event(&pcm(2, 960), 2),
        text_event("bye<end>"),
        // Belongs to the next response; never read
        text_event("late"),
    ];
    let counters = Arc::new(RelayCounters::default());
    let (text_tx, mut text_rx) = mpsc::channel(8);
    let (producer, mut consumer) = playback_queue(8, Duration::from_millis(100));

    let mut downlink = DownlinkReceiver::new(
        Box::new(ScriptedResponses::new(vec![script])),
        text_tx,
        producer,
        counters.clone(),
        Duration::from_millis(10),
    );

    let payloads = downlink.receive_response().await?;
    assert_eq!(payloads, 4);

    assert_eq!(text_rx.try_recv()?, "hi");
    assert_eq!(text_rx.try_recv()?, "bye");
    assert!(text_rx.try_recv().is_err());

    assert_eq!(consumer.try_pop(), Some(pcm(1, 640)));
    assert_eq!(consumer.try_pop(), Some(pcm(2, 960)));
    assert_eq!(consumer.try_pop(), None);

    assert_eq!(RelayCounters::get(&counters.text_events), 2);
    assert_eq!(RelayCounters::get(&counters.audio_payloads), 2);
    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_is_skipped() -> Result<()> {
    let script = vec![
        "not json".to_string(),
        r#"{"unexpected": true}"#.to_string(),
        text_event("still here<end>"),
    ];
    let counters = Arc::new(RelayCounters::default());
    let (text_tx, mut text_rx) = mpsc::channel(8);
    let (producer, _consumer) = playback_queue(8, Duration::from_millis(100));

    let mut downlink = DownlinkReceiver::new(
        Box::new(ScriptedResponses::new(vec![script])),
        text_tx,
        producer,
        counters.clone(),
        Duration::from_millis(10),
    );

    assert_eq!(downlink.receive_response().await?, 3);
    assert_eq!(text_rx.try_recv()?, "still here");
    assert_eq!(RelayCounters::get(&counters.events_dropped), 2);
    Ok(())
}

#[tokio::test]
async fn test_choices_form_plays_audio_before_text() -> Result<()> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let payload = serde_json::json!({
        "choices": [{ "audio": BASE64.encode(pcm(9, 320)), "text": "ok<end>" }]
    })
    .to_string();
    let counters = Arc::new(RelayCounters::default());
    let (text_tx, mut text_rx) = mpsc::channel(8);
    let (producer, mut consumer) = playback_queue(8, Duration::from_millis(100));

    let mut downlink = DownlinkReceiver::new(
        Box::new(ScriptedResponses::new(vec![vec![payload]])),
        text_tx,
        producer,
        counters,
        Duration::from_millis(10),
    );

    assert_eq!(downlink.receive_response().await?, 1);
    assert_eq!(consumer.try_pop(), Some(pcm(9, 320)));
    assert_eq!(text_rx.try_recv()?, "ok");
    Ok(())
}

#[tokio::test]
async fn test_empty_stream_is_reopened() -> Result<()> {
    let responses = ScriptedResponses::new(vec![vec![], vec![text_event("second<end>")]]);
    let opens = responses.opens.clone();
    let counters = Arc::new(RelayCounters::default());
    let (text_tx, mut text_rx) = mpsc::channel(8);
    let (producer, _consumer) = playback_queue(8, Duration::from_millis(100));

    let downlink = DownlinkReceiver::new(Box::new(responses), text_tx, producer, counters, Duration::from_millis(10));
    let cancel = CancelToken::new();
    let task = tokio::spawn(downlink.run(cancel.clone()));

    let text = tokio::time::timeout(Duration::from_secs(1), text_rx.recv()).await?;
    assert_eq!(text.as_deref(), Some("second"));
    assert!(opens.load(Ordering::SeqCst) >= 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await???;
    Ok(())
}

#[tokio::test]
async fn test_full_playback_queue_is_a_resource_error() -> Result<()> {
    const CAPACITY: usize = 2;
    let script: Vec<String> = (0..5).map(|i| audio_event(&pcm(i as u8, 640), i)).collect();
    let counters = Arc::new(RelayCounters::default());
    let (text_tx, _text_rx) = mpsc::channel(8);
    let (producer, mut consumer) = playback_queue(CAPACITY, Duration::from_millis(50));

    let downlink = DownlinkReceiver::new(
        Box::new(ScriptedResponses::new(vec![script])),
        text_tx,
        producer,
        counters.clone(),
        Duration::from_millis(10),
    );

    // Nobody drains the queue
    let err = tokio::time::timeout(Duration::from_secs(1), downlink.run(CancelToken::new()))
        .await?
        .unwrap_err();

    assert!(matches!(err, RelayError::Resource(_)), "got {:?}", err);
    assert_eq!(RelayCounters::get(&counters.audio_payloads), CAPACITY as u64);

    let mut queued = 0;
    while consumer.try_pop().is_some() {
        queued += 1;
    }
    assert_eq!(queued, CAPACITY);
    Ok(())
}

#[tokio::test]
async fn test_blocked_push_resumes_after_a_pop() -> Result<()> {
    let (producer, mut consumer) = playback_queue(2, Duration::from_secs(5));
    let producer = Arc::new(producer);
    producer.push(pcm(1, 4)).await?;
    producer.push(pcm(2, 4)).await?;
    assert_eq!(producer.len(), 2);

    let pusher = {
        let producer = producer.clone();
        tokio::spawn(async move { producer.push(pcm(3, 4)).await })
    };

    // Full queue: the producer waits
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pusher.is_finished(), "push did not wait for room");
    assert_eq!(producer.len(), 2);

    assert_eq!(consumer.try_pop(), Some(pcm(1, 4)));
    tokio::time::timeout(Duration::from_secs(1), pusher).await???;

    assert!(producer.len() <= 2);
    assert_eq!(consumer.try_pop(), Some(pcm(2, 4)));
    assert_eq!(consumer.try_pop(), Some(pcm(3, 4)));
    Ok(())
}
