// Integration tests for the inbound pipeline
//
// Device bytes -> normalizer -> framer -> chunk accumulator, wired the same
// way the session wires them.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_relay::audio::format::samples_to_bytes;
use voice_relay::media::ChannelSource;
use voice_relay::session::RelayCounters;
use voice_relay::{AudioChunk, AudioFormat, CancelToken, ChunkAccumulator, ChunkConfig, InboundTrackAdapter};

/// Feed `payloads` through the inbound adapter and accumulator, collecting every chunk
async fn run_pipeline(format: AudioFormat, payloads: Vec<Vec<u8>>) -> Result<(Vec<AudioChunk>, Arc<RelayCounters>)> {
    let counters = Arc::new(RelayCounters::default());
    let cancel = CancelToken::new();

    let (source, device_tx) = ChannelSource::new(format, 16);
    let (frames_tx, frames_rx) = mpsc::channel(64);
    let (chunks_tx, mut chunks_rx) = mpsc::channel(64);

    let inbound = InboundTrackAdapter::new(Box::new(source), Duration::from_millis(20), frames_tx, counters.clone());
    let inbound = tokio::spawn(inbound.run(cancel.clone()));

    let token = cancel.clone();
    let accumulate = tokio::spawn(async move {
        let mut accumulator = ChunkAccumulator::new(ChunkConfig::new(16_000));
        accumulator.accumulate(frames_rx, chunks_tx, token).await
    });

    tokio::spawn(async move {
        for payload in payloads {
            if device_tx.send(payload).await.is_err() {
                break;
            }
        }
    });

    let mut chunks = Vec::new();
    while let Some(chunk) = tokio::time::timeout(Duration::from_secs(5), chunks_rx.recv()).await? {
        chunks.push(chunk);
    }

    inbound.await??;
    let sent = accumulate.await?;
    assert_eq!(sent, chunks.len());

    Ok((chunks, counters))
}

#[tokio::test]
async fn test_three_and_a_half_seconds_make_four_chunks() -> Result<()> {
    // 3.5 s at 16 kHz mono, delivered in odd-sized pieces that split samples
    let samples: Vec<i16> = (0..56_000).map(|i| (i % 2000) as i16 - 1000).collect();
    let bytes = samples_to_bytes(&samples);
    let payloads: Vec<Vec<u8>> = bytes.chunks(333).map(<[u8]>::to_vec).collect();

    let (chunks, counters) = run_pipeline(AudioFormat::default(), payloads).await?;

    let lengths: Vec<usize> = chunks.iter().map(|c| c.samples.len()).collect();
    assert_eq!(lengths, vec![16_000, 16_000, 16_000, 8_000]);

    let sequences: Vec<u64> = chunks.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    assert!(chunks[..3].iter().all(|c| !c.is_final));
    assert!(chunks[3].is_final);
    assert_eq!(chunks[3].duration(), Duration::from_millis(500));

    // Nothing lost, duplicated or reordered between device and chunks
    let rebuilt: Vec<i16> = chunks.iter().flat_map(|c| c.samples.iter().copied()).collect();
    assert_eq!(rebuilt, samples);

    assert_eq!(RelayCounters::get(&counters.bytes_in), 112_000);
    assert_eq!(RelayCounters::get(&counters.frames_in), 175);
    assert_eq!(RelayCounters::get(&counters.payloads_dropped), 0);
    Ok(())
}

#[tokio::test]
async fn test_stereo_48k_input_is_normalized() -> Result<()> {
    let format = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
    };

    // One second of constant stereo audio in 20 ms payloads
    let payload = samples_to_bytes(&vec![1000i16; 960 * 2]);
    let payloads = vec![payload; 50];

    let (chunks, counters) = run_pipeline(format, payloads).await?;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].sample_rate, 16_000);
    assert_eq!(chunks[0].samples.len(), 16_000);
    assert!(chunks[0].samples.iter().all(|&s| s == 1000));
    assert_eq!(RelayCounters::get(&counters.frames_in), 50);
    Ok(())
}

#[tokio::test]
async fn test_fractional_rate_keeps_every_sample_across_payloads() -> Result<()> {
    let format = AudioFormat {
        sample_rate: 44_100,
        channels: 1,
    };

    // One second in 100-sample payloads; each alone would floor to 36 samples
    let payload = samples_to_bytes(&vec![1000i16; 100]);
    let payloads = vec![payload; 441];

    let (chunks, counters) = run_pipeline(format, payloads).await?;

    let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
    assert_eq!(total, 16_000);
    assert!(chunks.iter().all(|c| c.samples.iter().all(|&s| s == 1000)));
    assert_eq!(RelayCounters::get(&counters.frames_in), 50);
    Ok(())
}

#[tokio::test]
async fn test_misaligned_payload_is_dropped_not_fatal() -> Result<()> {
    let format = AudioFormat {
        sample_rate: 16_000,
        channels: 2,
    };

    let good = samples_to_bytes(&vec![200i16; 320 * 2]);
    let payloads = vec![good.clone(), vec![1, 2, 3], good];

    let (chunks, counters) = run_pipeline(format, payloads).await?;

    assert_eq!(RelayCounters::get(&counters.payloads_dropped), 1);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_final);
    assert_eq!(chunks[0].samples.len(), 640);
    Ok(())
}

#[tokio::test]
async fn test_cancel_discards_buffered_audio() -> Result<()> {
    let counters = Arc::new(RelayCounters::default());
    let cancel = CancelToken::new();

    let (source, device_tx) = ChannelSource::new(AudioFormat::default(), 16);
    let (frames_tx, frames_rx) = mpsc::channel(64);
    let (chunks_tx, mut chunks_rx) = mpsc::channel(64);

    let inbound = InboundTrackAdapter::new(Box::new(source), Duration::from_millis(20), frames_tx, counters.clone());
    let inbound = tokio::spawn(inbound.run(cancel.clone()));
    let token = cancel.clone();
    let accumulate = tokio::spawn(async move {
        let mut accumulator = ChunkAccumulator::new(ChunkConfig::new(16_000));
        accumulator.accumulate(frames_rx, chunks_tx, token).await
    });

    // Half a second: never enough for a full chunk
    device_tx.send(vec![0u8; 16_000]).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    inbound.await??;
    assert_eq!(accumulate.await?, 0);
    assert!(chunks_rx.recv().await.is_none());
    drop(device_tx);
    Ok(())
}
