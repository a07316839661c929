//! End-to-end pipeline tests: packets in, transcripts out.

use std::sync::Arc;
use std::time::Duration;
use tablescribe::audio::StreamInfo;
use tablescribe::{
    AudioPacket, AudioProcessor, CollectorSink, MockRecognizer, ProcessorConfig,
};
use tempfile::tempdir;

fn test_config(diagnostics: &std::path::Path, threshold: Duration) -> ProcessorConfig {
    ProcessorConfig {
        info: StreamInfo {
            sample_rate: 48_000,
            channels: 2,
        },
        language: "en-US".to_string(),
        silence_threshold: threshold,
        detector_tick: Duration::from_millis(100),
        dispatch_queue_depth: 10,
        recordings_dir: None,
        diagnostics_dir: diagnostics.to_path_buf(),
    }
}

fn voice_packet(source_tag: u32, sequence: u16) -> AudioPacket {
    AudioPacket {
        source_tag,
        sequence,
        timestamp: u32::from(sequence) * 960,
        payload: vec![0x42; 50],
    }
}

fn silence_marker(source_tag: u32, sequence: u16) -> AudioPacket {
    AudioPacket {
        source_tag,
        sequence,
        timestamp: u32::from(sequence) * 960,
        payload: vec![0xF8, 0xFF, 0xFE],
    }
}

/// Yields until `done` returns true or the budget is spent.
async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn burst_then_silence_yields_one_segment() {
    let dir = tempdir().unwrap();
    let recognizer = Arc::new(MockRecognizer::new().with_response("we march at dawn"));
    let sink = Arc::new(CollectorSink::new());

    let processor = AudioProcessor::new(
        test_config(dir.path(), Duration::from_secs(2)),
        Arc::clone(&recognizer) as Arc<dyn tablescribe::Recognizer>,
        Arc::clone(&sink) as Arc<dyn tablescribe::TranscriptSink>,
    );
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let handle = processor.start(rx);

    for seq in 0..10 {
        tx.send(voice_packet(7, seq)).await.unwrap();
    }
    wait_for(|| handle.counters().packets_received == 10).await;

    // Past the threshold the detector flushes the source exactly once.
    tokio::time::sleep(Duration::from_millis(2200)).await;
    wait_for(|| recognizer.call_count() == 1).await;
    assert_eq!(recognizer.call_count(), 1);

    // More quiet time must not flush the now-empty buffer again.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(recognizer.call_count(), 1);

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, 7);
    assert_eq!(received[0].1, "we march at dawn");

    drop(tx);
    let snapshot = handle.stop().await;
    assert_eq!(snapshot.segments_dispatched, 1);
    assert_eq!(snapshot.batches_dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn interleaved_sources_flush_independently() {
    let dir = tempdir().unwrap();
    let recognizer = Arc::new(MockRecognizer::new().with_response("ok"));
    let sink = Arc::new(CollectorSink::new());

    let processor = AudioProcessor::new(
        test_config(dir.path(), Duration::from_secs(2)),
        Arc::clone(&recognizer) as Arc<dyn tablescribe::Recognizer>,
        Arc::clone(&sink) as Arc<dyn tablescribe::TranscriptSink>,
    );
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let handle = processor.start(rx);

    // Two speakers talking over each other.
    for seq in 0..6 {
        tx.send(voice_packet(1, seq)).await.unwrap();
        tx.send(voice_packet(2, seq)).await.unwrap();
    }
    wait_for(|| handle.counters().packets_received == 12).await;

    tokio::time::sleep(Duration::from_millis(2200)).await;
    wait_for(|| recognizer.call_count() == 2).await;
    assert_eq!(recognizer.call_count(), 2);

    let mut tags: Vec<u32> = sink.received().iter().map(|(tag, _, _)| *tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec![1, 2]);

    drop(tx);
    let snapshot = handle.stop().await;
    assert_eq!(snapshot.segments_dispatched, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_only_buffered_sources() {
    let dir = tempdir().unwrap();
    let recordings = dir.path().join("recordings");
    let recognizer = Arc::new(MockRecognizer::new().with_response("last words"));
    let sink = Arc::new(CollectorSink::new());

    // Threshold far beyond the test so only shutdown can flush.
    let mut config = test_config(dir.path(), Duration::from_secs(600));
    config.recordings_dir = Some(recordings.clone());

    let processor = AudioProcessor::new(
        config,
        Arc::clone(&recognizer) as Arc<dyn tablescribe::Recognizer>,
        Arc::clone(&sink) as Arc<dyn tablescribe::TranscriptSink>,
    );
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let handle = processor.start(rx);

    for seq in 0..5 {
        tx.send(voice_packet(1, seq)).await.unwrap();
    }
    tx.send(silence_marker(2, 0)).await.unwrap();
    wait_for(|| handle.counters().packets_received == 6).await;
    assert_eq!(recognizer.call_count(), 0);

    drop(tx);
    let snapshot = handle.stop().await;

    // Source 1 had buffered audio; source 2 sent only a silence marker.
    assert_eq!(snapshot.segments_dispatched, 1);
    assert_eq!(snapshot.silence_markers, 1);
    assert_eq!(recognizer.call_count(), 1);
    assert_eq!(sink.received()[0].0, 1);

    // Only the speaking source gets an archive, finalized on close.
    let archives: Vec<_> = std::fs::read_dir(&recordings)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(archives.len(), 1);
    let name = archives[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("audio_") && name.ends_with("_1.ogg"), "{name}");
    assert!(archives[0].metadata().unwrap().len() > 0);
}

#[tokio::test(start_paused = true)]
async fn failed_recognition_persists_segment() {
    let dir = tempdir().unwrap();
    let recognizer = Arc::new(MockRecognizer::new().with_failure());
    let sink = Arc::new(CollectorSink::new());

    let processor = AudioProcessor::new(
        test_config(dir.path(), Duration::from_secs(2)),
        Arc::clone(&recognizer) as Arc<dyn tablescribe::Recognizer>,
        Arc::clone(&sink) as Arc<dyn tablescribe::TranscriptSink>,
    );
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let handle = processor.start(rx);

    for seq in 0..4 {
        tx.send(voice_packet(3, seq)).await.unwrap();
    }
    wait_for(|| handle.counters().packets_received == 4).await;
    tokio::time::sleep(Duration::from_millis(2200)).await;
    wait_for(|| recognizer.call_count() == 1).await;

    drop(tx);
    let snapshot = handle.stop().await;
    assert_eq!(snapshot.recognitions_failed, 1);
    assert!(sink.received().is_empty());

    let saved: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("failed_") && name.ends_with("_3.ogg"), "{name}");
}
