//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合成测试图案经完整引擎的端到端测试
//! - 配置 → 采集 → 会话 → 分发 的管道测试

#[cfg(test)]
mod contract_tests {
    use contracts::tone::{decode_codeword, encode_codeword, Modulation};

    #[test]
    fn test_codeword_survives_both_modulations() {
        for (modulation, modulus) in [(Modulation::Bpsk, 256), (Modulation::Qpsk, 65_536)] {
            for index in [0, 1, modulus / 2, modulus - 1] {
                let codeword = encode_codeword(index, modulation);
                assert_eq!(decode_codeword(codeword, modulation), Some(index));
            }
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        PixelFormat, RunConfig, SinkConfig, SinkType, SyncEvent, SyncFoundEvent,
        TYPE_AUDIO_START_AT_SYNC, TYPE_QPSK,
    };
    use dispatcher::create_dispatcher;
    use ingestion::{BackpressureConfig, SyntheticCapture};
    use observability::MarkerStatistics;
    use sync_engine::SyncSession;
    use tokio::sync::mpsc;

    const SAMPLE_PERIOD_NS: i64 = 20_834;

    fn run_config(pixel_format: PixelFormat) -> RunConfig {
        let mut run = ConfigLoader::default_config();
        run.capture.width = 320;
        run.capture.height = 180;
        run.capture.pixel_format = pixel_format;
        run.pattern.quantization_frames = 3;
        run.pattern.duration_s = 6.0;
        run.sinks.clear();
        run
    }

    /// Feed both streams through one session in timestamp order
    fn run_offline(run: &RunConfig) -> Vec<SyncEvent> {
        let capture = SyntheticCapture::new(&run.capture, &run.pattern).unwrap();
        let mut session = SyncSession::new(&run.engine, &run.capture_format()).unwrap();

        let mut frames = capture.video_frames().peekable();
        let mut blocks = capture.audio_blocks().peekable();
        let mut events = Vec::new();

        loop {
            let next_video = frames.peek().map(|f| f.timestamp);
            let next_audio = blocks.peek().map(|b| b.timestamp);
            match (next_video, next_audio) {
                (None, None) => break,
                (Some(v), Some(a)) if a < v => {
                    let block = blocks.next().unwrap();
                    events.extend(session.process_audio(&block));
                }
                (Some(_), _) => {
                    let frame = frames.next().unwrap();
                    events.extend(session.process_video(&frame));
                }
                (None, Some(_)) => {
                    let block = blocks.next().unwrap();
                    events.extend(session.process_audio(&block));
                }
            }
        }
        events
    }

    fn pairings(events: &[SyncEvent]) -> Vec<SyncFoundEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::SyncFound(found) => Some(*found),
                _ => None,
            })
            .collect()
    }

    /// Video step at 5 s, audio frame locked 50 us later
    #[test]
    fn test_e2e_latency_at_five_seconds() {
        let mut run = run_config(PixelFormat::Nv12);
        run.pattern.audio_delay_ns = 50_000;

        let events = run_offline(&run);
        let found = pairings(&events);
        let at_five = found
            .iter()
            .find(|f| f.index == 16)
            .expect("no pairing for index 16");

        assert_eq!(at_five.video_ts, 5_000_000_000);
        let latency = at_five.latency_ns();
        assert!(
            (latency - 50_000).abs() <= SAMPLE_PERIOD_NS,
            "latency {latency} ns"
        );

        // every detected cycle pairs exactly once
        let video_markers = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::VideoMarker(_)))
            .count();
        assert_eq!(found.len(), video_markers);
        assert!(found.len() >= 17);
    }

    #[test]
    fn test_e2e_qpsk_wide_index() {
        let mut run = run_config(PixelFormat::I420);
        run.pattern.type_flags = TYPE_QPSK | TYPE_AUDIO_START_AT_SYNC;
        run.pattern.index_modulus = 1024;

        let found = pairings(&run_offline(&run));
        assert!(found.len() >= 17);
        for f in &found {
            // transition of cycle c at frame 9c + 6
            let cycle = (f.video_ts - 200_000_000) / 300_000_000;
            assert_eq!(f.index as u64, cycle % 1024);
            assert!(f.latency_ns().abs() <= SAMPLE_PERIOD_NS, "{f:?}");
        }
    }

    #[test]
    fn test_e2e_centred_tone_frame_leads_video() {
        let mut run = run_config(PixelFormat::Yuy2);
        run.pattern.type_flags = 0;
        run.pattern.audio_delay_ns = -2_000_000;

        let found = pairings(&run_offline(&run));
        assert!(!found.is_empty());
        for f in &found {
            assert!(
                (f.latency_ns() + 2_000_000).abs() <= 2 * SAMPLE_PERIOD_NS,
                "{f:?}"
            );
        }
    }

    #[test]
    fn test_e2e_sync_channel_selects_pairing_source() {
        let mut run = run_config(PixelFormat::Nv12);
        run.engine.sync_channel = 1;

        let events = run_offline(&run);
        let mut stats = MarkerStatistics::new(run.engine.sync_channel);
        for event in &events {
            stats.update(event);
        }

        // both channels decode, only channel 1 pairs
        let per_channel = stats.channel_markers.clone();
        assert_eq!(per_channel.get(&0), per_channel.get(&1));
        assert_eq!(stats.sync_found, stats.audio.received.min(stats.video.received));
        assert_eq!(stats.audio.missed, 0);
    }

    #[test]
    fn test_e2e_from_toml_config() {
        let content = r#"
[engine]
video_buffer_len = 6

[capture]
width = 160
height = 120
pixel_format = "uyvy"
fps_num = 25
sample_rate = 44100
channels = 1

[pattern]
frequency = 2000
cycles = 8
quantization_frames = 4
duration_s = 3.0
"#;
        let run = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let found = pairings(&run_offline(&run));
        assert!(found.len() >= 4, "{} pairings", found.len());
        for f in &found {
            assert!(f.latency_ns().abs() <= 2 * 22_676, "{f:?}");
        }
    }

    /// SyntheticCapture -> split session on two tasks -> Dispatcher -> file
    #[tokio::test]
    async fn test_e2e_pipeline_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut run = run_config(PixelFormat::Nv12);
        run.pattern.duration_s = 3.0;
        run.sinks = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 64,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "file".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 1024,
                params: HashMap::from([
                    ("path".to_string(), path.display().to_string()),
                    ("sync_only".to_string(), "true".to_string()),
                ]),
            },
        ];

        let capture = SyntheticCapture::new(&run.capture, &run.pattern).unwrap();
        let session = SyncSession::new(&run.engine, &run.capture_format()).unwrap();
        let (mut video, mut audio) = session.split();

        let (sink_tx, sink_rx) = mpsc::channel(256);
        let dispatcher = create_dispatcher(run.sinks.clone(), sink_rx).unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let streams = capture.start(BackpressureConfig::default(), None);

        let video_rx = streams.video.clone();
        let video_tx = sink_tx.clone();
        let video_task = tokio::spawn(async move {
            while let Ok(frame) = video_rx.recv().await {
                for event in video.process_frame(&frame) {
                    video_tx.send(event).await.unwrap();
                }
            }
        });

        let audio_rx = streams.audio.clone();
        let audio_tx = sink_tx;
        let audio_task = tokio::spawn(async move {
            while let Ok(block) = audio_rx.recv().await {
                for event in audio.process_block(&block) {
                    audio_tx.send(event).await.unwrap();
                }
            }
        });

        let timeout = std::time::Duration::from_secs(10);
        tokio::time::timeout(timeout, video_task).await.unwrap().unwrap();
        tokio::time::timeout(timeout, audio_task).await.unwrap().unwrap();
        let metrics = tokio::time::timeout(timeout, dispatcher_handle)
            .await
            .unwrap()
            .unwrap();

        let file_metrics = metrics
            .iter()
            .find(|(name, _)| name == "file")
            .map(|(_, m)| *m)
            .unwrap();
        assert_eq!(file_metrics.dropped_count, 0);
        assert!(file_metrics.sync_found >= 7);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len() as u64, file_metrics.sync_found);
        assert!(lines.iter().all(|l| l["kind"] == "sync_found"));
    }
}
