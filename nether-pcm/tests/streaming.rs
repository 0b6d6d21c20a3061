//! End-to-end streaming against the headless device

use std::time::{Duration, Instant};

use anyhow::Result;
use nether_pcm::{
    AudioSession, ModeKind, NullBackend, PcmBuffer, ProducerAdapter, SampleFormat, SessionConfig,
    SineTone, StreamMode, StreamParams,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_config() -> SessionConfig {
    SessionConfig {
        sample_rate: 48_000,
        num_channels: 2,
        buffer_frames: 256,
        packet_frames: 64,
        num_packets: 16,
        sample_format: SampleFormat::I16,
    }
}

/// Simulated main loop: pump once per tick for `duration`
fn run_ticks<P: nether_pcm::Producer>(
    session: &mut AudioSession,
    producer: &mut ProducerAdapter<P>,
    duration: Duration,
) -> usize {
    let deadline = Instant::now() + duration;
    let mut pushed = 0;
    while Instant::now() < deadline {
        pushed += session.pump(producer);
        std::thread::sleep(Duration::from_millis(2));
    }
    pushed
}

#[test]
fn test_fifo_session_streams_tone() -> Result<()> {
    init_tracing();

    let mut session = AudioSession::setup(&small_config(), StreamMode::Fifo, NullBackend::new())?;
    assert_eq!(session.mode(), ModeKind::Fifo);
    assert_eq!(session.bytes_per_frame(), 4);

    let mut tone = ProducerAdapter::new(SineTone::new(440.0, session.sample_rate()));
    let pushed = run_ticks(&mut session, &mut tone, Duration::from_millis(200));

    // counters are final once the fill thread is joined
    session.close();
    let metrics = session.metrics();
    assert!(pushed > 0);
    assert_eq!(metrics.frames_pushed, pushed as u64);
    assert!(metrics.buffers_written > 0);
    assert_eq!(metrics.frames_written, metrics.buffers_written * 256);
    assert_eq!(metrics.device_errors, 0);
    Ok(())
}

#[test]
fn test_fifo_capacity_holds_at_every_tick() -> Result<()> {
    init_tracing();

    let session_config = small_config();
    let mut session = AudioSession::setup(&session_config, StreamMode::Fifo, NullBackend::new())?;
    let mut producer = ProducerAdapter::new(PcmBuffer::new(vec![1000i16; 4096]).looping(true));

    for _ in 0..50 {
        session.pump(&mut producer);
        let occupancy = session.fifo().map(|fifo| fifo.occupancy()).unwrap_or_default();
        assert_eq!(occupancy.total(), session_config.num_packets);
        // whole frames are pushed, and packets are whole frames
        assert!(!occupancy.in_flight);
        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}

#[test]
fn test_queue_session_is_paced_by_device() -> Result<()> {
    init_tracing();

    let mut session = AudioSession::setup(&small_config(), StreamMode::Queue, NullBackend::new())?;
    assert_eq!(session.expect(), 256);

    let mut tone = ProducerAdapter::new(SineTone::new(220.0, session.sample_rate()));
    assert_eq!(session.pump(&mut tone), 256);

    // the device queue is full until the virtual clock drains it
    assert!(session.expect() < 256);

    let pushed = run_ticks(&mut session, &mut tone, Duration::from_millis(100));
    // roughly real time: 100ms at 48kHz is 4800 frames, plus one buffer of slack
    assert!(pushed <= 4800 + 2 * 256);

    session.shutdown();
    Ok(())
}

#[test]
fn test_callback_session() -> Result<()> {
    init_tracing();

    let mode = StreamMode::callback(|buffer: &mut [u8], params: &StreamParams| {
        assert_eq!(buffer.len(), params.buffer_bytes());
        buffer.fill(0);
    });
    let mut session = AudioSession::setup(&small_config(), mode, NullBackend::new())?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.metrics().buffers_written < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(session.metrics().buffers_written >= 3);
    assert!(session.is_valid());

    session.close();
    assert!(!session.is_valid());
    Ok(())
}

#[test]
fn test_session_from_toml() -> Result<()> {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("audio.toml");
    std::fs::write(
        &path,
        r#"
        sample_rate = 22050
        num_channels = 2
        sample_format = "f32"
        "#,
    )?;

    let config = SessionConfig::load(&path)?;
    let session = AudioSession::setup(&config, StreamMode::Queue, NullBackend::unpaced())?;
    assert_eq!(session.sample_rate(), 22_050);
    assert_eq!(session.num_channels(), 2);
    assert_eq!(session.buffer_frames(), 2048);
    assert_eq!(session.bytes_per_frame(), 8);
    Ok(())
}

#[test]
fn test_sessions_can_be_rebuilt() -> Result<()> {
    init_tracing();

    for _ in 0..3 {
        let mut session =
            AudioSession::setup(&small_config(), StreamMode::Fifo, NullBackend::new())?;
        assert_eq!(session.push_samples(&[0.5f32; 128]), 64);
        session.shutdown();
    }
    Ok(())
}
