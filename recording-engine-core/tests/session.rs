use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use recording_engine_core::encoder::container::{TrackConfig, CODEC_PCM_S16LE};
use recording_engine_core::encoder::software::SoftwareJpegEncoder;
use recording_engine_core::storage::metadata::read_metadata;
use recording_engine_core::{
    BitrateMode, CaptureSourceDescriptor, ContainerLayout, ContainerReader, CropRect, EncoderProfile,
    EncoderResources, EncoderSettings, FramerateMode, HardwareEncoderBackend, HardwarePolicy, OutputSink, Pinned,
    Placement, Point, Rect, RecorderError, RecorderEvent, RecorderMode, RecorderOptions, RecordingResult,
    RecordingSession, SessionManager, SessionState, Size, SourceKind, VideoEncoder, VirtualAudio, VirtualDevices,
    VirtualScreen,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

fn devices() -> Arc<VirtualDevices> {
    Arc::new(
        VirtualDevices::new()
            .with_display(VirtualScreen::new("main", Size::new(160, 120)))
            .with_display(VirtualScreen::new("second", Size::new(96, 64)))
            .with_display(VirtualScreen::new("flaky", Size::new(96, 64)).fail_after(Duration::from_millis(300)))
            .with_camera(VirtualScreen::new("cam", Size::new(64, 48)))
            .with_camera(VirtualScreen::new("flaky-cam", Size::new(64, 48)).fail_after(Duration::from_millis(200)))
            .with_camera(VirtualScreen::new("silent-cam", Size::new(64, 48)).stalled())
            .with_microphone(VirtualAudio::new("mic"))
            .with_microphone(VirtualAudio::new("flaky-mic").fail_after(Duration::from_millis(300))),
    )
}

fn session_with(devices: Arc<VirtualDevices>, display: &str) -> RecordingSession {
    let session = RecordingSession::new(devices, Arc::new(EncoderResources::software_only()));
    session
        .add_source(CaptureSourceDescriptor::device(SourceKind::Display, display))
        .unwrap();
    session
}

fn options() -> RecorderOptions {
    RecorderOptions {
        frame_rate: 15,
        hardware: HardwarePolicy::Disabled,
        first_frame_timeout: Duration::from_secs(3),
        ..Default::default()
    }
}

/// Every event up to and including the terminal one.
fn wait_terminal(events: &Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = events.recv_timeout(remaining).expect("no terminal event before timeout");
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

fn completed(events: &[RecorderEvent]) -> RecordingResult {
    match events.last() {
        Some(RecorderEvent::RecordingComplete(result)) => (**result).clone(),
        other => panic!("expected RecordingComplete, got {:?}", other),
    }
}

fn record_for(session: &RecordingSession, sink: OutputSink, options: RecorderOptions, length: Duration) -> Vec<RecorderEvent> {
    let events = session.subscribe();
    session.record(sink, options).unwrap();
    thread::sleep(length);
    session.stop().unwrap();
    wait_terminal(&events)
}

fn statuses(events: &[RecorderEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            RecorderEvent::StatusChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn failure_reason(events: &[RecorderEvent]) -> String {
    match events.last() {
        Some(RecorderEvent::RecordingFailed(reason)) => reason.clone(),
        other => panic!("expected RecordingFailed, got {:?}", other),
    }
}

fn mean_video_sample_size(path: &Path) -> f64 {
    let reader = ContainerReader::open(path).unwrap();
    let track = reader.video_track().unwrap();
    assert!(!track.samples.is_empty());
    let total: u64 = track.samples.iter().map(|s| s.size as u64).sum();
    total as f64 / track.samples.len() as f64
}

/// A non-seekable sink that refuses writes past `limit` bytes.
struct FailingWriter {
    written: usize,
    limit: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written + buf.len() > self.limit {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn record_then_stop_completes_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.rec");
    let session = session_with(devices(), "main");
    let events = session.subscribe();

    let mut opts = options();
    opts.write_metadata = true;
    session.record(OutputSink::file(&path), opts).unwrap();
    assert_eq!(session.status(), SessionState::Recording);
    thread::sleep(Duration::from_millis(400));
    session.stop().unwrap();

    let seen = wait_terminal(&events);
    let result = completed(&seen);
    assert_eq!(
        statuses(&seen),
        vec![
            SessionState::Recording,
            SessionState::Finishing,
            SessionState::Idle
        ]
    );
    assert_eq!(session.status(), SessionState::Idle);

    assert_eq!(result.output_path.as_deref(), Some(path.as_path()));
    assert!(result.frames_encoded > 0);
    assert!(result.bytes_written > 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), result.bytes_written);
    assert_eq!(result.checksum.as_ref().map(String::len), Some(64));

    let metadata = read_metadata(&path).unwrap();
    assert_eq!(metadata.session_id, session.id());
    assert_eq!(metadata.canvas, Size::new(160, 120));

    let reader = ContainerReader::open(&path).unwrap();
    assert_eq!(reader.layout(), ContainerLayout::Progressive);
    assert_eq!(reader.video_track().unwrap().samples.len() as u64, result.frames_encoded);
    assert!(reader.audio_track().is_none());

    thread::sleep(Duration::from_millis(100));
    assert!(events.try_iter().all(|e| !e.is_terminal()));
}

#[test]
fn stopping_twice_yields_one_terminal_event() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "main");
    let events = session.subscribe();

    session.record(OutputSink::file(dir.path().join("a.rec")), options()).unwrap();
    thread::sleep(Duration::from_millis(150));
    session.stop().unwrap();
    session.stop().unwrap();

    let seen = wait_terminal(&events);
    completed(&seen);
    session.stop().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(events.try_iter().all(|e| !e.is_terminal()));
}

#[test]
fn control_calls_in_the_wrong_state_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "main");
    let events = session.subscribe();

    assert!(matches!(session.pause(), Err(RecorderError::InvalidState(_))));
    assert!(matches!(session.resume(), Err(RecorderError::InvalidState(_))));

    session.record(OutputSink::file(dir.path().join("a.rec")), options()).unwrap();
    let again = session.record(OutputSink::file(dir.path().join("b.rec")), options());
    assert!(matches!(again, Err(RecorderError::InvalidState(_))));
    assert!(matches!(
        session.add_source(CaptureSourceDescriptor::device(SourceKind::Camera, "cam")),
        Err(RecorderError::InvalidState(_))
    ));

    session.stop().unwrap();
    // finishing or already idle: either way not pausable
    assert!(matches!(session.pause(), Err(RecorderError::InvalidState(_))));
    assert!(matches!(session.resume(), Err(RecorderError::InvalidState(_))));

    completed(&wait_terminal(&events));
    assert!(!dir.path().join("b.rec").exists());
}

#[test]
fn higher_quality_produces_larger_output() {
    let dir = tempfile::tempdir().unwrap();
    let devices = devices();
    let mut sizes = Vec::new();
    for quality in [0u8, 100] {
        let path = dir.path().join(format!("q{}.rec", quality));
        let session = session_with(Arc::clone(&devices), "main");
        let opts = RecorderOptions {
            bitrate: BitrateMode::Quality(quality),
            ..options()
        };
        completed(&record_for(&session, OutputSink::file(&path), opts, Duration::from_millis(300)));
        sizes.push(mean_video_sample_size(&path));
    }
    assert!(sizes[1] > 2.0 * sizes[0], "q0 {} bytes/frame, q100 {} bytes/frame", sizes[0], sizes[1]);
}

#[test]
fn crop_sets_the_output_canvas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crop.rec");
    let session = session_with(devices(), "main");
    let opts = RecorderOptions {
        frame_rate: 5,
        canvas_size: Some(Size::new(640, 520)),
        crop: Some(CropRect::new(100, 100, 500, 500)),
        ..options()
    };

    let result = completed(&record_for(&session, OutputSink::file(&path), opts, Duration::from_millis(250)));
    assert_eq!(result.metadata.canvas, Size::new(400, 400));

    let mut reader = ContainerReader::open(&path).unwrap();
    let track = reader.video_track().unwrap().clone();
    match track.header.config {
        TrackConfig::Video { width, height, .. } => assert_eq!((width, height), (400, 400)),
        other => panic!("unexpected track config {:?}", other),
    }
    let data = reader.read_sample(&track.samples[0]).unwrap();
    let frame = image::load_from_memory(&data).unwrap();
    assert_eq!((frame.width(), frame.height()), (400, 400));
}

#[test]
fn crop_outside_the_canvas_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "main");
    let events = session.subscribe();
    let opts = RecorderOptions {
        crop: Some(CropRect::new(0, 0, 400, 400)),
        ..options()
    };
    let result = session.record(OutputSink::file(dir.path().join("x.rec")), opts);
    assert!(matches!(result, Err(RecorderError::Configuration(_))));
    assert_eq!(session.status(), SessionState::Idle);
    assert!(events.try_recv().is_err());
}

#[test]
fn fragmented_output_streams_to_a_non_seekable_sink() {
    let buffer = SharedBuffer::default();
    let session = session_with(devices(), "main");
    let opts = RecorderOptions {
        fragmented: true,
        fragment_duration: Duration::from_millis(100),
        ..options()
    };

    let result = completed(&record_for(&session, OutputSink::stream(buffer.clone()), opts, Duration::from_millis(400)));
    assert!(result.output_path.is_none());
    assert!(result.checksum.is_none());

    let bytes = buffer.0.lock().clone();
    assert_eq!(bytes.len() as u64, result.bytes_written);
    let reader = ContainerReader::from_reader(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.layout(), ContainerLayout::Fragmented);
    assert_eq!(reader.video_track().unwrap().samples.len() as u64, result.frames_encoded);
}

#[test]
fn non_seekable_sink_needs_a_streamable_layout() {
    let session = session_with(devices(), "main");
    let result = session.record(OutputSink::stream(SharedBuffer::default()), options());
    assert!(matches!(result, Err(RecorderError::Configuration(_))));

    let seekable = session.record(OutputSink::seekable_stream(Cursor::new(Vec::new())), options());
    assert!(seekable.is_ok());
    session.stop().unwrap();
}

#[test]
fn fast_start_puts_metadata_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fast.rec");
    let session = session_with(devices(), "main");
    let opts = RecorderOptions {
        fast_start: true,
        ..options()
    };
    completed(&record_for(&session, OutputSink::file(&path), opts, Duration::from_millis(250)));

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");
    let ftyp_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(&bytes[ftyp_len + 4..ftyp_len + 8], b"moov");

    let reader = ContainerReader::open(&path).unwrap();
    assert_eq!(reader.layout(), ContainerLayout::FastStart);
    assert!(!reader.video_track().unwrap().samples.is_empty());
}

#[test]
fn snapshot_count_follows_duration_and_interval() {
    let dir = tempfile::tempdir().unwrap();
    let stills = dir.path().join("stills");
    let session = session_with(devices(), "main");
    let events = session.subscribe();
    let interval = Duration::from_millis(200);
    let mut opts = options();
    opts.snapshot.enabled = true;
    opts.snapshot.interval = interval;
    opts.snapshot.directory = Some(stills.clone());

    session.record(OutputSink::file(dir.path().join("video.rec")), opts).unwrap();
    thread::sleep(Duration::from_millis(700));
    session.stop().unwrap();
    let seen = wait_terminal(&events);
    let result = completed(&seen);

    let duration_nanos = (result.duration_secs * 1e9).round() as u128;
    let expected = duration_nanos / interval.as_nanos() + 1;
    assert_eq!(result.snapshots.len() as u128, expected);

    let announced: Vec<PathBuf> = seen
        .iter()
        .filter_map(|e| match e {
            RecorderEvent::SnapshotSaved(path) => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(announced, result.snapshots);

    let mut listed: Vec<PathBuf> = fs::read_dir(&stills).unwrap().map(|e| e.unwrap().path()).collect();
    listed.sort();
    assert_eq!(listed, result.snapshots);
}

#[test]
fn slideshow_writes_numbered_stills_only() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let interval = Duration::from_millis(150);
    let mut opts = options();
    opts.mode = RecorderMode::Slideshow;
    opts.snapshot.interval = interval;

    let result = completed(&record_for(&session, OutputSink::directory(dir.path()), opts, Duration::from_millis(500)));

    let duration_nanos = (result.duration_secs * 1e9).round() as u128;
    assert_eq!(result.snapshots.len() as u128, duration_nanos / interval.as_nanos() + 1);
    assert_eq!(result.output_path.as_deref(), Some(dir.path()));
    let entries: Vec<PathBuf> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(entries.len(), result.snapshots.len());
    assert!(entries.iter().all(|p| p.extension().is_some_and(|ext| ext == "png")));
}

#[test]
fn snapshot_mode_completes_after_one_still() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let events = session.subscribe();
    let opts = RecorderOptions {
        mode: RecorderMode::Snapshot,
        ..options()
    };

    session.record(OutputSink::directory(dir.path()), opts).unwrap();
    let result = completed(&wait_terminal(&events));

    assert_eq!(result.snapshots.len(), 1);
    let still = image::open(&result.snapshots[0]).unwrap();
    assert_eq!((still.width(), still.height()), (96, 64));
    assert_eq!(session.status(), SessionState::Idle);
}

#[test]
fn concurrent_sessions_are_isolated() {
    let devices = devices();
    let dir = tempfile::tempdir().unwrap();
    let healthy = session_with(Arc::clone(&devices), "main");
    let faulty = session_with(Arc::clone(&devices), "flaky");
    let healthy_events = healthy.subscribe();
    let faulty_events = faulty.subscribe();

    healthy.record(OutputSink::file(dir.path().join("ok.rec")), options()).unwrap();
    faulty.record(OutputSink::file(dir.path().join("bad.rec")), options()).unwrap();

    let failed = wait_terminal(&faulty_events);
    assert!(matches!(failed.last(), Some(RecorderEvent::RecordingFailed(_))));
    assert!(!failed.iter().any(|e| matches!(e, RecorderEvent::RecordingComplete(_))));
    assert_eq!(faulty.status(), SessionState::Idle);

    assert_eq!(healthy.status(), SessionState::Recording);
    thread::sleep(Duration::from_millis(200));
    healthy.stop().unwrap();
    let result = completed(&wait_terminal(&healthy_events));
    assert!(result.bytes_written > 0);
}

#[test]
fn failing_optional_overlay_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "main");
    session
        .add_source(CaptureSourceDescriptor::device(SourceKind::Camera, "flaky-cam").optional())
        .unwrap();
    session
        .add_source(CaptureSourceDescriptor::device(SourceKind::Camera, "does-not-exist").optional())
        .unwrap();

    let seen = record_for(&session, OutputSink::file(dir.path().join("o.rec")), options(), Duration::from_millis(600));
    let result = completed(&seen);
    assert!(result.frames_encoded > 0);
}

#[test]
fn failing_required_camera_fails_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "main");
    session
        .add_source(CaptureSourceDescriptor::device(SourceKind::Camera, "flaky-cam"))
        .unwrap();
    let events = session.subscribe();

    session.record(OutputSink::file(dir.path().join("r.rec")), options()).unwrap();
    let seen = wait_terminal(&events);
    match seen.last() {
        Some(RecorderEvent::RecordingFailed(reason)) => assert!(reason.contains("source unavailable")),
        other => panic!("expected failure, got {:?}", other),
    }
    // the partial output stays on disk
    assert!(dir.path().join("r.rec").exists());
}

#[test]
fn fifty_record_stop_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let events = session.subscribe();
    let opts = RecorderOptions {
        frame_rate: 30,
        ..options()
    };

    for cycle in 0..50 {
        let path = dir.path().join(format!("cycle-{:02}.rec", cycle));
        session.record(OutputSink::file(&path), opts.clone()).unwrap();
        session.stop().unwrap();
        let result = completed(&wait_terminal(&events));
        assert!(result.frames_encoded >= 1, "cycle {} encoded nothing", cycle);
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}

#[test]
fn microphone_audio_is_muxed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio.rec");
    let session = session_with(devices(), "second");
    let mut opts = options();
    opts.audio.capture_microphone = true;

    let result = completed(&record_for(&session, OutputSink::file(&path), opts, Duration::from_millis(500)));
    assert!(result.audio_frames > 0);
    assert_abs_diff_eq!(result.audio_frames as f64, result.duration_secs * 48000.0, epsilon = 2.0);

    let reader = ContainerReader::open(&path).unwrap();
    let audio = reader.audio_track().unwrap();
    assert_eq!(audio.header.codec, CODEC_PCM_S16LE);
    let bytes: u64 = audio.samples.iter().map(|s| s.size as u64).sum();
    assert_eq!(bytes, result.audio_frames * 2 * 2);
}

#[test]
fn paused_time_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let events = session.subscribe();
    let opts = RecorderOptions {
        framerate_mode: FramerateMode::Variable,
        ..options()
    };

    let wall = Instant::now();
    session.record(OutputSink::file(dir.path().join("p.rec")), opts).unwrap();
    thread::sleep(Duration::from_millis(200));
    session.pause().unwrap();
    assert_eq!(session.status(), SessionState::Paused);
    thread::sleep(Duration::from_millis(500));
    session.resume().unwrap();
    thread::sleep(Duration::from_millis(200));
    session.stop().unwrap();
    let wall = wall.elapsed().as_secs_f64();

    let seen = wait_terminal(&events);
    let result = completed(&seen);
    assert!(result.duration_secs < wall - 0.4, "duration {} wall {}", result.duration_secs, wall);
    assert_eq!(
        statuses(&seen),
        vec![
            SessionState::Recording,
            SessionState::Paused,
            SessionState::Recording,
            SessionState::Finishing,
            SessionState::Idle
        ]
    );
}

#[test]
fn recordings_play_back_as_video_file_sources() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.rec");
    let devices = devices();
    let first = session_with(Arc::clone(&devices), "second");
    completed(&record_for(&first, OutputSink::file(&clip), options(), Duration::from_millis(300)));

    let replay = RecordingSession::new(devices, Arc::new(EncoderResources::software_only()));
    replay
        .add_source(CaptureSourceDescriptor::file(SourceKind::VideoFile, &clip))
        .unwrap();
    let out = dir.path().join("replay.rec");
    let result = completed(&record_for(&replay, OutputSink::file(&out), options(), Duration::from_millis(300)));
    assert_eq!(result.metadata.canvas, Size::new(96, 64));
    assert!(result.frames_encoded > 0);
}

#[test]
fn static_image_overlay_is_drawn_above_the_display() {
    let dir = tempfile::tempdir().unwrap();
    let logo = dir.path().join("logo.png");
    image::RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255])).save(&logo).unwrap();

    let session = session_with(devices(), "second");
    let placement = Placement {
        position: Pinned::custom(Point::new(4, 4)),
        output_size: Pinned::custom(Size::new(16, 16)),
        source_rect: Pinned::auto(Rect::default()),
    };
    session
        .add_source(CaptureSourceDescriptor::file(SourceKind::StaticImage, &logo).with_placement(placement))
        .unwrap();
    let events = session.subscribe();
    let stills = dir.path().join("stills");
    let opts = RecorderOptions {
        mode: RecorderMode::Snapshot,
        ..options()
    };

    session.record(OutputSink::directory(&stills), opts).unwrap();
    let result = completed(&wait_terminal(&events));

    let still = image::open(&result.snapshots[0]).unwrap().to_rgba8();
    assert_eq!(still.dimensions(), (96, 64));
    assert_eq!(still.get_pixel(10, 10).0, [255, 0, 0, 255]);
    assert_ne!(still.get_pixel(40, 40).0, [255, 0, 0, 255]);
}

struct FakeHardware;

impl HardwareEncoderBackend for FakeHardware {
    fn name(&self) -> &str {
        "fake-hw"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports_profile(&self, profile: EncoderProfile) -> bool {
        profile != EncoderProfile::High
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>, RecorderError> {
        Ok(Box::new(SoftwareJpegEncoder::new(settings)))
    }
}

#[test]
fn hardware_slots_are_leased_per_session() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::with_resources(devices(), EncoderResources::with_hardware(Arc::new(FakeHardware), 1));
    let opts = RecorderOptions {
        hardware: HardwarePolicy::Required,
        ..options()
    };

    let first = manager.create_session();
    first
        .add_source(CaptureSourceDescriptor::device(SourceKind::Display, "main"))
        .unwrap();
    let second = manager.create_session();
    second
        .add_source(CaptureSourceDescriptor::device(SourceKind::Display, "second"))
        .unwrap();
    let events = first.subscribe();
    let second_events = second.subscribe();

    first.record(OutputSink::file(dir.path().join("hw1.rec")), opts.clone()).unwrap();
    assert_eq!(manager.resources().hardware_in_use(), 1);

    let busy = second.record(OutputSink::file(dir.path().join("hw2.rec")), opts.clone());
    assert!(matches!(busy, Err(RecorderError::Encoder(_))));
    assert_eq!(second.status(), SessionState::Idle);

    let high = RecorderOptions {
        profile: EncoderProfile::High,
        hardware: HardwarePolicy::Preferred,
        ..options()
    };
    second.record(OutputSink::file(dir.path().join("sw.rec")), high).unwrap();
    assert_eq!(manager.resources().hardware_in_use(), 1);
    second.stop().unwrap();
    completed(&wait_terminal(&second_events));

    thread::sleep(Duration::from_millis(200));
    first.stop().unwrap();
    let result = completed(&wait_terminal(&events));
    assert_eq!(result.metadata.encoder, "software-jpeg");
    assert_eq!(manager.resources().hardware_in_use(), 0);
}

#[test]
fn manager_tracks_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(devices());
    let a = manager.create_session();
    a.add_source(CaptureSourceDescriptor::device(SourceKind::Display, "main"))
        .unwrap();
    let b = manager.create_session();
    b.add_source(CaptureSourceDescriptor::device(SourceKind::Display, "second"))
        .unwrap();
    let a_events = a.subscribe();
    let b_events = b.subscribe();

    a.record(OutputSink::file(dir.path().join("a.rec")), options()).unwrap();
    b.record(OutputSink::file(dir.path().join("b.rec")), options()).unwrap();
    assert!(matches!(manager.remove(a.id()), Err(RecorderError::InvalidState(_))));
    assert!(manager
        .list()
        .iter()
        .all(|(_, state)| *state == SessionState::Recording));

    thread::sleep(Duration::from_millis(150));
    manager.stop_all();
    completed(&wait_terminal(&a_events));
    completed(&wait_terminal(&b_events));

    assert!(manager.remove(a.id()).is_ok());
    assert_eq!(manager.len(), 1);
}

#[test]
fn silent_optional_camera_does_not_hold_back_the_display() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silent.rec");
    let session = session_with(devices(), "main");
    session
        .add_source(CaptureSourceDescriptor::device(SourceKind::Camera, "silent-cam").optional())
        .unwrap();

    // well inside the first-frame timeout, so the camera is never dropped
    let result = completed(&record_for(&session, OutputSink::file(&path), options(), Duration::from_millis(1000)));
    assert!(result.frames_encoded > 1);

    let mut reader = ContainerReader::open(&path).unwrap();
    let samples = reader.video_track().unwrap().samples.clone();
    let distinct: HashSet<Vec<u8>> = samples.iter().map(|s| reader.read_sample(s).unwrap()).collect();
    assert!(distinct.len() > 1, "only {} distinct frames", distinct.len());
}

#[test]
fn losing_the_microphone_fails_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let events = session.subscribe();
    let mut opts = options();
    opts.audio.capture_microphone = true;
    opts.audio.microphone_device_id = Some("flaky-mic".into());

    session.record(OutputSink::file(dir.path().join("m.rec")), opts).unwrap();
    let seen = wait_terminal(&events);
    assert!(failure_reason(&seen).contains("source unavailable"));
    assert_eq!(session.status(), SessionState::Idle);
}

#[test]
fn losing_the_microphone_while_paused_fails_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with(devices(), "second");
    let events = session.subscribe();
    let mut opts = options();
    opts.audio.capture_microphone = true;
    opts.audio.microphone_device_id = Some("flaky-mic".into());

    session.record(OutputSink::file(dir.path().join("mp.rec")), opts).unwrap();
    session.pause().unwrap();
    let seen = wait_terminal(&events);
    assert!(failure_reason(&seen).contains("source unavailable"));
}

#[test]
fn sink_failure_mid_run_is_reported() {
    let session = session_with(devices(), "main");
    let events = session.subscribe();
    let opts = RecorderOptions {
        fragmented: true,
        fragment_duration: Duration::from_millis(100),
        ..options()
    };
    let sink = OutputSink::stream(FailingWriter {
        written: 0,
        limit: 20_000,
    });

    session.record(sink, opts).unwrap();
    let seen = wait_terminal(&events);
    assert!(failure_reason(&seen).contains("sink write error"));
    assert_eq!(
        statuses(&seen),
        vec![
            SessionState::Recording,
            SessionState::Finishing,
            SessionState::Idle
        ]
    );
    assert_eq!(session.status(), SessionState::Idle);
}

#[test]
fn constant_bitrate_recording_completes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cbr.rec");
    let session = session_with(devices(), "main");
    let bitrate = BitrateMode::Constant {
        bits_per_second: 400_000,
    };
    let opts = RecorderOptions {
        bitrate,
        ..options()
    };

    let result = completed(&record_for(&session, OutputSink::file(&path), opts, Duration::from_millis(600)));
    assert!(result.frames_encoded > 0);

    let reader = ContainerReader::open(&path).unwrap();
    match &reader.video_track().unwrap().header.config {
        TrackConfig::Video { bitrate: stored, .. } => assert_eq!(*stored, bitrate),
        other => panic!("expected a video track, got {:?}", other),
    }
}
