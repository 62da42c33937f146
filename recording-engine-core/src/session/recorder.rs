use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::encoder::container::{ContainerWriter, MovieHeader, TrackConfig, TrackHeader, CODEC_PCM_S16LE};
use crate::encoder::pipeline::{EncodeSummary, EncoderStage};
use crate::encoder::resources::{EncoderResources, HardwareLease};
use crate::models::audio_models::{AudioLevels, PipelineDiagnostics};
use crate::models::config::{ContainerLayout, RecorderMode, RecorderOptions};
use crate::models::device::DeviceInfo;
use crate::models::error::RecorderError;
use crate::models::event::RecorderEvent;
use crate::models::frame::AudioSourceClass;
use crate::models::geometry::Size;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, TrackInfo};
use crate::models::source::{CaptureSourceDescriptor, Placement, SourceId};
use crate::models::state::SessionState;
use crate::processing::audio_mixer::{AudioMixer, MixerStage};
use crate::processing::compositor::Compositor;
use crate::session::events::EventHub;
use crate::session::run::{FinishReason, RunShared};
use crate::session::snapshot::SnapshotScheduler;
use crate::session::workers::{run_mixer, run_progress, CompositorStage};
use crate::sources::audio::AudioCapture;
use crate::sources::open_source;
use crate::sources::registry::{default_canvas, SourceRegistry};
use crate::storage::metadata::write_metadata;
use crate::storage::sink::{sha256_file, OutputSink, SinkIo};
use crate::storage::still::StillWriter;
use crate::traits::capture_provider::AudioFault;
use crate::traits::capture_source::CaptureSource;
use crate::traits::device_provider::DeviceProvider;
use crate::traits::video_encoder::EncoderSettings;

const VIDEO_TRACK: u32 = 1;
const AUDIO_TRACK: u32 = 2;

/// One recording session: a source registry plus the state machine that
/// runs it.
///
/// Control calls take `&self` and are serialized per session. `stop()`
/// only requests teardown; the run winds down on its supervisor thread and
/// reports through the event channel:
///
/// ```text
/// record() ─► [sources] ─► compositor ─► video slot ─► encoder ─► sink
///                │              └─► latest frame ─► snapshot scheduler
///                └─► [audio] ─► mixer ─► audio slot ─┘
/// ```
///
/// Every `record()` that returns `Ok` ends with `StatusChanged(Idle)`
/// followed by exactly one `RecordingComplete` or `RecordingFailed`.
#[derive(Clone)]
pub struct RecordingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    devices: Arc<dyn DeviceProvider>,
    resources: Arc<EncoderResources>,
    registry: Mutex<SourceRegistry>,
    control: Mutex<Control>,
    events: EventHub,
}

struct Control {
    state: SessionState,
    run: Option<Arc<RunShared>>,
    supervisor: Option<thread::JoinHandle<()>>,
}

/// Everything `record()` opened, handed to the supervisor thread.
struct RunPlan {
    sources: Vec<Box<dyn CaptureSource>>,
    compositor: Compositor,
    captures: Vec<AudioCapture>,
    mixer: Option<MixerStage>,
    encoder: Option<EncoderStage>,
    scheduler: Option<SnapshotScheduler>,
    lease: Option<HardwareLease>,
    report: ReportBase,
}

/// The parts of the final result known at start-up.
struct ReportBase {
    output_path: Option<PathBuf>,
    file_sink: bool,
    metadata: RecordingMetadata,
}

/// What the pipeline left behind once every stage has been joined.
struct Teardown {
    duration: Duration,
    encoded: Option<EncodeSummary>,
    snapshots: Vec<PathBuf>,
}

impl RecordingSession {
    pub fn new(devices: Arc<dyn DeviceProvider>, resources: Arc<EncoderResources>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        log::debug!("created session {}", id);
        Self {
            inner: Arc::new(SessionInner {
                id,
                devices,
                resources,
                registry: Mutex::new(SourceRegistry::new()),
                control: Mutex::new(Control {
                    state: SessionState::Idle,
                    run: None,
                    supervisor: None,
                }),
                events: EventHub::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn status(&self) -> SessionState {
        self.inner.control.lock().state
    }

    /// A new receiver for this session's events.
    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.inner.devices.devices()
    }

    /// Snapshot of the current source registry.
    pub fn sources(&self) -> SourceRegistry {
        self.inner.registry.lock().clone()
    }

    /// Edit the source registry. Only allowed while idle.
    pub fn configure_sources<T>(&self, edit: impl FnOnce(&mut SourceRegistry) -> T) -> Result<T, RecorderError> {
        let control = self.inner.control.lock();
        if !control.state.is_idle() {
            return Err(RecorderError::InvalidState(format!(
                "sources can only be changed while idle, session is {}",
                control.state
            )));
        }
        let mut registry = self.inner.registry.lock();
        Ok(edit(&mut registry))
    }

    pub fn add_source(&self, descriptor: CaptureSourceDescriptor) -> Result<SourceId, RecorderError> {
        self.configure_sources(|registry| registry.add(descriptor))
    }

    pub fn set_placement(&self, id: SourceId, placement: Placement) -> Result<(), RecorderError> {
        self.configure_sources(|registry| registry.set_placement(id, placement))?
    }

    /// Counters of the running pipeline, `None` while idle.
    pub fn diagnostics(&self) -> Option<PipelineDiagnostics> {
        let control = self.inner.control.lock();
        control.run.as_ref().map(|run| run.diagnostics.lock().clone())
    }

    pub fn levels(&self) -> AudioLevels {
        let control = self.inner.control.lock();
        control.run.as_ref().map(|run| *run.levels.lock()).unwrap_or_default()
    }

    /// Start a run writing into `sink`.
    ///
    /// Configuration problems and start-up failures (devices, sink, encoder)
    /// are returned here and leave the session idle without any event.
    pub fn record(&self, sink: OutputSink, options: RecorderOptions) -> Result<(), RecorderError> {
        let mut control = self.inner.control.lock();
        if !control.state.is_idle() {
            return Err(RecorderError::InvalidState(format!(
                "cannot record while {}",
                control.state
            )));
        }
        if let Some(previous) = control.supervisor.take() {
            // already past its terminal event
            if previous.join().is_err() {
                log::error!("[{}] previous session supervisor panicked", self.inner.id);
            }
        }

        options.validate().map_err(RecorderError::Configuration)?;
        check_sink(&sink, &options)?;
        let descriptors = self.inner.registry.lock().enabled();
        if descriptors.is_empty() {
            return Err(RecorderError::Configuration("no enabled capture sources".into()));
        }

        log::info!(
            "[{}] starting {:?} recording to {} ({} sources, {} fps)",
            self.inner.id,
            options.mode,
            sink.kind(),
            descriptors.len(),
            options.frame_rate
        );

        let (finish_tx, finish_rx) = unbounded();
        let shared = Arc::new(RunShared::new(
            self.inner.id.clone(),
            options,
            self.inner.events.clone(),
            finish_tx,
        ));
        let plan = self.prepare(sink, &shared, &descriptors)?;

        let (ready_tx, ready_rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let run = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("session-{}", short_id(&self.inner.id)))
            .spawn(move || supervise(inner, run, plan, finish_rx, ready_tx))
            .map_err(|e| RecorderError::Encoder(format!("failed to spawn session thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(RecorderError::Encoder("session thread exited during start-up".into()));
            }
        }

        shared.clock.start();
        shared.gate.open();
        control.state = SessionState::Recording;
        control.run = Some(shared);
        control.supervisor = Some(handle);
        self.inner.events.emit(RecorderEvent::StatusChanged(SessionState::Recording));
        log::info!("[{}] recording", self.inner.id);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), RecorderError> {
        let mut control = self.inner.control.lock();
        match control.state {
            SessionState::Recording => {}
            SessionState::Paused => return Ok(()),
            state => return Err(RecorderError::InvalidState(format!("cannot pause while {}", state))),
        }
        if let Some(run) = &control.run {
            run.gate.close();
            run.clock.pause();
        }
        control.state = SessionState::Paused;
        self.inner.events.emit(RecorderEvent::StatusChanged(SessionState::Paused));
        log::info!("[{}] paused", self.inner.id);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), RecorderError> {
        let mut control = self.inner.control.lock();
        match control.state {
            SessionState::Paused => {}
            SessionState::Recording => return Ok(()),
            state => return Err(RecorderError::InvalidState(format!("cannot resume while {}", state))),
        }
        if let Some(run) = &control.run {
            run.clock.resume();
            run.gate.open();
        }
        control.state = SessionState::Recording;
        self.inner.events.emit(RecorderEvent::StatusChanged(SessionState::Recording));
        log::info!("[{}] resumed", self.inner.id);
        Ok(())
    }

    /// Request teardown. Returns at once; a no-op when idle or already finishing.
    pub fn stop(&self) -> Result<(), RecorderError> {
        let mut control = self.inner.control.lock();
        if !control.state.is_active() {
            return Ok(());
        }
        control.state = SessionState::Finishing;
        self.inner.events.emit(RecorderEvent::StatusChanged(SessionState::Finishing));
        if let Some(run) = &control.run {
            run.request_finish(FinishReason::Stop);
        }
        log::info!("[{}] stop requested", self.inner.id);
        Ok(())
    }

    fn prepare(
        &self,
        sink: OutputSink,
        shared: &RunShared,
        descriptors: &[CaptureSourceDescriptor],
    ) -> Result<RunPlan, RecorderError> {
        let options = &shared.options;
        let sources = self.start_sources(descriptors, options.frame_rate)?;

        let natives: HashMap<SourceId, Size> = sources
            .iter()
            .filter_map(|s| s.native_size().map(|size| (s.descriptor().id, size)))
            .collect();
        let canvas = options
            .canvas_size
            .unwrap_or_else(|| default_canvas(descriptors, &natives));
        let layout: Vec<CaptureSourceDescriptor> = {
            let mut registry = self.inner.registry.lock();
            registry.relayout(canvas, &natives);
            registry
                .enabled()
                .into_iter()
                .filter(|d| sources.iter().any(|s| s.descriptor().id == d.id))
                .collect()
        };
        let compositor = Compositor::new(canvas, options.crop, &layout)?;
        let output_size = compositor.output_size();
        log::debug!(
            "[{}] canvas {}x{}, output {}x{}",
            self.inner.id,
            canvas.width,
            canvas.height,
            output_size.width,
            output_size.height
        );

        let started = Local::now();
        let mut metadata = RecordingMetadata::new(&self.inner.id, options.mode, output_size, options.frame_rate);

        if options.mode != RecorderMode::Video {
            let OutputSink::Directory(directory) = sink else {
                return Err(RecorderError::Configuration("still modes need a directory sink".into()));
            };
            let writer = StillWriter::new(&directory, options.snapshot.format, started)?;
            let scheduler = match options.mode {
                RecorderMode::Snapshot => SnapshotScheduler::one_shot(writer),
                _ => SnapshotScheduler::periodic(writer, options.snapshot.interval),
            };
            metadata.encoder = options.snapshot.format.extension().to_string();
            return Ok(RunPlan {
                sources,
                compositor,
                captures: Vec::new(),
                mixer: None,
                encoder: None,
                scheduler: Some(scheduler),
                lease: None,
                report: ReportBase {
                    output_path: Some(directory),
                    file_sink: false,
                    metadata,
                },
            });
        }

        let mixer = AudioMixer::new(options.audio.sample_rate as f64, options.audio.channels);
        let captures = self.start_audio(options, &mixer, shared)?;
        let mixer = (!captures.is_empty()).then(|| {
            let channels = captures
                .iter()
                .map(|c| {
                    let gain = match c.class() {
                        AudioSourceClass::Microphone => options.audio.microphone_gain,
                        _ => options.audio.system_gain,
                    };
                    c.mixer_channel(gain)
                })
                .collect();
            MixerStage::new(mixer, channels)
        });

        let output_path = sink.path().map(Path::to_path_buf);
        let file_sink = matches!(sink, OutputSink::File(_));
        let io = SinkIo::open(sink)?;
        let settings = EncoderSettings {
            size: output_size,
            frame_rate: options.frame_rate,
            bitrate: options.bitrate,
            profile: options.profile,
            low_latency: options.low_latency,
        };
        let opened = self.inner.resources.open(options.hardware, &settings)?;
        log::info!("[{}] encoding with {}", self.inner.id, opened.encoder.name());

        let mut tracks = vec![TrackHeader {
            id: VIDEO_TRACK,
            codec: opened.encoder.codec(),
            config: TrackConfig::Video {
                width: output_size.width,
                height: output_size.height,
                profile: options.profile,
                bitrate: options.bitrate,
            },
        }];
        if mixer.is_some() {
            tracks.push(TrackHeader {
                id: AUDIO_TRACK,
                codec: CODEC_PCM_S16LE,
                config: TrackConfig::Audio {
                    sample_rate: options.audio.sample_rate,
                    channels: options.audio.channels,
                    bits_per_sample: 16,
                },
            });
        }
        metadata.encoder = opened.encoder.name().to_string();
        metadata.tracks = tracks
            .iter()
            .map(|t| TrackInfo {
                kind: t.kind(),
                codec: t.codec_name(),
            })
            .collect();

        let movie = MovieHeader {
            layout: options.container_layout(),
            framerate_mode: options.framerate_mode,
            frame_rate: options.frame_rate,
            duration_us: 0,
        };
        let writer = ContainerWriter::create(io, movie, tracks, options.fragment_duration, options.low_latency)?;
        let encoder = EncoderStage::new(
            opened.encoder,
            writer,
            VIDEO_TRACK,
            mixer.is_some().then_some(AUDIO_TRACK),
            options.framerate_mode,
            options.frame_rate,
        );

        let scheduler = match (&options.snapshot.directory, options.snapshot.enabled) {
            (Some(directory), true) => Some(SnapshotScheduler::periodic(
                StillWriter::new(directory, options.snapshot.format, started)?,
                options.snapshot.interval,
            )),
            _ => None,
        };

        Ok(RunPlan {
            sources,
            compositor,
            captures,
            mixer,
            encoder: Some(encoder),
            scheduler,
            lease: opened.lease,
            report: ReportBase {
                output_path,
                file_sink,
                metadata,
            },
        })
    }

    /// Open and start every enabled source. A required source that fails
    /// aborts the start; an optional one is skipped.
    fn start_sources(
        &self,
        descriptors: &[CaptureSourceDescriptor],
        frame_rate: u32,
    ) -> Result<Vec<Box<dyn CaptureSource>>, RecorderError> {
        let mut started: Vec<Box<dyn CaptureSource>> = Vec::new();
        for descriptor in descriptors {
            let result = open_source(descriptor, self.inner.devices.as_ref(), frame_rate).and_then(|mut source| {
                source.start()?;
                Ok(source)
            });
            match result {
                Ok(source) => started.push(source),
                Err(e) if descriptor.optional => {
                    log::warn!("[{}] skipping optional {}: {}", self.inner.id, descriptor.label, e);
                }
                Err(e) => {
                    log::error!("[{}] failed to start {}: {}", self.inner.id, descriptor.label, e);
                    stop_sources(&mut started);
                    return Err(e);
                }
            }
        }
        if started.is_empty() {
            return Err(RecorderError::SourceUnavailable("no capture source could be started".into()));
        }
        Ok(started)
    }

    fn start_audio(
        &self,
        options: &RecorderOptions,
        mixer: &AudioMixer,
        shared: &RunShared,
    ) -> Result<Vec<AudioCapture>, RecorderError> {
        let audio = &options.audio;
        let mut captures = Vec::new();
        for (enabled, class, device) in [
            (audio.capture_microphone, AudioSourceClass::Microphone, &audio.microphone_device_id),
            (audio.capture_system_audio, AudioSourceClass::System, &audio.system_device_id),
        ] {
            if !enabled {
                continue;
            }
            let provider = self.inner.devices.open_audio(class, device.as_deref())?;
            let mut capture = AudioCapture::new(class, provider, mixer);
            capture.start(mixer, Arc::clone(&shared.levels))?;
            captures.push(capture);
        }
        Ok(captures)
    }
}

fn check_sink(sink: &OutputSink, options: &RecorderOptions) -> Result<(), RecorderError> {
    match (options.mode, sink) {
        (RecorderMode::Video, OutputSink::Directory(_)) => Err(RecorderError::Configuration(
            "video mode needs a file or stream sink".into(),
        )),
        (RecorderMode::Video, _) if !sink.is_seekable() && options.container_layout() == ContainerLayout::Progressive => {
            Err(RecorderError::Configuration(
                "a non-seekable stream needs the fragmented or fast-start layout".into(),
            ))
        }
        (RecorderMode::Slideshow | RecorderMode::Snapshot, OutputSink::File(_) | OutputSink::Stream(_)) => {
            Err(RecorderError::Configuration(format!(
                "{:?} mode writes stills and needs a directory sink",
                options.mode
            )))
        }
        _ => Ok(()),
    }
}

fn stop_sources(sources: &mut [Box<dyn CaptureSource>]) {
    for source in sources.iter_mut() {
        if let Err(e) = source.stop() {
            log::warn!("failed to stop {}: {}", source.descriptor().label, e);
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn spawn_stage<'scope, 'env, T, F>(
    scope: &'scope thread::Scope<'scope, 'env>,
    name: String,
    stage: F,
) -> Result<thread::ScopedJoinHandle<'scope, T>, RecorderError>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(scope, stage)
        .map_err(|e| RecorderError::Encoder(format!("failed to spawn {} thread: {}", name, e)))
}

/// Join a stage, turning a panic into a run failure.
fn join_stage<T>(handle: thread::ScopedJoinHandle<'_, T>, stage: &str, shared: &RunShared) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            shared.fail(RecorderError::Encoder(format!("{} thread panicked", stage)));
            None
        }
    }
}

fn enter_finishing(inner: &SessionInner, reason: FinishReason) {
    let mut control = inner.control.lock();
    log::info!("[{}] finishing ({:?})", inner.id, reason);
    if control.state != SessionState::Finishing {
        control.state = SessionState::Finishing;
        inner.events.emit(RecorderEvent::StatusChanged(SessionState::Finishing));
    }
}

/// Body of the per-run supervisor thread: spawns the stages, waits for the
/// first finish request, tears down in pipeline order, then reports.
fn supervise(
    inner: Arc<SessionInner>,
    shared: Arc<RunShared>,
    plan: RunPlan,
    finish_rx: Receiver<FinishReason>,
    ready_tx: Sender<Result<(), RecorderError>>,
) {
    let RunPlan {
        sources,
        compositor,
        mut captures,
        mixer,
        encoder,
        scheduler,
        lease,
        report,
    } = plan;
    let run: &RunShared = &shared;
    let tag = short_id(&run.session_id).to_string();
    let feeds_encoder = encoder.is_some();
    let faults: Vec<AudioFault> = captures.iter().map(AudioCapture::fault).collect();

    let outcome: Result<Teardown, RecorderError> = thread::scope(|scope| {
        let abort = |e: RecorderError| {
            run.capture_stop.store(true, Ordering::SeqCst);
            run.encoder_drain.store(true, Ordering::SeqCst);
            e
        };

        let encoder = match encoder {
            Some(stage) => Some(
                spawn_stage(scope, format!("encoder-{}", tag), move || {
                    let result = stage.run(run);
                    if let Err(e) = &result {
                        run.fail(e.clone());
                    }
                    result
                })
                .map_err(abort)?,
            ),
            None => None,
        };
        let compositor = spawn_stage(scope, format!("compositor-{}", tag), move || {
            CompositorStage::new(compositor, sources, feeds_encoder).run(run)
        })
        .map_err(abort)?;
        let mixer = match mixer {
            Some(stage) => Some(
                spawn_stage(scope, format!("mixer-{}", tag), move || run_mixer(stage, &faults, run)).map_err(abort)?,
            ),
            None => None,
        };
        let scheduler = match scheduler {
            Some(stage) => Some(spawn_stage(scope, format!("snapshots-{}", tag), move || stage.run(run)).map_err(abort)?),
            None => None,
        };
        let progress = spawn_stage(scope, format!("progress-{}", tag), move || run_progress(run)).map_err(abort)?;

        let _ = ready_tx.send(Ok(()));

        // the run holds a sender, so this only returns on a request
        let reason = finish_rx.recv().unwrap_or(FinishReason::Stop);
        enter_finishing(&inner, reason);

        let duration = run.clock.freeze();
        run.capture_stop.store(true, Ordering::SeqCst);
        for capture in &mut captures {
            if let Err(e) = capture.stop() {
                log::warn!("[{}] failed to stop {:?} audio: {}", run.session_id, capture.class(), e);
            }
        }
        if let Some(handle) = mixer {
            join_stage(handle, "mixer", run);
        }
        let mut sources = join_stage(compositor, "compositor", run).unwrap_or_default();

        run.encoder_drain.store(true, Ordering::SeqCst);
        let encoded = encoder
            .and_then(|handle| join_stage(handle, "encoder", run))
            .and_then(Result::ok);
        let snapshots = scheduler
            .and_then(|handle| join_stage(handle, "snapshot", run))
            .unwrap_or_default();

        stop_sources(&mut sources);
        join_stage(progress, "progress", run);

        Ok(Teardown {
            duration,
            encoded,
            snapshots,
        })
    });

    let teardown = match outcome {
        Ok(teardown) => teardown,
        Err(e) => {
            log::error!("[{}] start-up failed: {}", shared.session_id, e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    drop(captures);
    drop(lease);

    let terminal = match shared.failure() {
        Some(e) => RecorderEvent::RecordingFailed(e.to_string()),
        None => match build_result(&shared, report, teardown) {
            Ok(result) => RecorderEvent::RecordingComplete(Box::new(result)),
            Err(e) => {
                log::error!("[{}] failed to finalize recording: {}", shared.session_id, e);
                RecorderEvent::RecordingFailed(e.to_string())
            }
        },
    };

    let mut control = inner.control.lock();
    control.state = SessionState::Idle;
    control.run = None;
    inner.events.emit(RecorderEvent::StatusChanged(SessionState::Idle));
    match &terminal {
        RecorderEvent::RecordingFailed(reason) => log::error!("[{}] recording failed: {}", inner.id, reason),
        _ => log::info!("[{}] recording complete", inner.id),
    }
    inner.events.emit(terminal);
}

fn build_result(shared: &RunShared, report: ReportBase, teardown: Teardown) -> Result<RecordingResult, RecorderError> {
    let ReportBase {
        output_path,
        file_sink,
        mut metadata,
    } = report;
    metadata.duration_secs = teardown.duration.as_secs_f64();

    let (frames_encoded, audio_frames, bytes_written) = match &teardown.encoded {
        Some(summary) => {
            log::debug!(
                "[{}] {} frames coded, {} samples written",
                shared.session_id,
                summary.frames_encoded,
                summary.container.video_samples
            );
            (
                summary.container.video_samples,
                summary.audio_frames,
                summary.container.bytes_written,
            )
        }
        None => {
            let bytes = teardown
                .snapshots
                .iter()
                .filter_map(|path| fs::metadata(path).ok())
                .map(|m| m.len())
                .sum();
            (teardown.snapshots.len() as u64, 0, bytes)
        }
    };

    let mut checksum = None;
    if file_sink {
        if let Some(path) = &output_path {
            checksum = Some(sha256_file(path)?);
            if shared.options.write_metadata {
                let sidecar = write_metadata(&metadata, path)?;
                log::debug!("[{}] wrote {}", shared.session_id, sidecar.display());
            }
        }
    }

    Ok(RecordingResult {
        output_path,
        duration_secs: teardown.duration.as_secs_f64(),
        frames_encoded,
        audio_frames,
        bytes_written,
        snapshots: teardown.snapshots,
        checksum,
        metadata,
    })
}
