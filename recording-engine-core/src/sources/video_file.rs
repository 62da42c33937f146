use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{ImageFormat, RgbaImage};

use crate::encoder::container::{ContainerError, SampleEntry, CODEC_JPEG};
use crate::encoder::reader::ContainerReader;
use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;
use crate::sources::feed::SourceFeed;
use crate::sources::pacing::Pacer;
use crate::traits::capture_source::CaptureSource;

/// Plays back the video track of a recording made by this engine, looping
/// at the end.
pub struct VideoFileSource {
    descriptor: CaptureSourceDescriptor,
    path: PathBuf,
    period: Duration,
    feed: SourceFeed,
    native: Option<Size>,
    pacer: Option<Pacer>,
}

struct Playback {
    reader: ContainerReader<BufReader<File>>,
    samples: Vec<SampleEntry>,
    loop_duration: Duration,
    current: Option<usize>,
}

impl Playback {
    fn open(path: &Path) -> Result<(Self, RgbaImage), RecorderError> {
        let mut reader = ContainerReader::open(path)?;
        let track = reader
            .video_track()
            .ok_or_else(|| RecorderError::SourceUnavailable(format!("{} has no video track", path.display())))?;
        if track.header.codec != CODEC_JPEG {
            return Err(RecorderError::SourceUnavailable(format!(
                "{}: unsupported video codec {}",
                path.display(),
                track.header.codec_name()
            )));
        }
        let samples = track.samples.clone();
        let Some(first) = samples.first().copied() else {
            return Err(RecorderError::SourceUnavailable(format!(
                "{} has no video samples",
                path.display()
            )));
        };

        // a single-frame file still needs a non-zero loop
        let loop_duration = reader.duration().max(Duration::from_millis(1));
        let data = reader.read_sample(&first).map_err(read_error)?;
        let image = decode(&data)?;
        Ok((
            Self {
                reader,
                samples,
                loop_duration,
                current: None,
            },
            image,
        ))
    }

    /// Index of the sample on screen at `position` into the loop.
    fn index_at(&self, position: Duration) -> usize {
        let pts = position.as_micros() as u64;
        self.samples.partition_point(|s| s.pts_us <= pts).saturating_sub(1)
    }

    /// The frame for `elapsed`, or `None` when it is the one already shown.
    fn frame_at(&mut self, elapsed: Duration) -> Result<Option<RgbaImage>, RecorderError> {
        let position = Duration::from_nanos((elapsed.as_nanos() % self.loop_duration.as_nanos()) as u64);
        let index = self.index_at(position);
        if self.current == Some(index) {
            return Ok(None);
        }
        let entry = self.samples[index];
        let data = self.reader.read_sample(&entry).map_err(read_error)?;
        self.current = Some(index);
        decode(&data).map(Some)
    }
}

fn read_error(e: ContainerError) -> RecorderError {
    RecorderError::SourceUnavailable(format!("failed to read video sample: {}", e))
}

fn decode(data: &[u8]) -> Result<RgbaImage, RecorderError> {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map(|img| img.to_rgba8())
        .map_err(|e| RecorderError::SourceUnavailable(format!("failed to decode video sample: {}", e)))
}

impl VideoFileSource {
    pub fn new(descriptor: CaptureSourceDescriptor, path: PathBuf, frame_rate: u32) -> Self {
        let feed = SourceFeed::new(descriptor.id);
        Self {
            descriptor,
            path,
            period: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            feed,
            native: None,
            pacer: None,
        }
    }
}

impl CaptureSource for VideoFileSource {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    fn native_size(&self) -> Option<Size> {
        self.native
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.pacer.is_some() {
            return Ok(());
        }
        let (mut playback, first) = Playback::open(&self.path)?;
        self.native = Some(Size::new(first.width(), first.height()));
        log::info!(
            "starting video file {} from {} ({} samples, loop {:?})",
            self.descriptor.id,
            self.path.display(),
            playback.samples.len(),
            playback.loop_duration
        );

        let feed = self.feed.clone();
        feed.clear();
        feed.push_frame(first);
        playback.current = Some(0);

        self.pacer = Some(Pacer::spawn(
            format!("video-file-{}", self.descriptor.id.0),
            self.period,
            move |elapsed| match playback.frame_at(elapsed) {
                Ok(Some(image)) => {
                    feed.push_frame(image);
                    true
                }
                Ok(None) => true,
                Err(e) => {
                    feed.report(e);
                    false
                }
            },
        )?);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if let Some(mut pacer) = self.pacer.take() {
            pacer.stop();
        }
        Ok(())
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.feed.latest()
    }

    fn take_fault(&self) -> Option<RecorderError> {
        self.feed.take_fault()
    }

    fn is_running(&self) -> bool {
        self.pacer.is_some()
    }
}
