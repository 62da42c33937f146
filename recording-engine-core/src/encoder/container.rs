//! Box-structured recording container.
//!
//! Every box is `[u32 big-endian size][4-byte type][payload]`; a size of 1
//! means a 64-bit size follows the type. Layouts:
//!
//! ```text
//! Progressive  ftyp mdat moov          (mdat size patched at finish)
//! FastStart    ftyp moov mdat          (payload spooled, copied after moov)
//! Fragmented   ftyp moov (moof mdat)*  (moov carries no sample tables)
//! ```
//!
//! `moov` holds `mvhd` plus one `trak` per track (`tkhd`, `stsd`, `stbl`).
//! Sample table entries are `[u64 offset][u32 size][u64 pts in us]`; in a
//! `moof`, offsets are relative to the payload of the `mdat` that follows.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::time::Duration;

use thiserror::Error;

use crate::models::config::{BitrateMode, ContainerLayout, EncoderProfile, FramerateMode};
use crate::models::error::RecorderError;
use crate::models::recording_result::TrackKind;
use crate::storage::sink::SinkIo;

pub const BRAND: [u8; 4] = *b"rec1";
pub const FORMAT_VERSION: u32 = 1;
pub const CODEC_JPEG: [u8; 4] = *b"jpeg";
pub const CODEC_PCM_S16LE: [u8; 4] = *b"lpcm";
/// Media timescale: microseconds.
pub const TIMESCALE: u32 = 1_000_000;

pub(crate) const ENTRY_LEN: usize = 20;
pub(crate) const LARGE_HEADER_LEN: u64 = 16;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed container: {0}")]
    Malformed(String),
}

impl From<ContainerError> for RecorderError {
    fn from(error: ContainerError) -> Self {
        match error {
            ContainerError::Io(e) => RecorderError::sink_io("container write failed", e),
            ContainerError::Malformed(msg) => RecorderError::Encoder(msg),
        }
    }
}

/// Codec parameters stored in a track's `stsd` box.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackConfig {
    Video {
        width: u32,
        height: u32,
        profile: EncoderProfile,
        bitrate: BitrateMode,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackHeader {
    pub id: u32,
    pub codec: [u8; 4],
    pub config: TrackConfig,
}

impl TrackHeader {
    pub fn kind(&self) -> TrackKind {
        match self.config {
            TrackConfig::Video { .. } => TrackKind::Video,
            TrackConfig::Audio { .. } => TrackKind::Audio,
        }
    }

    pub fn codec_name(&self) -> String {
        String::from_utf8_lossy(&self.codec).into_owned()
    }
}

/// Location and timing of one coded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    pub offset: u64,
    pub size: u32,
    pub pts_us: u64,
}

impl SampleEntry {
    pub fn pts(&self) -> Duration {
        Duration::from_micros(self.pts_us)
    }
}

/// Values carried in `mvhd`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieHeader {
    pub layout: ContainerLayout,
    pub framerate_mode: FramerateMode,
    pub frame_rate: u32,
    pub duration_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerSummary {
    pub bytes_written: u64,
    pub video_samples: u64,
    pub audio_samples: u64,
}

struct TrackState {
    header: TrackHeader,
    entries: Vec<SampleEntry>,
    count: u64,
}

#[derive(Default)]
struct Fragment {
    payload: Vec<u8>,
    entries: Vec<(u32, SampleEntry)>,
    started_us: Option<u64>,
}

/// Streams coded samples into a sink in the chosen layout.
pub struct ContainerWriter {
    sink: SinkIo,
    movie: MovieHeader,
    tracks: Vec<TrackState>,
    position: u64,
    mdat_at: u64,
    payload_len: u64,
    spool: Option<File>,
    fragment: Fragment,
    fragment_duration_us: u64,
    fragment_sequence: u32,
    mvhd_duration_at: Option<u64>,
    low_latency: bool,
}

impl ContainerWriter {
    pub(crate) fn create(
        sink: SinkIo,
        movie: MovieHeader,
        tracks: Vec<TrackHeader>,
        fragment_duration: Duration,
        low_latency: bool,
    ) -> Result<Self, ContainerError> {
        if movie.layout == ContainerLayout::Progressive && !sink.is_seekable() {
            return Err(ContainerError::Malformed(
                "progressive layout needs a seekable sink".into(),
            ));
        }

        let mut writer = Self {
            sink,
            movie,
            tracks: tracks
                .into_iter()
                .map(|header| TrackState {
                    header,
                    entries: Vec::new(),
                    count: 0,
                })
                .collect(),
            position: 0,
            mdat_at: 0,
            payload_len: 0,
            spool: None,
            fragment: Fragment::default(),
            fragment_duration_us: fragment_duration.as_micros() as u64,
            fragment_sequence: 0,
            mvhd_duration_at: None,
            low_latency,
        };

        let ftyp = encode_ftyp(writer.movie.layout);
        writer.emit(&ftyp)?;

        match writer.movie.layout {
            ContainerLayout::Progressive => {
                writer.mdat_at = writer.position;
                writer.emit(&large_box_header(b"mdat", 0))?;
            }
            ContainerLayout::FastStart => {
                writer.spool = Some(tempfile::tempfile()?);
            }
            ContainerLayout::Fragmented => {
                // moov header (8) + mvhd header (8) + version block (4) + timescale (4)
                writer.mvhd_duration_at = Some(writer.position + 24);
                let moov = encode_moov(&writer.movie, &writer.tracks, 0, false);
                writer.emit(&moov)?;
            }
        }
        writer.sink.flush()?;
        Ok(writer)
    }

    pub fn layout(&self) -> ContainerLayout {
        self.movie.layout
    }

    pub fn bytes_written(&self) -> u64 {
        self.position + self.payload_len
    }

    pub fn write_sample(&mut self, track_id: u32, data: &[u8], pts: Duration) -> Result<(), ContainerError> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.header.id == track_id)
            .ok_or_else(|| ContainerError::Malformed(format!("unknown track {}", track_id)))?;
        let size = u32::try_from(data.len())
            .map_err(|_| ContainerError::Malformed(format!("sample of {} bytes is too large", data.len())))?;
        let pts_us = pts.as_micros() as u64;

        match self.movie.layout {
            ContainerLayout::Progressive => {
                let offset = self.position;
                self.emit(data)?;
                self.tracks[index].entries.push(SampleEntry { offset, size, pts_us });
            }
            ContainerLayout::FastStart => {
                let offset = self.payload_len;
                if let Some(spool) = self.spool.as_mut() {
                    spool.write_all(data)?;
                }
                self.payload_len += data.len() as u64;
                self.tracks[index].entries.push(SampleEntry { offset, size, pts_us });
            }
            ContainerLayout::Fragmented => {
                let offset = self.fragment.payload.len() as u64;
                self.fragment.payload.extend_from_slice(data);
                self.fragment
                    .entries
                    .push((track_id, SampleEntry { offset, size, pts_us }));
                let started = *self.fragment.started_us.get_or_insert(pts_us);
                if self.low_latency || pts_us.saturating_sub(started) >= self.fragment_duration_us {
                    self.flush_fragment()?;
                }
            }
        }
        self.tracks[index].count += 1;

        if self.low_latency {
            self.sink.flush()?;
        }
        Ok(())
    }

    /// Close the pending fragment as a `moof mdat` pair.
    pub fn flush_fragment(&mut self) -> Result<(), ContainerError> {
        if self.movie.layout != ContainerLayout::Fragmented || self.fragment.entries.is_empty() {
            return Ok(());
        }
        let fragment = std::mem::take(&mut self.fragment);
        self.fragment_sequence += 1;

        let mut moof = Vec::new();
        push_box(&mut moof, b"mfhd", &self.fragment_sequence.to_be_bytes());
        for track in &self.tracks {
            let id = track.header.id;
            let entries: Vec<SampleEntry> = fragment
                .entries
                .iter()
                .filter(|(track_id, _)| *track_id == id)
                .map(|(_, entry)| *entry)
                .collect();
            if entries.is_empty() {
                continue;
            }
            let mut traf = Vec::with_capacity(8 + entries.len() * ENTRY_LEN);
            traf.extend_from_slice(&id.to_be_bytes());
            traf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
            for entry in &entries {
                encode_entry(&mut traf, entry, 0);
            }
            push_box(&mut moof, b"traf", &traf);
        }

        let mut boxed = Vec::with_capacity(moof.len() + 8);
        push_box(&mut boxed, b"moof", &moof);
        self.emit(&boxed)?;
        self.emit(&large_box_header(b"mdat", fragment.payload.len() as u64))?;
        self.emit(&fragment.payload)?;
        self.sink.flush()?;
        log::debug!(
            "wrote fragment {} ({} samples, {} bytes)",
            self.fragment_sequence,
            fragment.entries.len(),
            fragment.payload.len()
        );
        Ok(())
    }

    /// Write the remaining metadata and flush. The container is playable
    /// only after this returns.
    pub fn finish(mut self, duration: Duration) -> Result<ContainerSummary, ContainerError> {
        self.movie.duration_us = duration.as_micros() as u64;

        match self.movie.layout {
            ContainerLayout::Progressive => {
                let mdat_size = self.position - self.mdat_at;
                let moov = encode_moov(&self.movie, &self.tracks, 0, true);
                self.emit(&moov)?;
                self.sink.flush()?;
                self.sink.patch(self.mdat_at + 8, &mdat_size.to_be_bytes())?;
            }
            ContainerLayout::FastStart => {
                let moov_len = encode_moov(&self.movie, &self.tracks, 0, true).len() as u64;
                let base = self.position + moov_len + LARGE_HEADER_LEN;
                let moov = encode_moov(&self.movie, &self.tracks, base, true);
                self.emit(&moov)?;
                self.emit(&large_box_header(b"mdat", self.payload_len))?;
                if let Some(mut spool) = self.spool.take() {
                    spool.flush()?;
                    spool.seek(SeekFrom::Start(0))?;
                    let copied = io::copy(&mut spool, &mut self.sink)?;
                    self.position += copied;
                    self.payload_len = 0;
                }
            }
            ContainerLayout::Fragmented => {
                self.flush_fragment()?;
                if let Some(at) = self.mvhd_duration_at.filter(|_| self.sink.is_seekable()) {
                    self.sink.flush()?;
                    self.sink.patch(at, &self.movie.duration_us.to_be_bytes())?;
                }
            }
        }
        self.sink.finish()?;

        let count = |kind: TrackKind| {
            self.tracks
                .iter()
                .filter(|t| t.header.kind() == kind)
                .map(|t| t.count)
                .sum::<u64>()
        };
        Ok(ContainerSummary {
            bytes_written: self.position,
            video_samples: count(TrackKind::Video),
            audio_samples: count(TrackKind::Audio),
        })
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}

pub(crate) fn framerate_mode_code(mode: FramerateMode) -> u8 {
    match mode {
        FramerateMode::Fixed => 0,
        FramerateMode::Variable => 1,
    }
}

pub(crate) fn framerate_mode_from_code(code: u8) -> Option<FramerateMode> {
    match code {
        0 => Some(FramerateMode::Fixed),
        1 => Some(FramerateMode::Variable),
        _ => None,
    }
}

pub(crate) fn bitrate_to_parts(mode: BitrateMode) -> (u8, u32) {
    match mode {
        BitrateMode::Constant { bits_per_second } => (0, bits_per_second),
        BitrateMode::UnconstrainedVariable => (1, 0),
        BitrateMode::Quality(q) => (2, q as u32),
    }
}

pub(crate) fn bitrate_from_parts(kind: u8, value: u32) -> Option<BitrateMode> {
    match kind {
        0 => Some(BitrateMode::Constant { bits_per_second: value }),
        1 => Some(BitrateMode::UnconstrainedVariable),
        2 => u8::try_from(value).ok().map(BitrateMode::Quality),
        _ => None,
    }
}

fn push_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}

fn large_box_header(kind: &[u8; 4], payload_len: u64) -> [u8; 16] {
    let mut header = [0u8; 16];
    header[0..4].copy_from_slice(&1u32.to_be_bytes());
    header[4..8].copy_from_slice(kind);
    header[8..16].copy_from_slice(&(payload_len + LARGE_HEADER_LEN).to_be_bytes());
    header
}

fn encode_entry(out: &mut Vec<u8>, entry: &SampleEntry, base: u64) {
    out.extend_from_slice(&(entry.offset + base).to_be_bytes());
    out.extend_from_slice(&entry.size.to_be_bytes());
    out.extend_from_slice(&entry.pts_us.to_be_bytes());
}

fn encode_ftyp(layout: ContainerLayout) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9);
    payload.extend_from_slice(&BRAND);
    payload.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    payload.push(layout.code());
    let mut out = Vec::new();
    push_box(&mut out, b"ftyp", &payload);
    out
}

fn encode_moov(movie: &MovieHeader, tracks: &[TrackState], base: u64, with_samples: bool) -> Vec<u8> {
    let mut moov = Vec::new();

    let mut mvhd = Vec::with_capacity(20);
    mvhd.extend_from_slice(&[
        0,
        movie.layout.code(),
        framerate_mode_code(movie.framerate_mode),
        0,
    ]);
    mvhd.extend_from_slice(&TIMESCALE.to_be_bytes());
    mvhd.extend_from_slice(&movie.duration_us.to_be_bytes());
    mvhd.extend_from_slice(&movie.frame_rate.to_be_bytes());
    push_box(&mut moov, b"mvhd", &mvhd);

    for track in tracks {
        let mut trak = Vec::new();

        let mut tkhd = Vec::with_capacity(9);
        tkhd.extend_from_slice(&track.header.id.to_be_bytes());
        tkhd.push(match track.header.kind() {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
        });
        tkhd.extend_from_slice(&track.header.codec);
        push_box(&mut trak, b"tkhd", &tkhd);

        let mut stsd = Vec::new();
        match &track.header.config {
            TrackConfig::Video {
                width,
                height,
                profile,
                bitrate,
            } => {
                let (kind, value) = bitrate_to_parts(*bitrate);
                stsd.extend_from_slice(&width.to_be_bytes());
                stsd.extend_from_slice(&height.to_be_bytes());
                stsd.push(profile.code());
                stsd.push(kind);
                stsd.extend_from_slice(&value.to_be_bytes());
            }
            TrackConfig::Audio {
                sample_rate,
                channels,
                bits_per_sample,
            } => {
                stsd.extend_from_slice(&sample_rate.to_be_bytes());
                stsd.extend_from_slice(&channels.to_be_bytes());
                stsd.extend_from_slice(&bits_per_sample.to_be_bytes());
            }
        }
        push_box(&mut trak, b"stsd", &stsd);

        let entries: &[SampleEntry] = if with_samples { &track.entries } else { &[] };
        let mut stbl = Vec::with_capacity(4 + entries.len() * ENTRY_LEN);
        stbl.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for entry in entries {
            encode_entry(&mut stbl, entry, base);
        }
        push_box(&mut trak, b"stbl", &stbl);

        push_box(&mut moov, b"trak", &trak);
    }

    let mut out = Vec::with_capacity(moov.len() + 8);
    push_box(&mut out, b"moov", &moov);
    out
}
