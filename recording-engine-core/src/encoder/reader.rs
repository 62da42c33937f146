use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use crate::encoder::container::{
    bitrate_from_parts, framerate_mode_from_code, ContainerError, MovieHeader, SampleEntry, TrackConfig,
    TrackHeader, BRAND, ENTRY_LEN,
};
use crate::models::config::{ContainerLayout, EncoderProfile};
use crate::models::error::RecorderError;
use crate::models::recording_result::TrackKind;

/// A parsed track and its complete sample table.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub header: TrackHeader,
    pub samples: Vec<SampleEntry>,
}

/// Reads recordings written by `ContainerWriter`, in any layout.
///
/// Box metadata is parsed up front; sample payloads are read on demand.
pub struct ContainerReader<R> {
    source: R,
    layout: ContainerLayout,
    movie: MovieHeader,
    tracks: Vec<Track>,
}

impl ContainerReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, RecorderError> {
        let file = File::open(path).map_err(|e| {
            RecorderError::SourceUnavailable(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|e| {
            RecorderError::SourceUnavailable(format!("failed to read {}: {}", path.display(), e))
        })
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    pub fn from_reader(mut source: R) -> Result<Self, ContainerError> {
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut layout = None;
        let mut movie = None;
        let mut tracks: Vec<Track> = Vec::new();
        let mut pending_fragment: Option<Vec<(u32, SampleEntry)>> = None;

        let mut pos = 0u64;
        while pos < end {
            source.seek(SeekFrom::Start(pos))?;
            let mut header = [0u8; 8];
            source.read_exact(&mut header)?;
            let mut size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let kind = [header[4], header[5], header[6], header[7]];
            let mut header_len = 8u64;
            if size == 1 {
                let mut large = [0u8; 8];
                source.read_exact(&mut large)?;
                size = u64::from_be_bytes(large);
                header_len = 16;
            } else if size == 0 {
                size = end - pos;
            }
            if size < header_len || pos + size > end {
                return Err(malformed(format!(
                    "box {} at {} has invalid size {}",
                    String::from_utf8_lossy(&kind),
                    pos,
                    size
                )));
            }
            let payload_start = pos + header_len;
            let payload_len = size - header_len;

            match &kind {
                b"ftyp" => {
                    let payload = read_payload(&mut source, payload_len)?;
                    let mut bytes = Bytes::new(&payload);
                    if bytes.array::<4>()? != BRAND {
                        return Err(malformed("unknown brand".into()));
                    }
                    let _version = bytes.u32()?;
                    layout = Some(
                        ContainerLayout::from_code(bytes.u8()?)
                            .ok_or_else(|| malformed("unknown layout".into()))?,
                    );
                }
                b"moov" => {
                    let payload = read_payload(&mut source, payload_len)?;
                    let (parsed_movie, parsed_tracks) = parse_moov(&payload)?;
                    movie = Some(parsed_movie);
                    for track in parsed_tracks {
                        match tracks.iter_mut().find(|t| t.header.id == track.header.id) {
                            Some(existing) => existing.samples.extend(track.samples),
                            None => tracks.push(track),
                        }
                    }
                }
                b"moof" => {
                    let payload = read_payload(&mut source, payload_len)?;
                    pending_fragment = Some(parse_moof(&payload)?);
                }
                b"mdat" => {
                    if let Some(entries) = pending_fragment.take() {
                        for (track_id, mut entry) in entries {
                            entry.offset += payload_start;
                            let track = tracks
                                .iter_mut()
                                .find(|t| t.header.id == track_id)
                                .ok_or_else(|| malformed(format!("fragment names unknown track {}", track_id)))?;
                            track.samples.push(entry);
                        }
                    }
                }
                _ => {}
            }
            pos += size;
        }

        let layout = layout.ok_or_else(|| malformed("missing ftyp".into()))?;
        let movie = movie.ok_or_else(|| malformed("missing moov".into()))?;
        Ok(Self {
            source,
            layout,
            movie,
            tracks,
        })
    }

    pub fn layout(&self) -> ContainerLayout {
        self.layout
    }

    pub fn movie(&self) -> &MovieHeader {
        &self.movie
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.header.kind() == TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.header.kind() == TrackKind::Audio)
    }

    /// Recorded duration; fragmented files on sequential sinks carry none,
    /// so the last sample time stands in.
    pub fn duration(&self) -> Duration {
        if self.movie.duration_us > 0 {
            return Duration::from_micros(self.movie.duration_us);
        }
        self.tracks
            .iter()
            .filter_map(|t| t.samples.last())
            .map(|s| s.pts())
            .max()
            .unwrap_or_default()
    }

    pub fn read_sample(&mut self, entry: &SampleEntry) -> Result<Vec<u8>, ContainerError> {
        self.source.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.size as usize];
        self.source.read_exact(&mut data)?;
        Ok(data)
    }
}

fn malformed(msg: String) -> ContainerError {
    ContainerError::Malformed(msg)
}

fn read_payload<R: Read>(source: &mut R, len: u64) -> Result<Vec<u8>, ContainerError> {
    let mut payload = vec![0u8; len as usize];
    source.read_exact(&mut payload)?;
    Ok(payload)
}

/// Big-endian cursor over a box payload.
struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ContainerError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed("truncated box".into()))?;
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ContainerError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ContainerError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ContainerError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, ContainerError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, ContainerError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Next child box as `(type, payload)`.
    fn child(&mut self) -> Result<([u8; 4], &'a [u8]), ContainerError> {
        let size = self.u32()? as usize;
        let kind = self.array::<4>()?;
        let payload = self.take(size.saturating_sub(8))?;
        Ok((kind, payload))
    }

    fn entries(&mut self) -> Result<Vec<SampleEntry>, ContainerError> {
        let count = self.u32()? as usize;
        if count.saturating_mul(ENTRY_LEN) > self.data.len() - self.pos {
            return Err(malformed(format!("sample table claims {} entries", count)));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(SampleEntry {
                offset: self.u64()?,
                size: self.u32()?,
                pts_us: self.u64()?,
            });
        }
        Ok(entries)
    }
}

fn parse_moov(payload: &[u8]) -> Result<(MovieHeader, Vec<Track>), ContainerError> {
    let mut bytes = Bytes::new(payload);
    let mut movie = None;
    let mut tracks = Vec::new();

    while !bytes.is_empty() {
        let (kind, child) = bytes.child()?;
        match &kind {
            b"mvhd" => {
                let mut b = Bytes::new(child);
                let _version = b.u8()?;
                let layout = ContainerLayout::from_code(b.u8()?).ok_or_else(|| malformed("unknown layout".into()))?;
                let framerate_mode =
                    framerate_mode_from_code(b.u8()?).ok_or_else(|| malformed("unknown framerate mode".into()))?;
                let _reserved = b.u8()?;
                let _timescale = b.u32()?;
                let duration_us = b.u64()?;
                let frame_rate = b.u32()?;
                movie = Some(MovieHeader {
                    layout,
                    framerate_mode,
                    frame_rate,
                    duration_us,
                });
            }
            b"trak" => tracks.push(parse_trak(child)?),
            _ => {}
        }
    }

    let movie = movie.ok_or_else(|| malformed("missing mvhd".into()))?;
    Ok((movie, tracks))
}

fn parse_trak(payload: &[u8]) -> Result<Track, ContainerError> {
    let mut bytes = Bytes::new(payload);
    let mut identity = None;
    let mut config_bytes = None;
    let mut samples = Vec::new();

    while !bytes.is_empty() {
        let (kind, child) = bytes.child()?;
        match &kind {
            b"tkhd" => {
                let mut b = Bytes::new(child);
                identity = Some((b.u32()?, b.u8()?, b.array::<4>()?));
            }
            b"stsd" => config_bytes = Some(child),
            b"stbl" => samples = Bytes::new(child).entries()?,
            _ => {}
        }
    }

    let (id, kind, codec) = identity.ok_or_else(|| malformed("missing tkhd".into()))?;
    let mut b = Bytes::new(config_bytes.ok_or_else(|| malformed("missing stsd".into()))?);
    let config = match kind {
        0 => {
            let width = b.u32()?;
            let height = b.u32()?;
            let profile = EncoderProfile::from_code(b.u8()?).ok_or_else(|| malformed("unknown profile".into()))?;
            let bitrate_kind = b.u8()?;
            let bitrate_value = b.u32()?;
            let bitrate = bitrate_from_parts(bitrate_kind, bitrate_value)
                .ok_or_else(|| malformed("unknown bitrate mode".into()))?;
            TrackConfig::Video {
                width,
                height,
                profile,
                bitrate,
            }
        }
        1 => TrackConfig::Audio {
            sample_rate: b.u32()?,
            channels: b.u16()?,
            bits_per_sample: b.u16()?,
        },
        other => return Err(malformed(format!("unknown track kind {}", other))),
    };

    Ok(Track {
        header: TrackHeader { id, codec, config },
        samples,
    })
}

fn parse_moof(payload: &[u8]) -> Result<Vec<(u32, SampleEntry)>, ContainerError> {
    let mut bytes = Bytes::new(payload);
    let mut entries = Vec::new();
    while !bytes.is_empty() {
        let (kind, child) = bytes.child()?;
        if &kind == b"traf" {
            let mut b = Bytes::new(child);
            let track_id = b.u32()?;
            for entry in b.entries()? {
                entries.push((track_id, entry));
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_foreign_files() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&17u32.to_be_bytes());
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(b"isom");
        bytes.extend_from_slice(&[0, 0, 0, 1, 0]);
        assert!(ContainerReader::from_reader(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_truncated_boxes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"moov");
        assert!(matches!(
            ContainerReader::from_reader(Cursor::new(bytes)),
            Err(ContainerError::Malformed(_))
        ));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let result = ContainerReader::open(Path::new("/nonexistent/recording.rec"));
        assert!(matches!(result, Err(RecorderError::SourceUnavailable(_))));
    }
}
