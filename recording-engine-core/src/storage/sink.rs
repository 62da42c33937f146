use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::RecorderError;

/// A byte stream the container writer may seek back into.
pub trait SeekableWrite: Write + Seek + Send {}

impl<T: Write + Seek + Send> SeekableWrite for T {}

/// Where a session's output goes.
///
/// Video mode writes into a file or a caller-supplied stream; slideshow and
/// snapshot modes write numbered stills into a directory.
pub enum OutputSink {
    File(PathBuf),
    Stream(StreamSink),
    Directory(PathBuf),
}

/// A caller-owned byte stream.
///
/// Whether it can seek is declared up front: a sequential stream requires a
/// fragmented or fast-start container layout.
pub enum StreamSink {
    Seekable(Box<dyn SeekableWrite>),
    Sequential(Box<dyn Write + Send>),
}

impl OutputSink {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    pub fn stream(writer: impl Write + Send + 'static) -> Self {
        Self::Stream(StreamSink::Sequential(Box::new(writer)))
    }

    pub fn seekable_stream(writer: impl Write + Seek + Send + 'static) -> Self {
        Self::Stream(StreamSink::Seekable(Box::new(writer)))
    }

    pub fn is_seekable(&self) -> bool {
        !matches!(self, Self::Stream(StreamSink::Sequential(_)))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) | Self::Directory(path) => Some(path),
            Self::Stream(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Stream(StreamSink::Seekable(_)) => "seekable stream",
            Self::Stream(StreamSink::Sequential(_)) => "stream",
            Self::Directory(_) => "directory",
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            Self::Stream(_) => f.write_str(self.kind()),
        }
    }
}

/// The open byte-level side of a file or stream sink.
pub(crate) enum SinkIo {
    File(BufWriter<File>),
    Seekable(Box<dyn SeekableWrite>),
    Sequential(Box<dyn Write + Send>),
}

impl SinkIo {
    /// Open a file or stream sink. Directory sinks have no byte stream.
    pub(crate) fn open(sink: OutputSink) -> Result<Self, RecorderError> {
        match sink {
            OutputSink::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .map_err(|e| RecorderError::sink_io("failed to create output directory", e))?;
                }
                let file = File::create(&path).map_err(|e| {
                    RecorderError::sink_io(&format!("failed to create {}", path.display()), e)
                })?;
                Ok(Self::File(BufWriter::new(file)))
            }
            OutputSink::Stream(StreamSink::Seekable(writer)) => Ok(Self::Seekable(writer)),
            OutputSink::Stream(StreamSink::Sequential(writer)) => Ok(Self::Sequential(writer)),
            OutputSink::Directory(path) => Err(RecorderError::Configuration(format!(
                "directory sink {} cannot hold a video container",
                path.display()
            ))),
        }
    }

    pub(crate) fn is_seekable(&self) -> bool {
        !matches!(self, Self::Sequential(_))
    }

    /// Overwrite bytes at an absolute offset, then return to the end.
    pub(crate) fn patch(&mut self, at: u64, bytes: &[u8]) -> io::Result<()> {
        let seeker: &mut dyn SeekableWrite = match self {
            Self::File(writer) => writer,
            Self::Seekable(writer) => writer.as_mut(),
            Self::Sequential(_) => {
                return Err(io::Error::new(io::ErrorKind::Unsupported, "sink cannot seek"));
            }
        };
        let end = seeker.seek(SeekFrom::End(0))?;
        seeker.seek(SeekFrom::Start(at))?;
        seeker.write_all(bytes)?;
        seeker.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Flush everything and make file contents durable.
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        self.flush()?;
        if let Self::File(writer) = self {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Write for SinkIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File(writer) => writer.write(buf),
            Self::Seekable(writer) => writer.write(buf),
            Self::Sequential(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(writer) => writer.flush(),
            Self::Seekable(writer) => writer.flush(),
            Self::Sequential(writer) => writer.flush(),
        }
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, RecorderError> {
    let mut file =
        File::open(path).map_err(|e| RecorderError::sink_io("failed to open file for checksum", e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| RecorderError::sink_io("failed to read file for checksum", e))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
