use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError, ImageFormat, RgbImage, RgbaImage};

use crate::models::config::StillFormat;
use crate::models::error::RecorderError;

/// Writes numbered stills into a directory.
///
/// Names are `<session start>_<index>.<ext>` with a fixed-width start stamp
/// and a zero-padded index, so a plain lexicographic listing of the
/// directory matches firing order. Each file is written under a temporary
/// name and renamed, so a visible still is always complete.
pub struct StillWriter {
    directory: PathBuf,
    stamp: String,
    format: StillFormat,
    next_index: u32,
}

impl StillWriter {
    pub fn new(directory: impl Into<PathBuf>, format: StillFormat, started: DateTime<Local>) -> Result<Self, RecorderError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            RecorderError::sink_io(&format!("failed to create snapshot directory {}", directory.display()), e)
        })?;
        Ok(Self {
            directory,
            stamp: started.format("%Y%m%d-%H%M%S%3f").to_string(),
            format,
            next_index: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn written(&self) -> u32 {
        self.next_index
    }

    pub fn path_for(&self, index: u32) -> PathBuf {
        self.directory
            .join(format!("{}_{:05}.{}", self.stamp, index, self.format.extension()))
    }

    pub fn write(&mut self, image: &RgbaImage) -> Result<PathBuf, RecorderError> {
        let path = self.path_for(self.next_index);
        let partial = path.with_extension("partial");

        let result = match self.format {
            StillFormat::Png => image.save_with_format(&partial, ImageFormat::Png).map_err(image_error),
            StillFormat::Bmp => image.save_with_format(&partial, ImageFormat::Bmp).map_err(image_error),
            StillFormat::Jpeg { quality } => write_jpeg(image, &partial, quality),
        };
        if let Err(e) = result {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, &path).map_err(|e| RecorderError::sink_io("failed to publish snapshot", e))?;

        self.next_index += 1;
        log::debug!("wrote still {}", path.display());
        Ok(path)
    }
}

fn write_jpeg(image: &RgbaImage, path: &Path, quality: u8) -> Result<(), RecorderError> {
    let rgb: RgbImage = image.convert();
    let file = File::create(path).map_err(|e| RecorderError::sink_io("failed to create snapshot", e))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(image_error)?;
    writer.flush().map_err(|e| RecorderError::sink_io("failed to write snapshot", e))
}

fn image_error(error: ImageError) -> RecorderError {
    match error {
        ImageError::IoError(e) => RecorderError::sink_io("failed to write snapshot", e),
        other => RecorderError::Encoder(format!("failed to encode snapshot: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn names_sort_in_firing_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StillWriter::new(dir.path(), StillFormat::Png, started()).unwrap();
        let image = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));

        let written: Vec<PathBuf> = (0..12).map(|_| writer.write(&image).unwrap()).collect();

        let mut listed: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        listed.sort();
        assert_eq!(listed, written);
        assert_eq!(
            written[0].file_name().unwrap().to_str().unwrap(),
            "20240309-140507000_00000.png"
        );
    }

    #[test]
    fn jpeg_and_bmp_stills_decode() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbaImage::from_pixel(8, 6, Rgba([200, 100, 50, 255]));

        for format in [StillFormat::Jpeg { quality: 80 }, StillFormat::Bmp] {
            let mut writer = StillWriter::new(dir.path(), format, started()).unwrap();
            let path = writer.write(&image).unwrap();
            assert_eq!(path.extension().unwrap(), format.extension());
            let decoded = image::open(&path).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (8, 6));
        }
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer = StillWriter::new(&nested, StillFormat::Png, started()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.written(), 0);
    }
}
