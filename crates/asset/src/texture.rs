//! Texture decoding and CPU-side pixel buffers.
//!
//! Decoding is a pure function of the input bytes, so it is safe to run on worker
//! threads and hand the resulting [`PixelBuffer`] to the renderer thread for upload.

use corelib::{EngineError, EngineResult};
use image::{DynamicImage, ImageError, ImageFormat};

/// Layout of one pixel in a [`PixelBuffer`]. All channels are 8-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    #[inline]
    pub const fn channels(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }

    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(Self::R8),
            2 => Some(Self::Rg8),
            3 => Some(Self::Rgb8),
            4 => Some(Self::Rgba8),
            _ => None,
        }
    }
}

/// Encoded container a buffer was decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl ImageKind {
    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tga => Some(Self::Tga),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tga => ImageFormat::Tga,
        }
    }
}

/// Where the pixels in a [`PixelBuffer`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelSource {
    Encoded(ImageKind),
    Raw,
}

/// Pixel data in CPU-friendly format before GPU upload.
///
/// Invariant: `data.len() == width * height * format.channels()`.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    source: PixelSource,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap already-decoded pixels; fails with `InvalidDimensions` on a size mismatch.
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        name: &str,
    ) -> EngineResult<Self> {
        Self::with_source(width, height, format, PixelSource::Raw, data, name)
    }

    fn with_source(
        width: u32,
        height: u32,
        format: PixelFormat,
        source: PixelSource,
        data: Vec<u8>,
        name: &str,
    ) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::invalid_dimensions(
                name,
                format!("{width}x{height} has no pixels"),
            ));
        }
        let expected = (width as u64) * (height as u64) * format.channels() as u64;
        if data.len() as u64 != expected {
            return Err(EngineError::invalid_dimensions(
                name,
                format!(
                    "{width}x{height}x{} needs {expected} bytes, got {}",
                    format.channels(),
                    data.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            source,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn source(&self) -> PixelSource {
        self.source
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> u32 {
        self.format.channels()
    }

    #[inline]
    pub fn row_pitch(&self) -> usize {
        (self.width * self.bytes_per_pixel()) as usize
    }

    /// Copy out the `w`x`h` region whose top-left corner is at (`x`, `y`).
    pub(crate) fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Self {
        let bpp = self.bytes_per_pixel() as usize;
        let pitch = self.row_pitch();
        let row_bytes = w as usize * bpp;
        let mut data = Vec::with_capacity(row_bytes * h as usize);
        for row in y..y + h {
            let start = row as usize * pitch + x as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Self {
            width: w,
            height: h,
            format: self.format,
            source: self.source,
            data,
        }
    }

    /// Rotate by 180 degrees in place.
    pub(crate) fn rotate_180(&mut self) {
        let bpp = self.bytes_per_pixel() as usize;
        let pixels = self.data.len() / bpp;
        for i in 0..pixels / 2 {
            let j = pixels - 1 - i;
            for c in 0..bpp {
                self.data.swap(i * bpp + c, j * bpp + c);
            }
        }
    }

    /// Expand to tightly packed RGBA8, the only layout the GPU backends upload.
    ///
    /// `R8` is replicated into RGB (opaque); `Rg8` is treated as luminance + alpha.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8 => self.data.clone(),
            PixelFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            PixelFormat::Rg8 => self
                .data
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            PixelFormat::R8 => self.data.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        }
    }
}

/// Identify the encoded container without decoding it.
///
/// Unknown signatures and formats this build does not decode are `UnsupportedFormat`.
pub fn detect_format(bytes: &[u8], name: &str) -> EngineResult<ImageKind> {
    let format = image::guess_format(bytes).map_err(|_| EngineError::UnsupportedFormat {
        name: name.to_owned(),
        format: signature_hint(bytes),
    })?;
    ImageKind::from_format(format).ok_or_else(|| EngineError::UnsupportedFormat {
        name: name.to_owned(),
        format: format!("{format:?}"),
    })
}

fn signature_hint(bytes: &[u8]) -> String {
    let head: Vec<String> = bytes.iter().take(4).map(|b| format!("{b:02x}")).collect();
    if head.is_empty() {
        "empty buffer".into()
    } else {
        format!("unrecognised signature {}", head.join(" "))
    }
}

/// Decode an encoded image. `name` is only used for error context and logs.
pub fn decode(bytes: &[u8], name: &str) -> EngineResult<PixelBuffer> {
    let kind = detect_format(bytes, name)?;
    let image = image::load_from_memory_with_format(bytes, kind.format())
        .map_err(|e| map_image_error(e, name))?;

    let (width, height) = (image.width(), image.height());
    let (format, data) = match image {
        DynamicImage::ImageLuma8(img) => (PixelFormat::R8, img.into_raw()),
        DynamicImage::ImageLumaA8(img) => (PixelFormat::Rg8, img.into_raw()),
        DynamicImage::ImageRgb8(img) => (PixelFormat::Rgb8, img.into_raw()),
        DynamicImage::ImageRgba8(img) => (PixelFormat::Rgba8, img.into_raw()),
        other => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
    };

    let buffer =
        PixelBuffer::with_source(width, height, format, PixelSource::Encoded(kind), data, name)?;
    log::info!(
        "Decoded {:?} image '{}' {}x{} ({:?})",
        kind,
        name,
        width,
        height,
        format
    );
    Ok(buffer)
}

fn map_image_error(err: ImageError, name: &str) -> EngineError {
    match err {
        ImageError::Unsupported(e) => EngineError::UnsupportedFormat {
            name: name.to_owned(),
            format: e.to_string(),
        },
        ImageError::Limits(e) => EngineError::invalid_dimensions(name, e.to_string()),
        other => EngineError::DecodeError {
            name: name.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    fn encode_png_rgba(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 7, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_with_declared_dimensions() {
        let bytes = encode_png_rgba(13, 7);
        let pixels = decode(&bytes, "grid.png").unwrap();
        assert_eq!((pixels.width(), pixels.height()), (13, 7));
        assert_eq!(pixels.format(), PixelFormat::Rgba8);
        assert_eq!(pixels.source(), PixelSource::Encoded(ImageKind::Png));
        assert_eq!(pixels.data().len(), 13 * 7 * 4);
        assert_eq!(&pixels.data()[4..8], &[1, 0, 7, 255]);
    }

    #[test]
    fn decodes_rgb_bmp_keeping_three_channels() {
        let img = ImageBuffer::from_pixel(4, 2, Rgb([10u8, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Bmp)
            .unwrap();
        let pixels = decode(out.get_ref(), "flat.bmp").unwrap();
        assert_eq!(pixels.format(), PixelFormat::Rgb8);
        assert_eq!(&pixels.to_rgba8()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn unknown_signature_is_unsupported_format() {
        let err = decode(b"definitely not an image", "notes.txt").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat { .. }), "{err}");
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let mut bytes = encode_png_rgba(16, 16);
        bytes.truncate(bytes.len() / 2);
        let err = decode(&bytes, "broken.png").unwrap_err();
        assert!(matches!(err, EngineError::DecodeError { .. }), "{err}");
    }

    #[test]
    fn decode_leaves_input_untouched() {
        let bytes = encode_png_rgba(3, 3);
        let before = bytes.clone();
        decode(&bytes, "a.png").unwrap();
        assert_eq!(bytes, before);
    }

    #[test]
    fn raw_length_must_match_dimensions() {
        assert!(PixelBuffer::from_raw(2, 2, PixelFormat::Rgb8, vec![0; 12], "ok").is_ok());
        let err = PixelBuffer::from_raw(2, 2, PixelFormat::Rgb8, vec![0; 11], "short").unwrap_err();
        assert!(matches!(err, EngineError::InvalidDimensions { .. }));
        let err = PixelBuffer::from_raw(0, 2, PixelFormat::R8, vec![], "empty").unwrap_err();
        assert!(matches!(err, EngineError::InvalidDimensions { .. }));
    }

    #[test]
    fn luminance_alpha_expands_to_rgba() {
        let pixels = PixelBuffer::from_raw(1, 1, PixelFormat::Rg8, vec![90, 12], "la").unwrap();
        assert_eq!(pixels.to_rgba8(), vec![90, 90, 90, 12]);
    }

    #[test]
    fn decoding_runs_off_the_main_thread() {
        let bytes = encode_png_rgba(8, 4);
        let handle = std::thread::spawn(move || decode(&bytes, "worker.png"));
        let pixels = handle.join().unwrap().unwrap();
        assert_eq!((pixels.width(), pixels.height()), (8, 4));
    }
}
