//! Image pipeline (C7): format-agnostic decode, orientation, flatten,
//! fit-resize and encode, driven from a pooled buffer.
//!
//! Every stage here is synchronous and CPU-bound; callers run it inside
//! `tokio::task::spawn_blocking` so it never starves the async executor.

use std::io::Cursor;
use std::sync::Mutex;

use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};

#[derive(Debug, thiserror::Error)]
pub enum ImagePipelineError {
    #[error("unrecognised image format")]
    Decode,
    #[error("image encode failed")]
    Encode,
}

/// A pool of reusable growable byte buffers for encoder output. Reset on
/// acquire, returned to the pool on every exit path (including panics that
/// unwind through the guard's `Drop`).
#[derive(Default)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> PooledBuffer<'_> {
        let mut buf = self.buffers.lock().unwrap().pop().unwrap_or_default();
        buf.clear();
        PooledBuffer {
            buf: Some(buf),
            pool: self,
        }
    }
}

/// A buffer checked out of a `BufferPool`. Returned to the pool on drop;
/// callers must copy bytes out before the guard goes out of scope since the
/// backing `Vec` may be handed to another acquirer immediately afterwards.
pub struct PooledBuffer<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl std::ops::Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer taken")
    }
}

impl std::ops::DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.buffers.lock().unwrap().push(buf);
        }
    }
}

/// Decode `bytes` (JPEG/PNG/GIF/BMP/TIFF/WebP), then apply the EXIF
/// orientation transform if present. Fails with `Decode` for anything the
/// `image` crate cannot guess the format of or parse.
pub fn decode_and_orient(bytes: &[u8]) -> Result<DynamicImage, ImagePipelineError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| ImagePipelineError::Decode)?;
    let img = reader.decode().map_err(|_| ImagePipelineError::Decode)?;
    let orientation = read_exif_orientation(bytes).unwrap_or(1);
    Ok(apply_orientation(img, orientation))
}

/// Parse the EXIF `Orientation` tag out of `bytes`. Returns `None` when no
/// EXIF data is present or it cannot be parsed — callers treat that as `1`
/// (identity).
fn read_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).map(|v| v as u16)
}

/// Apply the canonical 8-case EXIF orientation transform.
fn apply_orientation(img: DynamicImage, tag: u16) -> DynamicImage {
    match tag {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate270().fliph(),
        6 => img.rotate270(),
        7 => img.rotate270().flipv(),
        8 => img.rotate90(),
        _ => img,
    }
}

/// Composite `img` onto an opaque white background of the same dimensions,
/// discarding any alpha channel. Thumbnail path only.
pub fn flatten_alpha(img: &DynamicImage) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let mut background = RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut background, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(background)
}

/// Scale `img` so that `max(width,height) <= max_long_edge`, preserving
/// aspect ratio. Never upscales. Uses Catmull-Rom resampling.
pub fn fit_resize(img: &DynamicImage, max_long_edge: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w.max(h) <= max_long_edge {
        return img.clone();
    }
    img.resize(max_long_edge, max_long_edge, image::imageops::FilterType::CatmullRom)
}

/// Encode `img` as WebP at `quality` (0-100), the upload-conversion path.
pub fn encode_webp(img: &DynamicImage, quality: u8, pool: &BufferPool) -> Result<Vec<u8>, ImagePipelineError> {
    let encoder = webp::Encoder::from_image(img).map_err(|_| ImagePipelineError::Encode)?;
    let encoded = encoder.encode(quality as f32);
    let mut buf = pool.acquire();
    buf.extend_from_slice(&encoded);
    Ok(buf.clone())
}

/// Encode `img` as JPEG at `quality` (0-100), the thumbnail path.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, pool: &BufferPool) -> Result<Vec<u8>, ImagePipelineError> {
    let rgb = img.to_rgb8();
    let mut buf = pool.acquire();
    {
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut *buf, quality);
        encoder.encode_image(&rgb).map_err(|_| ImagePipelineError::Encode)?;
    }
    Ok(buf.clone())
}

/// Full thumbnail path: decode → orient → flatten → fit-resize → JPEG.
pub fn make_thumbnail(
    bytes: &[u8],
    max_long_edge: u32,
    quality: u8,
    pool: &BufferPool,
) -> Result<Vec<u8>, ImagePipelineError> {
    let img = decode_and_orient(bytes)?;
    let flattened = flatten_alpha(&img);
    let resized = fit_resize(&flattened, max_long_edge);
    encode_jpeg(&resized, quality, pool)
}

/// Full upload-conversion path: decode → orient → WebP (no flatten/resize —
/// WebP supports alpha and the source resolution is preserved on upload).
pub fn convert_to_webp(bytes: &[u8], quality: u8, pool: &BufferPool) -> Result<Vec<u8>, ImagePipelineError> {
    let img = decode_and_orient(bytes)?;
    encode_webp(&img, quality, pool)
}

/// The format the jpeg encoder targets; exposed for tests/documentation.
pub const THUMBNAIL_FORMAT: ImageFormat = ImageFormat::Jpeg;

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn sample_jpeg() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(64, 32, |x, y| {
            Rgb([x as u8, y as u8, 128])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn decode_roundtrips_dimensions() {
        let bytes = sample_jpeg();
        let img = decode_and_orient(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (64, 32));
    }

    #[test]
    fn fit_resize_never_upscales() {
        let bytes = sample_jpeg();
        let img = decode_and_orient(&bytes).unwrap();
        let resized = fit_resize(&img, 1000);
        assert_eq!((resized.width(), resized.height()), (64, 32));
    }

    #[test]
    fn fit_resize_bounds_long_edge() {
        let bytes = sample_jpeg();
        let img = decode_and_orient(&bytes).unwrap();
        let resized = fit_resize(&img, 16);
        assert!(resized.width().max(resized.height()) <= 16);
        // Aspect ratio preserved within rounding.
        assert_eq!(resized.width(), 16);
        assert_eq!(resized.height(), 8);
    }

    #[test]
    fn make_thumbnail_produces_jpeg_bytes() {
        let bytes = sample_jpeg();
        let pool = BufferPool::new();
        let jpeg = make_thumbnail(&bytes, 32, 80, &pool).unwrap();
        assert!(!jpeg.is_empty());
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]); // JPEG SOI marker
    }

    #[test]
    fn convert_to_webp_produces_riff_container() {
        let bytes = sample_jpeg();
        let pool = BufferPool::new();
        let webp = convert_to_webp(&bytes, 80, &pool).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(decode_and_orient(b"not an image"), Err(ImagePipelineError::Decode)));
    }

    #[test]
    fn orientation_transform_changes_dimensions_on_rotate90() {
        // A 64x32 source rotated 90 degrees should report 32x64.
        let bytes = sample_jpeg();
        let img = decode_and_orient(&bytes).unwrap();
        let rotated = apply_orientation(img, 8);
        assert_eq!((rotated.width(), rotated.height()), (32, 64));
    }

    #[test]
    fn buffer_pool_reuses_released_buffers() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(&[1, 2, 3, 4, 5]);
        }
        let buf = pool.acquire();
        assert!(buf.is_empty(), "acquired buffer must be cleared, not just reused raw");
    }
}
