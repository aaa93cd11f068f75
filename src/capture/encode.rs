//! Normalization of captured images.
//!
//! Every capture, whatever its source resolution or format, is resized to one
//! fixed resolution and quantized against one fixed uniform palette, then
//! written as an 8-bit indexed PNG. Identical screens therefore produce
//! identical bytes.

use image::imageops::{self, ColorMap, FilterType};
use image::{Rgb, RgbImage};
use std::time::Instant;
use tracing::debug;

use super::frame::{PixelFormat, RawFrame};
use super::RawCapture;
use crate::error::{GuidanceError, Result};
use crate::geometry::DisplayBounds;

/// Target of the normalize step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeSettings {
    pub width: u32,
    pub height: u32,
    /// Upper bound on the palette size
    pub colors: u16,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
            colors: 64,
        }
    }
}

impl From<&crate::config::CaptureConfig> for NormalizeSettings {
    fn from(config: &crate::config::CaptureConfig) -> Self {
        Self {
            width: config.target_width,
            height: config.target_height,
            colors: config.palette_colors,
        }
    }
}

/// Output of the normalize step
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Indexed PNG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Number of palette entries actually used by the encoder
    pub colors: u16,
}

/// Fixed palette with `levels` evenly spaced values per RGB channel.
///
/// 64 colors is 4 levels per channel. Sizes that are not cubes round down to
/// the largest cube that fits, with a floor of 8 (2 levels) and a ceiling of
/// 216 (6 levels) so indices fit an 8-bit PNG.
#[derive(Debug, Clone)]
pub struct UniformPalette {
    levels: u8,
    entries: Vec<Rgb<u8>>,
}

impl UniformPalette {
    pub fn new(max_colors: u16) -> Self {
        let max_colors = (max_colors as u32).min(256);
        let mut levels: u32 = 2;
        while (levels + 1).pow(3) <= max_colors {
            levels += 1;
        }
        let levels = levels as u8;

        let step = |i: u8| -> u8 { ((i as u16 * 255) / (levels as u16 - 1)) as u8 };
        let mut entries = Vec::with_capacity((levels as usize).pow(3));
        for r in 0..levels {
            for g in 0..levels {
                for b in 0..levels {
                    entries.push(Rgb([step(r), step(g), step(b)]));
                }
            }
        }

        Self { levels, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    /// Flat RGB triples for the PLTE chunk
    pub fn to_plte(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|c| c.0).collect()
    }

    fn quantize_channel(&self, value: u8) -> usize {
        let top = self.levels as u32 - 1;
        ((value as u32 * top + 127) / 255) as usize
    }
}

impl ColorMap for UniformPalette {
    type Color = Rgb<u8>;

    fn index_of(&self, color: &Rgb<u8>) -> usize {
        let l = self.levels as usize;
        let [r, g, b] = color.0;
        self.quantize_channel(r) * l * l + self.quantize_channel(g) * l + self.quantize_channel(b)
    }

    fn lookup(&self, index: usize) -> Option<Rgb<u8>> {
        self.entries.get(index).copied()
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Rgb<u8>) {
        let index = self.index_of(color);
        *color = self.entries[index];
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<RgbImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| GuidanceError::EncodeFailure(format!("failed to decode captured image: {}", e)))
}

fn decode(capture: RawCapture) -> Result<RgbImage> {
    match capture {
        RawCapture::Raw(frame) => frame.to_rgb_image(),
        RawCapture::Encoded(bytes) | RawCapture::Desktop(bytes) => decode_bytes(&bytes),
    }
}

/// Scale a desktop-space span onto image pixels, clamped to the image
fn scale_span(from: i64, to: i64, origin: i64, scale: f64, limit: u32) -> (u32, u32) {
    let start = ((from - origin) as f64 * scale).round().clamp(0.0, limit as f64) as u32;
    let end = ((to - origin) as f64 * scale).round().clamp(0.0, limit as f64) as u32;
    (start, end)
}

/// Cut `display` out of a screenshot of the whole `desktop`.
///
/// The screenshot may be at a different scale than desktop coordinates
/// (HiDPI); the crop rectangle is scaled to match.
pub fn crop_desktop(bytes: &[u8], desktop: &DisplayBounds, display: &DisplayBounds) -> Result<RawCapture> {
    let image = decode_bytes(bytes)?;
    let (img_w, img_h) = image.dimensions();
    if desktop.width == 0 || desktop.height == 0 || img_w == 0 || img_h == 0 {
        return Err(GuidanceError::EncodeFailure("desktop capture is empty".to_string()));
    }

    let scale_x = img_w as f64 / desktop.width as f64;
    let scale_y = img_h as f64 / desktop.height as f64;
    let (x0, x1) = scale_span(display.x as i64, display.right(), desktop.x as i64, scale_x, img_w);
    let (y0, y1) = scale_span(display.y as i64, display.bottom(), desktop.y as i64, scale_y, img_h);
    if x1 <= x0 || y1 <= y0 {
        return Err(GuidanceError::EncodeFailure(format!(
            "display {} lies outside the {}x{} desktop capture",
            display, img_w, img_h
        )));
    }

    let cropped = imageops::crop_imm(&image, x0, y0, x1 - x0, y1 - y0).to_image();
    // Alias: tracing's macros import `field::display`, which shadows a local named `display`.
    let shown_display = &display;
    debug!(
        "[Capture] Cropped {} out of {}x{} desktop capture ({}x{})",
        shown_display,
        img_w,
        img_h,
        cropped.width(),
        cropped.height()
    );

    let (width, height) = cropped.dimensions();
    Ok(RawCapture::Raw(RawFrame::new(cropped.into_raw(), width, height, PixelFormat::RGB24)))
}

fn write_indexed_png(indices: &[u8], width: u32, height: u32, palette: &UniformPalette) -> Result<Vec<u8>> {
    let encode_err = |e: png::EncodingError| GuidanceError::EncodeFailure(format!("PNG encoding failed: {}", e));

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette.to_plte());

        let mut writer = encoder.write_header().map_err(encode_err)?;
        writer.write_image_data(indices).map_err(encode_err)?;
        writer.finish().map_err(encode_err)?;
    }
    Ok(out)
}

/// Resize, quantize and encode a capture. CPU bound; call from a blocking context.
pub fn normalize(capture: RawCapture, settings: &NormalizeSettings) -> Result<EncodedImage> {
    if settings.width == 0 || settings.height == 0 {
        return Err(GuidanceError::EncodeFailure(format!(
            "invalid target resolution {}x{}",
            settings.width, settings.height
        )));
    }

    let started = Instant::now();
    let source = decode(capture)?;
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(GuidanceError::EncodeFailure("captured image is empty".to_string()));
    }

    let mut resized = if (src_w, src_h) == (settings.width, settings.height) {
        source
    } else {
        imageops::resize(&source, settings.width, settings.height, FilterType::Lanczos3)
    };

    let palette = UniformPalette::new(settings.colors);
    imageops::dither(&mut resized, &palette);
    let indices = imageops::index_colors(&resized, &palette);

    let data = write_indexed_png(indices.as_raw(), settings.width, settings.height, &palette)?;

    debug!(
        "[Capture] Normalized {}x{} -> {}x{} ({} colors, {} bytes) in {:?}",
        src_w,
        src_h,
        settings.width,
        settings.height,
        palette.len(),
        data.len(),
        started.elapsed()
    );

    Ok(EncodedImage {
        data,
        width: settings.width,
        height: settings.height,
        colors: palette.len() as u16,
    })
}

/// Hex blake3 digest of encoded bytes
pub fn digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8]))
    }

    fn small() -> NormalizeSettings {
        NormalizeSettings {
            width: 64,
            height: 36,
            colors: 64,
        }
    }

    fn png_info(bytes: &[u8]) -> (u32, u32, png::ColorType, usize) {
        let decoder = png::Decoder::new(Cursor::new(bytes));
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        let palette_len = info.palette.as_ref().map(|p| p.len() / 3).unwrap_or(0);
        (info.width, info.height, info.color_type, palette_len)
    }

    #[test]
    fn palette_sizes() {
        assert_eq!(UniformPalette::new(64).len(), 64);
        assert_eq!(UniformPalette::new(64).levels(), 4);
        assert_eq!(UniformPalette::new(256).len(), 216);
        assert_eq!(UniformPalette::new(2).len(), 8);
    }

    #[test]
    fn palette_maps_extremes_exactly() {
        let palette = UniformPalette::new(64);
        let mut black = Rgb([0, 0, 0]);
        let mut white = Rgb([255, 255, 255]);
        palette.map_color(&mut black);
        palette.map_color(&mut white);
        assert_eq!(black, Rgb([0, 0, 0]));
        assert_eq!(white, Rgb([255, 255, 255]));
        assert_eq!(palette.index_of(&Rgb([255, 255, 255])), 63);
        assert_eq!(palette.lookup(0), Some(Rgb([0, 0, 0])));
    }

    #[test]
    fn raw_capture_becomes_indexed_png() {
        let src = gradient(200, 120);
        let mut rgba = Vec::new();
        for px in src.pixels() {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        let raw = RawCapture::Raw(RawFrame::new(rgba, 200, 120, PixelFormat::RGBA));

        let encoded = normalize(raw, &small()).unwrap();
        assert_eq!((encoded.width, encoded.height, encoded.colors), (64, 36, 64));

        let (w, h, color, palette_len) = png_info(&encoded.data);
        assert_eq!((w, h), (64, 36));
        assert_eq!(color, png::ColorType::Indexed);
        assert!(palette_len <= 64);
    }

    #[test]
    fn encoded_and_raw_inputs_normalize_identically() {
        let src = gradient(128, 72);

        let mut png_bytes = Vec::new();
        image::DynamicImage::ImageRgb8(src.clone())
            .write_to(&mut Cursor::new(&mut png_bytes), image::ImageOutputFormat::Png)
            .unwrap();

        let from_encoded = normalize(RawCapture::Encoded(png_bytes), &small()).unwrap();
        let from_raw = normalize(
            RawCapture::Raw(RawFrame::new(src.into_raw(), 128, 72, PixelFormat::RGB24)),
            &small(),
        )
        .unwrap();

        assert_eq!(digest(&from_encoded.data), digest(&from_raw.data));
    }

    #[test]
    fn same_input_same_bytes() {
        let a = normalize(RawCapture::Raw(RawFrame::new(gradient(90, 50).into_raw(), 90, 50, PixelFormat::RGB24)), &small()).unwrap();
        let b = normalize(RawCapture::Raw(RawFrame::new(gradient(90, 50).into_raw(), 90, 50, PixelFormat::RGB24)), &small()).unwrap();
        assert_eq!(a.data, b.data);
    }

    fn encode_png(image: RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn crop_to_image(capture: RawCapture) -> RgbImage {
        match capture {
            RawCapture::Raw(frame) => frame.to_rgb_image().unwrap(),
            other => panic!("expected raw pixels, got {} encoded bytes", other.len()),
        }
    }

    #[test]
    fn desktop_capture_is_cropped_to_display() {
        // Two displays side by side; the right one is shorter
        let desktop = DisplayBounds::new(0, 0, 30, 10);
        let right = DisplayBounds::new(20, 0, 10, 8);
        let shot = RgbImage::from_fn(30, 10, |x, _| if x >= 20 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });

        let cropped = crop_to_image(crop_desktop(&encode_png(shot.clone()), &desktop, &right).unwrap());
        assert_eq!(cropped.dimensions(), (10, 8));
        assert!(cropped.pixels().all(|p| p.0 == [255, 255, 255]));

        let left = DisplayBounds::new(0, 0, 20, 10);
        let cropped = crop_to_image(crop_desktop(&encode_png(shot), &desktop, &left).unwrap());
        assert_eq!(cropped.dimensions(), (20, 10));
        assert!(cropped.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn hidpi_desktop_capture_scales_crop() {
        let desktop = DisplayBounds::new(-10, 0, 30, 10);
        let right = DisplayBounds::new(10, 0, 10, 8);
        let shot = RgbImage::from_fn(60, 20, |x, _| if x >= 40 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });

        let cropped = crop_to_image(crop_desktop(&encode_png(shot), &desktop, &right).unwrap());
        assert_eq!(cropped.dimensions(), (20, 16));
        assert!(cropped.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn display_outside_desktop_capture_fails() {
        let desktop = DisplayBounds::new(0, 0, 30, 10);
        let shot = encode_png(RgbImage::new(30, 10));
        let err = crop_desktop(&shot, &desktop, &DisplayBounds::new(500, 0, 10, 10)).unwrap_err();
        assert!(matches!(err, GuidanceError::EncodeFailure(_)));
    }

    #[test]
    fn palette_size_is_capped_for_indexed_png() {
        assert_eq!(UniformPalette::new(u16::MAX).len(), 216);
        assert_eq!(UniformPalette::new(64_000).levels(), 6);
    }

    #[test]
    fn garbage_bytes_fail_to_encode() {
        let err = normalize(RawCapture::Encoded(vec![1, 2, 3, 4]), &small()).unwrap_err();
        assert!(matches!(err, GuidanceError::EncodeFailure(_)));
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = digest(b"screen");
        assert_eq!(d.len(), 64);
        assert_eq!(d, digest(b"screen"));
        assert_ne!(d, digest(b"screen2"));
    }
}
