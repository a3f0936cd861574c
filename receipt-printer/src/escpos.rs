//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. Text and command
//! bytes are kept as UTF-8 until [`EscPosBuilder::build`] converts them to
//! the printer's code page; binary blocks (raster images) bypass the
//! conversion.

use crate::encoding::TextEncoding;

enum Chunk {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

/// ESC/POS command builder
pub struct EscPosBuilder {
    chunks: Vec<Chunk>,
    buf: Vec<u8>,
    width: usize,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize) -> Self {
        let mut buf = Vec::with_capacity(1024);
        // Initialize printer (ESC @)
        buf.extend_from_slice(&[0x1B, 0x40]);
        Self {
            chunks: Vec::new(),
            buf,
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    // === Text Output ===

    /// Write raw text (converted at build time)
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x64, lines.min(0x7F)]);
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double height only
    pub fn double_height(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x01]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Separators ===

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Paper Control ===

    /// Full cut after feeding n lines (GS V 66 n)
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines.min(0x7F)]);
        self
    }

    /// Sound the buzzer `times` times for `duration` x 50ms (ESC B n t)
    pub fn buzzer(&mut self, times: u8, duration: u8) -> &mut Self {
        self.buf
            .extend_from_slice(&[0x1B, 0x42, times.clamp(1, 9), duration.clamp(1, 9)]);
        self
    }

    // === Binary blocks ===

    /// Append bytes that must reach the printer unconverted
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.flush_text();
        self.chunks.push(Chunk::Binary(bytes.to_vec()));
        self
    }

    fn flush_text(&mut self) {
        if !self.buf.is_empty() {
            self.chunks.push(Chunk::Text(std::mem::take(&mut self.buf)));
        }
    }

    // === Build ===

    /// Build the final byte buffer, converting text to the given code page
    pub fn build(mut self, encoding: TextEncoding) -> Vec<u8> {
        self.flush_text();
        let mut out = Vec::new();
        for chunk in self.chunks {
            match chunk {
                Chunk::Text(bytes) => out.extend_from_slice(&encoding.convert(&bytes)),
                Chunk::Binary(bytes) => out.extend_from_slice(&bytes),
            }
        }
        out
    }

    /// Build without any conversion (UTF-8 text, for inspection)
    pub fn build_raw(mut self) -> Vec<u8> {
        self.flush_text();
        let mut out = Vec::new();
        for chunk in self.chunks {
            match chunk {
                Chunk::Text(bytes) | Chunk::Binary(bytes) => out.extend_from_slice(&bytes),
            }
        }
        out
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(32)
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Rows per `GS v 0` block; some printers drop taller blocks
#[cfg(feature = "image")]
const RASTER_BAND_ROWS: u32 = 256;

/// Decode an image and return it as ESC/POS raster data
///
/// The image will be:
/// - Scaled down to fit `max_width` dots (never scaled up)
/// - Converted to 1-bit monochrome (transparent = white, luma < 128 = black)
/// - Encoded as one or more GS v 0 raster blocks
#[cfg(feature = "image")]
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn raster_image(bytes: &[u8], max_width: u32) -> crate::PrintResult<Vec<u8>> {
    use image::GenericImageView;

    let img = image::load_from_memory(bytes)
        .map_err(|e| crate::PrintError::Unrecoverable(format!("Image decode failed: {}", e)))?;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(crate::PrintError::Unrecoverable("Image has no pixels".to_string()));
    }

    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, ((h as f64 * ratio) as u32).max(1))
    } else {
        (w, h)
    };
    tracing::debug!(width = w, height = h, new_w, new_h, "rasterizing image");

    let rgba = img
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgba8();

    let x_bytes = new_w.div_ceil(8);
    let mut data = Vec::with_capacity((x_bytes * new_h) as usize + 16);

    let mut band_start = 0;
    while band_start < new_h {
        let band_rows = RASTER_BAND_ROWS.min(new_h - band_start);

        // GS v 0 m xL xH yL yH
        data.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
        data.push(x_bytes as u8);
        data.push((x_bytes >> 8) as u8);
        data.push(band_rows as u8);
        data.push((band_rows >> 8) as u8);

        for y in band_start..band_start + band_rows {
            for x_byte in 0..x_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x >= new_w {
                        break;
                    }
                    let pixel = rgba.get_pixel(x, y);
                    if pixel[3] < 128 {
                        continue;
                    }
                    let luma = (0.299 * pixel[0] as f32
                        + 0.587 * pixel[1] as f32
                        + 0.114 * pixel[2] as f32) as u8;
                    if luma < 128 {
                        byte |= 1 << (7 - bit);
                    }
                }
                data.push(byte);
            }
        }
        band_start += band_rows;
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let mut b = EscPosBuilder::new(32);
        b.center().bold().line("Title").bold_off().left().line("Body");

        let data = b.build_raw();
        assert!(data.starts_with(&[0x1B, 0x40]));
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("Title\n"));
        assert!(s.contains("Body\n"));
    }

    #[test]
    fn test_separator_uses_width() {
        let mut b = EscPosBuilder::new(10);
        b.sep_single();

        let s = String::from_utf8_lossy(&b.build_raw()).to_string();
        assert!(s.contains("----------\n"));
        assert!(!s.contains("-----------"));
    }

    #[test]
    fn test_binary_chunk_bypasses_conversion() {
        let mut b = EscPosBuilder::new(32);
        b.text("é").raw(&[0x1D, 0x76, 0x30, 0x00, 0xFF, 0x80]).text("é");

        let out = b.build(TextEncoding::Cp1252);
        // 0xFF 0x80 survive untouched between two converted text chunks
        let pos = out
            .windows(6)
            .position(|w| w == [0x1D, 0x76, 0x30, 0x00, 0xFF, 0x80])
            .unwrap();
        assert_eq!(out[pos - 1], 0xE9);
        assert_eq!(*out.last().unwrap(), 0xE9);
    }

    #[test]
    fn test_buzzer_and_cut_bytes() {
        let mut b = EscPosBuilder::new(32);
        b.buzzer(2, 4).cut_feed(3);
        let data = b.build_raw();
        assert!(data.ends_with(&[0x1B, 0x42, 2, 4, 0x1D, 0x56, 0x42, 3]));
    }

    #[cfg(feature = "image")]
    fn png_bytes(width: u32, height: u32, dark: bool) -> Vec<u8> {
        let value = if dark { 0 } else { 255 };
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([value, value, value, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_raster_black_square() {
        let data = raster_image(&png_bytes(16, 2, true), 384).unwrap();
        // header + 2 bytes per row x 2 rows, all black
        assert_eq!(&data[..8], &[0x1D, 0x76, 0x30, 0x00, 2, 0, 2, 0]);
        assert_eq!(&data[8..], &[0xFF; 4]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_raster_scales_down_to_dot_width() {
        let data = raster_image(&png_bytes(768, 10, false), 384).unwrap();
        // 384 dots = 48 bytes per row, height halved to 5
        assert_eq!(&data[..8], &[0x1D, 0x76, 0x30, 0x00, 48, 0, 5, 0]);
        assert!(data[8..].iter().all(|b| *b == 0));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_raster_splits_tall_images_into_bands() {
        let data = raster_image(&png_bytes(8, 300, true), 384).unwrap();
        assert_eq!(&data[..8], &[0x1D, 0x76, 0x30, 0x00, 1, 0, 0, 1]);
        let second = 8 + 256;
        assert_eq!(&data[second..second + 8], &[0x1D, 0x76, 0x30, 0x00, 1, 0, 44, 0]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_raster_rejects_garbage() {
        assert!(matches!(
            raster_image(b"definitely not an image", 384),
            Err(crate::PrintError::Unrecoverable(_))
        ));
    }
}
