//! Text-to-image rendering for the admin's "render as image" button.
//!
//! Pure function over the message text: fixed canvas, fixed colors, bundled
//! typeface, so the same text always produces byte-identical PNG output.
//! Long text overflows the canvas silently; there is no wrapping.

use ab_glyph::{FontRef, PxScale};
use anyhow::{Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

pub const WIDTH: u32 = 600;
pub const HEIGHT: u32 = 300;

const BACKGROUND: Rgb<u8> = Rgb([73, 109, 137]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_ORIGIN: (i32, i32) = (50, 120);
const FONT_SCALE: f32 = 24.0;

const FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws `text` onto the fixed canvas and returns PNG-encoded bytes.
pub fn render_message(text: &str) -> Result<Vec<u8>> {
    let font = FontRef::try_from_slice(FONT_BYTES).context("bundled font failed to parse")?;

    let mut canvas = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    draw_text_mut(
        &mut canvas,
        TEXT_COLOR,
        TEXT_ORIGIN.0,
        TEXT_ORIGIN.1,
        PxScale::from(FONT_SCALE),
        &font,
        text,
    );

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(canvas.as_raw(), WIDTH, HEIGHT, ExtendedColorType::Rgb8)
        .context("PNG encoding failed")?;
    Ok(png)
}
