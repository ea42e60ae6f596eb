//! Synthetic placeholder frames
//!
//! Drawn whenever no device frame is available: a black canvas with a label
//! and the current time, rendered with a built-in 5x7 bitmap font so no font
//! files are needed at runtime.

use chrono::{Local, NaiveTime, Timelike};
use image::{Rgb, RgbImage};

use crate::types::Frame;

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

const LABEL: &str = "Camera Stream";
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Placeholder frame stamped with the current local time.
pub fn placeholder_frame() -> Frame {
    Frame::placeholder(render_placeholder(Local::now().time()))
}

/// Render the placeholder canvas for `time`.
pub fn render_placeholder(time: NaiveTime) -> RgbImage {
    let mut canvas = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);

    draw_centered(&mut canvas, LABEL, 180, 4, WHITE);

    let clock = format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second());
    draw_centered(&mut canvas, &clock, 250, 3, GREEN);

    canvas
}

fn draw_centered(canvas: &mut RgbImage, text: &str, top: u32, scale: u32, color: Rgb<u8>) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    let width = (text.chars().count() as u32 * advance).saturating_sub(scale);
    let left = canvas.width().saturating_sub(width) / 2;

    for (i, ch) in text.chars().enumerate() {
        draw_glyph(canvas, glyph(ch), left + i as u32 * advance, top, scale, color);
    }
}

fn draw_glyph(canvas: &mut RgbImage, rows: [u8; 7], left: u32, top: u32, scale: u32, color: Rgb<u8>) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            let x0 = left + col * scale;
            let y0 = top + row as u32 * scale;
            for y in y0..y0 + scale {
                for x in x0..x0 + scale {
                    if x < canvas.width() && y < canvas.height() {
                        canvas.put_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

// Rows top to bottom, low five bits left to right. Lowercase letters without
// their own glyph borrow the capital.
fn glyph(ch: char) -> [u8; GLYPH_HEIGHT as usize] {
    match ch {
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        lower if lower.is_ascii_lowercase() => glyph(lower.to_ascii_uppercase()),
        _ => [0; 7],
    }
}
