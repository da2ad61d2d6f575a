use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Draw a `thickness`-pixel box over `[x1, y1, x2, y2]`, clipped to the image.
pub fn draw_box(img: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let x1 = bbox[0].max(0.0).round() as i32;
    let y1 = bbox[1].max(0.0).round() as i32;
    let x2 = bbox[2].min(w as f32).round() as i32;
    let y2 = bbox[3].min(h as f32).round() as i32;

    for t in 0..thickness as i32 {
        let bw = x2 - x1 - 2 * t;
        let bh = y2 - y1 - 2 * t;
        if bw <= 0 || bh <= 0 {
            break;
        }
        draw_hollow_rect_mut(img, Rect::at(x1 + t, y1 + t).of_size(bw as u32, bh as u32), color);
    }
}

/// Height of a glyph at scale 1; glyphs are 3 pixels wide with 1 pixel of spacing.
const GLYPH_HEIGHT: u32 = 5;
const GLYPH_ADVANCE: u32 = 4;

fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        ' ' => [0b000; 5],
        _ => [0b111, 0b001, 0b010, 0b000, 0b010],
    }
}

/// Pixel size of `text` drawn at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let n = text.chars().count() as u32;
    (n * GLYPH_ADVANCE * scale, GLYPH_HEIGHT * scale)
}

/// Draw `text` with its top-left corner at (`x`, `y`). Pixels off the image are dropped.
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let scale = scale.max(1) as i32;
    let mut cursor = x;
    for ch in text.chars() {
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..3 {
                if (bits >> (2 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = cursor + col * scale + dx;
                        let py = y + row as i32 * scale + dy;
                        if px >= 0 && py >= 0 && px < w && py < h {
                            img.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE as i32 * scale;
    }
}

/// Label a `[x1, y1, x2, y2]` box: above its top edge, or just inside it
/// when there is no room above.
pub fn draw_label(img: &mut RgbImage, bbox: [f32; 4], text: &str, color: Rgb<u8>, scale: u32) {
    let (_, text_h) = text_size(text, scale);
    let x = bbox[0].max(0.0).round() as i32;
    let top = bbox[1].max(0.0).round() as i32;
    let above = top - text_h as i32 - 2;
    let y = if above >= 0 { above } else { top + 2 };
    draw_text(img, x, y, text, color, scale);
}
