//! Image → tensor preprocessing shared by the detectors and the encoder.

use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::Array4;

/// Channel order expected by a model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Square letterbox placement of an image on a model canvas.
///
/// Keeps the aspect ratio, centres the resized image and remembers the
/// scale and padding so model coordinates can be mapped back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let max_dim = width.max(height).max(1);
        let scale = size as f32 / max_dim as f32;
        let new_w = ((width as f32 * scale) as u32).min(size);
        let new_h = ((height as f32 * scale) as u32).min(size);
        Self {
            size,
            scale,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
        }
    }

    /// Render `img` onto a `size`×`size` canvas filled with `fill`.
    pub fn apply(&self, img: &RgbImage, fill: u8) -> RgbImage {
        let new_w = ((img.width() as f32 * self.scale) as u32).clamp(1, self.size);
        let new_h = ((img.height() as f32 * self.scale) as u32).clamp(1, self.size);
        let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([fill, fill, fill]));
        image::imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Map a canvas x coordinate back to the source image.
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.pad_x as f32) / self.scale
    }

    /// Map a canvas y coordinate back to the source image.
    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.pad_y as f32) / self.scale
    }
}

/// Pack an RGB image as a `[1, 3, H, W]` tensor, multiplying each value by `scale`.
pub fn to_nchw(img: &RgbImage, order: ChannelOrder, scale: f32) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b] = px.0;
        let (c0, c2) = match order {
            ChannelOrder::Rgb => (r, b),
            ChannelOrder::Bgr => (b, r),
        };
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = c0 as f32 * scale;
        tensor[[0, 1, y, x]] = g as f32 * scale;
        tensor[[0, 2, y, x]] = c2 as f32 * scale;
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_centres_landscape_frames() {
        let lb = Letterbox::fit(640, 480, 640);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 80);
        assert!((lb.scale - 1.0).abs() < 1e-6);
        assert!((lb.unmap_y(80.0)).abs() < 1e-6);
    }

    #[test]
    fn letterbox_round_trips_coordinates() {
        let lb = Letterbox::fit(1280, 720, 640);
        let x = 400.0;
        let canvas_x = x * lb.scale + lb.pad_x as f32;
        assert!((lb.unmap_x(canvas_x) - x).abs() < 1e-3);
    }

    #[test]
    fn nchw_respects_channel_order() {
        let img = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let rgb = to_nchw(&img, ChannelOrder::Rgb, 1.0);
        let bgr = to_nchw(&img, ChannelOrder::Bgr, 1.0);
        assert_eq!(rgb.shape(), &[1, 3, 1, 2]);
        assert_eq!(rgb[[0, 0, 0, 1]], 10.0);
        assert_eq!(bgr[[0, 0, 0, 1]], 30.0);
        assert_eq!(bgr[[0, 2, 0, 0]], 10.0);
    }
}
