use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const RGB3: &[u8; 4] = b"RGB3";
const YUYV: &[u8; 4] = b"YUYV";
const GREY: &[u8; 4] = b"GREY";

/// V4L2 capture device. The stream is released when the camera is dropped.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    /// Open `device` and request `width`x`height`. The driver may pick a
    /// different size; the negotiated one is logged and used.
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        let dev = Device::with_path(device).with_context(|| format!("open camera {}", device))?;
        let current = dev.format().context("get format")?;

        let mut fmt = dev
            .set_format(&Format::new(width, height, FourCC::new(RGB3)))
            .unwrap_or(current);
        if fmt.fourcc != FourCC::new(RGB3) {
            fmt = dev
                .set_format(&Format::new(width, height, FourCC::new(YUYV)))
                .unwrap_or(fmt);
        }
        if (fmt.width, fmt.height) != (width, height) {
            log::warn!(
                "camera {} negotiated {}x{} instead of {}x{}",
                device,
                fmt.width,
                fmt.height,
                width,
                height
            );
        }

        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {} streaming {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    /// Capture the next frame, converted to RGB.
    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::trace!("frame seq={} len={}", meta.sequence, data.len());

        let rgb = match &self.fourcc.repr {
            f if f == RGB3 => data.to_vec(),
            f if f == YUYV => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == GREY => grey_to_rgb(self.width, self.height, data)?,
            _ => anyhow::bail!("unsupported pixel format {:?}", self.fourcc),
        };
        to_image(self.width, self.height, rgb)
    }
}

fn to_image(width: u32, height: u32, mut rgb: Vec<u8>) -> Result<RgbImage> {
    let expected = (width * height * 3) as usize;
    if rgb.len() < expected {
        anyhow::bail!("short frame: got {} bytes, expected {}", rgb.len(), expected);
    }
    rgb.truncate(expected);
    RgbImage::from_raw(width, height, rgb).context("building frame buffer")
}

pub fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

pub fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        anyhow::bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}
