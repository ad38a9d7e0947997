//! Frame transformation and encoding utilities.

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use super::types::{Frame, FrameFormat};

/// Highest JPEG quality accepted by the encoder.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Encode a frame as a baseline JPEG still image.
///
/// `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let quality = quality.clamp(1, MAX_JPEG_QUALITY);
    let color_type = match frame.format {
        FrameFormat::Rgb => ColorType::Rgb8,
    };

    let mut buffer = Vec::with_capacity(frame.data.len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality).encode(
        &frame.data,
        frame.width,
        frame.height,
        color_type,
    )?;
    Ok(buffer)
}

/// Mirror a frame horizontally (flip left-right).
pub fn mirror_horizontal(frame: &mut Frame) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let bpp = frame.bytes_per_pixel();

    for y in 0..height {
        let row_start = y * width * bpp;
        let row = &mut frame.data[row_start..row_start + width * bpp];

        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}

/// Draw an axis-aligned rectangle outline into the frame.
///
/// Coordinates are clipped to the frame; a rectangle entirely outside the
/// frame draws nothing.
pub fn draw_rect_outline(
    frame: &mut Frame,
    (x1, y1): (i64, i64),
    (x2, y2): (i64, i64),
    color: [u8; 3],
    thickness: u32,
) {
    let width = frame.width as i64;
    let height = frame.height as i64;
    if width == 0 || height == 0 {
        return;
    }

    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));
    if right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }

    let t = thickness.max(1) as i64;
    for y in top.max(0)..=bottom.min(height - 1) {
        for x in left.max(0)..=right.min(width - 1) {
            let on_edge = x - left < t || right - x < t || y - top < t || bottom - y < t;
            if on_edge {
                set_pixel(frame, x as usize, y as usize, color);
            }
        }
    }
}

fn set_pixel(frame: &mut Frame, x: usize, y: usize, color: [u8; 3]) {
    let bpp = frame.bytes_per_pixel();
    let offset = (y * frame.width as usize + x) * bpp;
    frame.data[offset..offset + 3].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame::from_rgb(width, height, data).unwrap()
    }

    #[test]
    fn test_mirror_horizontal_2x1() {
        let mut frame = rgb_frame(2, 1, vec![1, 2, 3, 4, 5, 6]);
        mirror_horizontal(&mut frame);
        assert_eq!(frame.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_mirror_horizontal_odd_width_keeps_center() {
        let mut frame = rgb_frame(3, 1, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
        mirror_horizontal(&mut frame);
        assert_eq!(frame.data, vec![3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_markers() {
        let frame = rgb_frame(8, 8, vec![128; 8 * 8 * 3]);
        let jpeg = encode_jpeg(&frame, 100).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_clamps_zero_quality() {
        let frame = rgb_frame(4, 4, vec![10; 4 * 4 * 3]);
        assert!(encode_jpeg(&frame, 0).is_ok());
    }

    #[test]
    fn test_draw_rect_outline_leaves_interior() {
        let mut frame = rgb_frame(5, 5, vec![0; 5 * 5 * 3]);
        draw_rect_outline(&mut frame, (0, 0), (4, 4), [255, 0, 0], 1);

        let pixel = |f: &Frame, x: usize, y: usize| {
            let o = (y * 5 + x) * 3;
            [f.data[o], f.data[o + 1], f.data[o + 2]]
        };
        assert_eq!(pixel(&frame, 0, 0), [255, 0, 0]);
        assert_eq!(pixel(&frame, 4, 2), [255, 0, 0]);
        assert_eq!(pixel(&frame, 2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_draw_rect_outline_clips_to_frame() {
        let mut frame = rgb_frame(4, 4, vec![0; 4 * 4 * 3]);
        draw_rect_outline(&mut frame, (-10, -10), (100, 100), [0, 255, 0], 1);
        draw_rect_outline(&mut frame, (50, 50), (60, 60), [0, 0, 255], 1);
        assert!(!frame.data.chunks(3).any(|p| p == [0, 0, 255]));
    }
}
