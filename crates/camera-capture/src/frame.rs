//! Video frame types

use image::RgbImage;

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the source was opened)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u32,
    ) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(CameraError::Format(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        })
    }

    /// Wrap a decoded image
    pub fn from_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(idx..idx + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Copy the pixels into an image buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| CameraError::Format("frame buffer does not match dimensions".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(result, Err(CameraError::Format(_))));
    }

    #[test]
    fn test_get_pixel() {
        let mut data = vec![0u8; 2 * 2 * 3];
        data[9..12].copy_from_slice(&[10, 20, 30]);
        let frame = VideoFrame::new(data, 2, 2, 0, 0).unwrap();

        assert_eq!(frame.get_pixel(1, 1), Some([10, 20, 30]));
        assert_eq!(frame.get_pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.get_pixel(2, 0), None);
    }

    #[test]
    fn test_image_round_trip_keeps_dimensions() {
        let image = RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]));
        let frame = VideoFrame::from_image(image, 42, 7);
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.to_rgb_image().unwrap().get_pixel(5, 5).0, [1, 2, 3]);
    }
}
