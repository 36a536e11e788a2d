//! JPEG encoding for the live stream

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::{CameraError, VideoFrame};

/// Encodes frames to baseline JPEG
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, CameraError> {
        let mut buf = Vec::with_capacity(frame.data.len() / 8);
        ImageJpegEncoder::new_with_quality(&mut buf, self.quality)
            .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FrameSource, SyntheticSource};

    #[test]
    fn test_encode_produces_jpeg() {
        let frame = SyntheticSource::new(64, 48).read_frame().unwrap();
        let jpeg = JpegEncoder::default().encode(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0).quality(), 1);
        assert_eq!(JpegEncoder::new(250).quality(), 100);
    }
}
