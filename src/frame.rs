//! Image transport decoding.
//!
//! Clients send a base64 image, optionally wrapped as a `data:` URL. The
//! encoded form is kept alongside the decoded pixels because the secondary
//! inference path forwards the original payload, not re-encoded pixels.

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use image::GenericImageView;
use sha2::{Digest, Sha256};

/// Hard cap on decoded image bytes accepted from a client.
pub const MAX_IMAGE_BYTES: usize = 12 * 1024 * 1024;

/// Base64 image payload with any `data:` URL prefix removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    base64: String,
}

impl EncodedImage {
    /// Accept a payload as received from a client.
    pub fn from_transport(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let payload = match trimmed.split_once(',') {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => trimmed,
        };
        if payload.is_empty() {
            return Err(anyhow!("No image provided"));
        }
        Ok(Self {
            base64: payload.to_string(),
        })
    }

    /// Wrap already-encoded file bytes (JPEG, PNG).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    /// Short digest used to correlate log lines for one request.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.base64.as_bytes());
        hex::encode(&hash[..8])
    }

    /// Decode to an RGB pixel grid.
    pub fn decode(&self) -> Result<DecodedImage> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.base64.as_bytes())
            .context("image payload is not valid base64")?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(anyhow!(
                "image payload too large: {} bytes (max {})",
                bytes.len(),
                MAX_IMAGE_BYTES
            ));
        }
        let image = image::load_from_memory(&bytes).context("failed to decode image")?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("image has zero area"));
        }
        let rgb = image.into_rgb8();
        DecodedImage::from_rgb(rgb.into_raw(), width, height)
    }
}

/// Decoded image in packed RGB24 order, row-major.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl DecodedImage {
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB image length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Resample to `width` x `height` for fixed-input models.
    pub fn resized(&self, width: u32, height: u32) -> Result<DecodedImage> {
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let buffer = image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("RGB buffer does not match dimensions"))?;
        let resized =
            image::imageops::resize(&buffer, width, height, image::imageops::FilterType::Triangle);
        DecodedImage::from_rgb(resized.into_raw(), width, height)
    }
}
