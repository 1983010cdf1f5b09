use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Image bytes ready to be embedded in a data URL.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Decodes a bare base64 string or a `data:<mime>;base64,<payload>` URL.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, ImageError> {
    let encoded = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let format = sniff_format(bytes).ok_or(ImageError::UnknownFormat)?;
    Ok(image::load_from_memory_with_format(bytes, format)?)
}

/// Boosts contrast and sharpness; a factor of 1.0 leaves the image as is.
/// Contrast is stretched around mid-grey by exactly `factor`.
pub fn enhance(image: &DynamicImage, factor: f32) -> DynamicImage {
    if !(factor.is_finite() && factor > 0.0) || factor == 1.0 {
        return image.clone();
    }
    let enhanced = image.adjust_contrast(contrast_percent(factor));
    if factor > 1.0 {
        enhanced.unsharpen((factor - 1.0) * 2.0, 1)
    } else {
        enhanced
    }
}

/// `adjust_contrast(c)` scales by `((100 + c) / 100)^2`; invert that.
fn contrast_percent(factor: f32) -> f32 {
    (factor.sqrt() - 1.0) * 100.0
}

/// Keeps small images in a format the chat API accepts untouched; anything
/// larger than `max_dimension` or in another format is re-encoded as JPEG.
pub fn prepare_for_upload(bytes: &[u8], max_dimension: u32) -> Result<EncodedImage, ImageError> {
    let format = sniff_format(bytes).ok_or(ImageError::UnknownFormat)?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;

    let passthrough = matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif
    );
    if passthrough && width <= max_dimension && height <= max_dimension {
        return Ok(EncodedImage {
            bytes: bytes.to_vec(),
            mime_type: format.to_mime_type(),
        });
    }

    let mut image = image::load_from_memory_with_format(bytes, format)?;
    if width > max_dimension || height > max_dimension {
        log::debug!(
            "Downscaling {}x{} image to fit {}px before upload",
            width,
            height,
            max_dimension
        );
        image = image.resize(max_dimension, max_dimension, FilterType::Triangle);
    }
    Ok(EncodedImage {
        bytes: encode_jpeg(&image)?,
        mime_type: ImageFormat::Jpeg.to_mime_type(),
    })
}

pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
    Ok(buffer)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn strips_data_url_prefix() {
        let png = png_bytes(4, 4);
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        assert_eq!(decode_base64_payload(&url).unwrap(), png);
        assert_eq!(decode_base64_payload(&STANDARD.encode(&png)).unwrap(), png);
    }

    #[test]
    fn tolerates_wrapped_base64() {
        let png = png_bytes(4, 4);
        let encoded = STANDARD.encode(&png);
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{}\n{}", head, tail);
        assert_eq!(decode_base64_payload(&wrapped).unwrap(), png);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_base64_payload("data:image/png;base64,@@@"),
            Err(ImageError::Base64(_))
        ));
    }

    #[test]
    fn decode_rejects_non_images() {
        assert!(matches!(decode(b"plain text"), Err(ImageError::UnknownFormat)));
        let image = decode(&png_bytes(8, 6)).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
    }

    #[test]
    fn contrast_multiplier_matches_factor() {
        for factor in [0.5f32, 1.5, 2.0] {
            let scale = ((100.0 + contrast_percent(factor)) / 100.0).powi(2);
            assert!((scale - factor).abs() < 1e-5, "factor {}", factor);
        }

        let grey = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([64, 64, 64])));
        let enhanced = enhance(&grey, 1.5).to_rgb8();
        // (64 / 255 - 0.5) * 1.5 + 0.5 of full scale
        let value = enhanced.get_pixel(8, 8)[0];
        assert!((31..=33).contains(&value), "got {}", value);
    }

    #[test]
    fn enhance_keeps_dimensions() {
        let image = decode(&png_bytes(16, 9)).unwrap();
        let enhanced = enhance(&image, 1.5);
        assert_eq!((enhanced.width(), enhanced.height()), (16, 9));
        assert_eq!(enhance(&image, 1.0), image);
    }

    #[test]
    fn small_images_pass_through() {
        let png = png_bytes(32, 32);
        let prepared = prepare_for_upload(&png, 64).unwrap();
        assert_eq!(prepared.mime_type, "image/png");
        assert_eq!(prepared.bytes, png);
        assert!(prepared.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn large_images_are_downscaled_to_jpeg() {
        let prepared = prepare_for_upload(&png_bytes(200, 100), 50).unwrap();
        assert_eq!(prepared.mime_type, "image/jpeg");
        let image = decode(&prepared.bytes).unwrap();
        assert_eq!((image.width(), image.height()), (50, 25));
    }
}
