//! Bit-plane decomposition
//!
//! Splits an image into one black/white picture per (channel, bit) pair:
//! a pixel is white when that bit of that channel's sample is set. Planes are
//! emitted channel by channel in native order, bits from 7 (MSB) down to 0,
//! so an RGB image yields 24 planes and RGBA yields 32.
//!
//! Palette images come out of the decoder already expanded; 16-bit and float
//! images are narrowed to 8 bits per channel before extraction.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

/// Bits per extracted channel sample
pub const BITS_PER_SAMPLE: u8 = 8;

const WHITE: u8 = 255;
const BLACK: u8 = 0;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot identify image: {0}")]
    UnsupportedFormat(String),

    #[error("cannot encode bit-plane: {0}")]
    Encode(String),
}

/// A colour channel of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Gray,
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Gray => "Gray",
            Channel::Red => "Red",
            Channel::Green => "Green",
            Channel::Blue => "Blue",
            Channel::Alpha => "Alpha",
        }
    }
}

const GRAY: &[Channel] = &[Channel::Gray];
const GRAY_ALPHA: &[Channel] = &[Channel::Gray, Channel::Alpha];
const RGB: &[Channel] = &[Channel::Red, Channel::Green, Channel::Blue];
const RGBA: &[Channel] = &[Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];

/// One bit of one channel across every pixel
#[derive(Debug, Clone)]
pub struct BitPlane {
    pub channel: Channel,
    pub bit: u8,
    pub image: GrayImage,
}

impl BitPlane {
    /// Artifact-name suffix, e.g. `Red_7.png`
    pub fn file_suffix(&self) -> String {
        format!("{}_{}.png", self.channel.name(), self.bit)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, DecodeError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| DecodeError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

/// Interleaved 8-bit samples of a decoded image
struct Samples {
    width: u32,
    height: u32,
    channels: &'static [Channel],
    data: Vec<u8>,
}

impl Samples {
    fn from_image(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let color = img.color();

        let (channels, data) = match (color.channel_count(), color.has_alpha()) {
            (1, _) => (GRAY, img.into_luma8().into_raw()),
            (2, _) => (GRAY_ALPHA, img.into_luma_alpha8().into_raw()),
            (_, true) => (RGBA, img.into_rgba8().into_raw()),
            _ => (RGB, img.into_rgb8().into_raw()),
        };

        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Bit `bit` of channel `index` for every pixel, as a black/white image
    fn plane(&self, index: usize, bit: u8) -> GrayImage {
        let stride = self.channels.len();
        let mask = 1u8 << bit;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let offset = (y as usize * self.width as usize + x as usize) * stride + index;
            if self.data[offset] & mask != 0 {
                Luma([WHITE])
            } else {
                Luma([BLACK])
            }
        })
    }
}

/// A decoded image whose bit-planes can be produced one at a time.
///
/// Only the 8-bit samples are held; each plane is built when the iterator
/// reaches it, so a caller that encodes and drops planes as it goes keeps a
/// single plane alive instead of `channels × 8`.
pub struct DecodedImage {
    samples: Samples,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.samples.width, self.samples.height)
    }

    pub fn channels(&self) -> &'static [Channel] {
        self.samples.channels
    }

    /// Number of planes `planes()` yields
    pub fn plane_count(&self) -> usize {
        self.samples.channels.len() * BITS_PER_SAMPLE as usize
    }

    /// Planes in channel order, bits 7 down to 0 within each channel
    pub fn planes(&self) -> impl ExactSizeIterator<Item = BitPlane> + '_ {
        let per_channel = BITS_PER_SAMPLE as usize;
        (0..self.plane_count()).map(move |n| {
            let index = n / per_channel;
            let bit = BITS_PER_SAMPLE - 1 - (n % per_channel) as u8;
            BitPlane {
                channel: self.samples.channels[index],
                bit,
                image: self.samples.plane(index, bit),
            }
        })
    }
}

/// Decode `data` into 8-bit samples. Fails as a whole on anything the
/// decoder rejects, before any plane exists.
pub fn decode(data: &[u8]) -> Result<DecodedImage, DecodeError> {
    let img = image::load_from_memory(data).map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
    Ok(DecodedImage {
        samples: Samples::from_image(img),
    })
}

/// Decode `data` and split it into `channels × 8` bit-planes.
pub fn decompose(data: &[u8]) -> Result<Vec<BitPlane>, DecodeError> {
    Ok(decode(data)?.planes().collect())
}

/// Rebuild per-channel samples by OR-ing the bits of every plane back together.
///
/// Channels come back in the order they first appear in `planes`.
pub fn reconstruct(planes: &[BitPlane]) -> Vec<(Channel, Vec<u8>)> {
    let mut channels: Vec<(Channel, Vec<u8>)> = Vec::new();

    for plane in planes {
        let position = match channels.iter().position(|(channel, _)| *channel == plane.channel) {
            Some(position) => position,
            None => {
                channels.push((plane.channel, vec![0u8; plane.image.as_raw().len()]));
                channels.len() - 1
            }
        };

        let samples = &mut channels[position].1;
        for (sample, &pixel) in samples.iter_mut().zip(plane.image.as_raw()) {
            if pixel == WHITE {
                *sample |= 1 << plane.bit;
            }
        }
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn sample_rgb() -> RgbImage {
        RgbImage::from_fn(7, 5, |x, y| Rgb([(x * 37 + y) as u8, (y * 51) as u8, (x ^ y) as u8 * 29]))
    }

    #[test]
    fn test_rgb_yields_24_planes_in_order() {
        let bytes = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Png);
        let planes = decompose(&bytes).unwrap();

        assert_eq!(planes.len(), 24);
        let order: Vec<(Channel, u8)> = planes.iter().map(|p| (p.channel, p.bit)).collect();
        let mut expected = Vec::new();
        for channel in [Channel::Red, Channel::Green, Channel::Blue] {
            for bit in (0..8).rev() {
                expected.push((channel, bit));
            }
        }
        assert_eq!(order, expected);
        assert_eq!(planes[0].file_suffix(), "Red_7.png");
        assert_eq!(planes[23].file_suffix(), "Blue_0.png");
    }

    #[test]
    fn test_planes_are_binary_and_round_trip() {
        let source = sample_rgb();
        let bytes = encode(DynamicImage::ImageRgb8(source.clone()), ImageFormat::Png);
        let planes = decompose(&bytes).unwrap();

        for plane in &planes {
            assert_eq!(plane.image.dimensions(), (7, 5));
            assert!(plane.image.as_raw().iter().all(|&p| p == WHITE || p == BLACK));
        }

        let rebuilt = reconstruct(&planes);
        assert_eq!(rebuilt.len(), 3);
        let raw = source.into_raw();
        for (index, (_, samples)) in rebuilt.iter().enumerate() {
            let original: Vec<u8> = raw.iter().skip(index).step_by(3).copied().collect();
            assert_eq!(samples, &original);
        }
    }

    #[test]
    fn test_single_pixel_bits() {
        let img = RgbImage::from_pixel(1, 1, Rgb([0b1000_0001, 0, 0xFF]));
        let planes = decompose(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();

        let red: Vec<u8> = planes[..8].iter().map(|p| p.image.as_raw()[0]).collect();
        assert_eq!(red, vec![WHITE, BLACK, BLACK, BLACK, BLACK, BLACK, BLACK, WHITE]);
        assert!(planes[8..16].iter().all(|p| p.image.as_raw()[0] == BLACK));
        assert!(planes[16..].iter().all(|p| p.image.as_raw()[0] == WHITE));
    }

    #[test]
    fn test_gray_and_gray_alpha_channel_counts() {
        let gray = GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 60 + y) as u8]));
        let planes = decompose(&encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png)).unwrap();
        assert_eq!(planes.len(), 8);
        assert!(planes.iter().all(|p| p.channel == Channel::Gray));

        let gray_alpha = GrayAlphaImage::from_fn(4, 4, |x, y| LumaA([(x * 60) as u8, (y * 60) as u8]));
        let planes = decompose(&encode(DynamicImage::ImageLumaA8(gray_alpha), ImageFormat::Png)).unwrap();
        assert_eq!(planes.len(), 16);
        assert_eq!(planes[8].channel, Channel::Alpha);
    }

    #[test]
    fn test_alpha_channel_gets_planes() {
        let img = RgbaImage::from_fn(3, 3, |x, y| Rgba([x as u8, y as u8, 7, (x * y * 20) as u8]));
        let source = img.clone().into_raw();
        let planes = decompose(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)).unwrap();

        assert_eq!(planes.len(), 32);
        let rebuilt = reconstruct(&planes);
        assert_eq!(rebuilt[3].0, Channel::Alpha);
        let alpha: Vec<u8> = source.iter().skip(3).step_by(4).copied().collect();
        assert_eq!(rebuilt[3].1, alpha);
    }

    #[test]
    fn test_palette_gif_is_expanded() {
        let img = RgbaImage::from_fn(4, 4, |x, _| if x % 2 == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) });
        let planes = decompose(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Gif)).unwrap();
        assert_eq!(planes.len(), 32);
    }

    #[test]
    fn test_bmp_input() {
        let bytes = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Bmp);
        assert_eq!(decompose(&bytes).unwrap().len(), 24);
    }

    #[test]
    fn test_decompose_is_deterministic() {
        let bytes = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Png);
        let first = decompose(&bytes).unwrap();
        let second = decompose(&bytes).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!((a.channel, a.bit), (b.channel, b.bit));
            assert_eq!(a.image.as_raw(), b.image.as_raw());
        }
    }

    #[test]
    fn test_undecodable_input_fails_whole_call() {
        assert!(matches!(
            decompose(b"definitely not an image"),
            Err(DecodeError::UnsupportedFormat(_))
        ));

        // Valid PNG signature with a truncated body
        let mut truncated = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Png);
        truncated.truncate(40);
        assert!(decompose(&truncated).is_err());
    }

    #[test]
    fn test_planes_are_built_on_demand() {
        let bytes = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Png);
        let image = decode(&bytes).unwrap();
        assert_eq!(image.dimensions(), (7, 5));
        assert_eq!(image.channels(), RGB);

        let mut planes = image.planes();
        assert_eq!(planes.len(), 24);
        let first = planes.next().unwrap();
        assert_eq!((first.channel, first.bit), (Channel::Red, 7));
        assert_eq!(planes.len(), 23);

        // Skipping to the last plane yields the same pixels as a full split
        let last = image.planes().last().unwrap();
        let all = decompose(&bytes).unwrap();
        assert_eq!(last.image.as_raw(), all[23].image.as_raw());
    }

    #[test]
    fn test_decode_rejects_before_any_plane() {
        assert!(matches!(decode(b"GIF89a garbage"), Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_encoded_plane_decodes_as_gray() {
        let bytes = encode(DynamicImage::ImageRgb8(sample_rgb()), ImageFormat::Png);
        let plane = &decompose(&bytes).unwrap()[0];
        let png = plane.encode_png().unwrap();

        let decoded = image::load_from_memory(&png).unwrap().into_luma8();
        assert_eq!(decoded.as_raw(), plane.image.as_raw());
    }
}
