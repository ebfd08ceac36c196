//! Decoding of image XObjects into rasters.

use super::objects;
use crate::error::DecodeError;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, Stream};

/// Largest accepted image side, in pixels
const MAX_IMAGE_SIDE: i64 = 20_000;

/// How sample values map to colour
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette entries in the base model's component layout
    Indexed { base: Box<ColorModel>, palette: Vec<u8> },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
            ColorModel::Indexed { .. } => 1,
        }
    }
}

/// Decode an image XObject stream.
pub(crate) fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, DecodeError> {
    let dict = &stream.dict;
    let filters = objects::filters(doc, dict);

    if let Some(last) = filters.last() {
        match last.as_slice() {
            b"DCTDecode" | b"DCT" if filters.len() == 1 => {
                return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                    .map_err(|e| DecodeError::InvalidImage {
                        reason: format!("JPEG image: {}", e),
                    });
            }
            b"DCTDecode" | b"DCT" | b"JPXDecode" | b"CCITTFaxDecode" | b"CCF" | b"JBIG2Decode" => {
                return Err(DecodeError::UnsupportedFilter {
                    filter: String::from_utf8_lossy(last).into_owned(),
                });
            }
            _ => {}
        }
    }

    let width = dimension(doc, dict, b"Width")?;
    let height = dimension(doc, dict, b"Height")?;
    let is_mask = objects::boolean(doc, dict, b"ImageMask");
    let bits = if is_mask {
        1
    } else {
        objects::integer(doc, dict, b"BitsPerComponent").unwrap_or(8) as usize
    };
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(DecodeError::InvalidImage {
            reason: format!("{} bits per component", bits),
        });
    }

    let model = if is_mask {
        ColorModel::Gray
    } else {
        match dict.get(b"ColorSpace") {
            Ok(space) => color_model(doc, space)?,
            Err(_) => ColorModel::Gray,
        }
    };

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| DecodeError::InvalidImage {
                reason: format!("stream decompression failed: {}", e),
            })?
    };

    let components = model.components();
    let indexed = matches!(model, ColorModel::Indexed { .. });
    let mut samples = unpack_samples(&data, width, height, components, bits, !indexed)?;

    if inverted_decode(doc, dict) && !indexed {
        for sample in samples.iter_mut() {
            *sample = 255 - *sample;
        }
    }

    build_image(model, width, height, samples)
}

fn dimension(doc: &Document, dict: &lopdf::Dictionary, key: &[u8]) -> Result<u32, DecodeError> {
    match objects::integer(doc, dict, key) {
        Some(value) if value > 0 && value <= MAX_IMAGE_SIDE => Ok(value as u32),
        other => Err(DecodeError::InvalidImage {
            reason: format!("{} is {:?}", String::from_utf8_lossy(key), other),
        }),
    }
}

/// A `Decode` array of `[1 0]` (per component) flips sample values.
fn inverted_decode(doc: &Document, dict: &lopdf::Dictionary) -> bool {
    match dict.get(b"Decode").map(|object| objects::resolve(doc, object)) {
        Ok(Object::Array(values)) if values.len() >= 2 => {
            let low = objects::number(&values[0]).unwrap_or(0.0);
            let high = objects::number(&values[1]).unwrap_or(1.0);
            low > high
        }
        _ => false,
    }
}

fn color_model(doc: &Document, space: &Object) -> Result<ColorModel, DecodeError> {
    match objects::resolve(doc, space) {
        Object::Name(name) => named_model(name),
        Object::Array(items) if !items.is_empty() => {
            let family = match objects::resolve(doc, &items[0]) {
                Object::Name(name) => name.as_slice(),
                _ => b"",
            };
            match family {
                b"ICCBased" => {
                    let components = items
                        .get(1)
                        .and_then(|profile| objects::stream(doc, profile))
                        .and_then(|profile| objects::integer(doc, &profile.dict, b"N"))
                        .unwrap_or(3);
                    match components {
                        1 => Ok(ColorModel::Gray),
                        4 => Ok(ColorModel::Cmyk),
                        _ => Ok(ColorModel::Rgb),
                    }
                }
                b"Indexed" | b"I" if items.len() >= 4 => {
                    let base = color_model(doc, &items[1])?;
                    let palette = match objects::resolve(doc, &items[3]) {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(s) => s.decompressed_content().unwrap_or_else(|_| s.content.clone()),
                        _ => Vec::new(),
                    };
                    Ok(ColorModel::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                other => named_model(other),
            }
        }
        _ => Err(DecodeError::UnsupportedColorSpace {
            name: "malformed".to_string(),
        }),
    }
}

fn named_model(name: &[u8]) -> Result<ColorModel, DecodeError> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" | b"Lab" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => Err(DecodeError::UnsupportedColorSpace {
            name: String::from_utf8_lossy(other).into_owned(),
        }),
    }
}

/// Unpack packed samples into one byte per component.
///
/// With `scale` set, sub-byte samples are stretched to 0..=255; palette
/// indices keep their raw value.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: usize,
    scale: bool,
) -> Result<Vec<u8>, DecodeError> {
    let per_row = width as usize * components;
    let row_bytes = (per_row * bits + 7) / 8;
    let needed = row_bytes * height as usize;
    if data.len() < needed {
        return Err(DecodeError::InvalidImage {
            reason: format!("expected {} bytes of samples, found {}", needed, data.len()),
        });
    }

    let max = (1u32 << bits.min(8)) - 1;
    let mut samples = Vec::with_capacity(per_row * height as usize);

    for row in data.chunks(row_bytes).take(height as usize) {
        match bits {
            8 => samples.extend_from_slice(&row[..per_row]),
            16 => samples.extend(row.chunks(2).take(per_row).map(|pair| pair[0])),
            _ => {
                for i in 0..per_row {
                    let bit_offset = i * bits;
                    let byte = row[bit_offset / 8];
                    let shift = 8 - bits - (bit_offset % 8);
                    let value = (byte as u32 >> shift) & max;
                    samples.push(if scale { (value * 255 / max) as u8 } else { value as u8 });
                }
            }
        }
    }

    Ok(samples)
}

fn build_image(model: ColorModel, width: u32, height: u32, samples: Vec<u8>) -> Result<DynamicImage, DecodeError> {
    let invalid = || DecodeError::InvalidImage {
        reason: format!("{}x{} buffer does not match its size", width, height),
    };

    match model {
        ColorModel::Gray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(invalid),
        ColorModel::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(invalid),
        ColorModel::Cmyk => {
            let rgb = samples.chunks(4).flat_map(cmyk_to_rgb).collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
        ColorModel::Indexed { base, palette } => {
            let base_components = base.components();
            let lookup = |index: u8| -> Vec<u8> {
                let start = index as usize * base_components;
                match palette.get(start..start + base_components) {
                    Some(entry) if *base == ColorModel::Cmyk => cmyk_to_rgb(entry).to_vec(),
                    Some(entry) if base_components == 1 => vec![entry[0]; 3],
                    Some(entry) => entry.to_vec(),
                    None => vec![0, 0, 0],
                }
            };
            let rgb: Vec<u8> = samples.into_iter().flat_map(lookup).collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid)
        }
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> [u8; 3] {
    let k = cmyk.get(3).copied().unwrap_or(0) as u16;
    let channel = |c: u8| (255u16.saturating_sub(c as u16 + k)) as u8;
    [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn image_stream(dict: lopdf::Dictionary, content: Vec<u8>) -> Stream {
        Stream::new(dict, content)
    }

    #[test]
    fn decodes_raw_gray_samples() {
        let stream = image_stream(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 64, 128, 255],
        );

        let image = decode_image(&Document::new(), &stream).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 0)[0], 64);
        assert_eq!(image.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn unpacks_one_bit_rows_with_padding() {
        // 10 pixels wide -> 2 bytes per row; 0 = black
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 10,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 1,
            },
            vec![0b0111_1111, 0b1100_0000],
        );

        let image = decode_image(&Document::new(), &stream).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(1, 0)[0], 255);
        assert_eq!(image.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn image_mask_honours_inverted_decode() {
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 1,
                "ImageMask" => true,
                "Decode" => vec![1.into(), 0.into()],
            },
            vec![0b1000_0000],
        );

        let image = decode_image(&Document::new(), &stream).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn converts_cmyk_to_rgb() {
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceCMYK",
                "BitsPerComponent" => 8,
            },
            vec![0, 0, 0, 255, 0, 0, 0, 0],
        );

        let image = decode_image(&Document::new(), &stream).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn expands_indexed_palette() {
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => vec![
                    "Indexed".into(),
                    "DeviceRGB".into(),
                    1.into(),
                    Object::string_literal(vec![255u8, 0, 0, 0, 0, 255]),
                ],
                "BitsPerComponent" => 8,
            },
            vec![1, 0],
        );

        let image = decode_image(&Document::new(), &stream).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn rejects_unsupported_filter() {
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 8,
                "Filter" => "JBIG2Decode",
            },
            vec![0; 16],
        );

        let error = decode_image(&Document::new(), &stream).unwrap_err();
        assert!(matches!(error, DecodeError::UnsupportedFilter { ref filter } if filter == "JBIG2Decode"));
    }

    #[test]
    fn rejects_truncated_samples() {
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 100,
                "Height" => 100,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0; 50],
        );

        assert!(decode_image(&Document::new(), &stream).is_err());
    }
}
