//! # Barcode Module
//!
//! Reads linear CODE-128 barcodes from grayscale images.
//!
//! ## Strategy
//! 1. **Direct** - scan the image as given
//! 2. **Thresholded** - if nothing was found, median-denoise, binarize
//!    with Otsu's threshold and scan again
//!
//! Each stage scans rows first. Columns are scanned only when no row
//! yields a symbol, which covers labels turned by 90 degrees.
//!
//! When several barcodes are found, the one nearest the top-left corner
//! (smallest `top + left`) wins; ties keep reader order.
//!
//! ## Example
//! ```rust,ignore
//! use barcode_pdf::core::barcode::BarcodeDecoder;
//!
//! let decoder = BarcodeDecoder::default();
//! if let Some(found) = decoder.decode(&gray) {
//!     println!("{} at {:?}", found.payload, found.bounds);
//! }
//! ```

pub mod code128;
pub mod preprocess;

use crate::error::DecodeError;
use code128::RowHit;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pixel rectangle of a detected barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

/// Which decode stage produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeStage {
    /// Read from the image as given
    Direct,
    /// Read after denoising and Otsu thresholding
    Thresholded,
}

/// A decoded barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeMatch {
    /// Decoded text
    pub payload: String,
    /// Where the barcode sits in the image
    pub bounds: BoundingBox,
    /// Stage that produced the match
    pub stage: DecodeStage,
}

/// Reads every barcode of one symbology from an image
pub trait SymbolReader: Send + Sync {
    /// All barcodes found, in reader order.
    fn read(&self, image: &GrayImage) -> Result<Vec<BarcodeMatch>, DecodeError>;
}

/// Rows with less luma spread than this are skipped
const MIN_ROW_CONTRAST: u8 = 24;

/// Images with more rows (or columns) than this are scanned with a stride
const MAX_SCAN_LINES: u32 = 200;

/// Direction of the scanlines that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Rows,
    Columns,
}

/// Scanline reader for CODE-128
#[derive(Debug, Clone, Default)]
pub struct Code128Reader;

impl Code128Reader {
    pub fn new() -> Self {
        Self
    }

    fn line_step(lines: u32) -> usize {
        (lines / MAX_SCAN_LINES).max(1) as usize
    }

    fn scan_rows(image: &GrayImage) -> Vec<BarcodeMatch> {
        let (width, height) = image.dimensions();
        let raw = image.as_raw();
        let stride = width as usize;
        let mut hits = Vec::new();

        for y in (0..height as usize).step_by(Self::line_step(height)) {
            let row = &raw[y * stride..(y + 1) * stride];
            if let Some(dark) = binarize_line(row) {
                for hit in code128::decode_row(&dark) {
                    hits.push((y as u32, hit));
                }
            }
        }

        merge_line_hits(hits, Scan::Rows)
    }

    fn scan_columns(image: &GrayImage) -> Vec<BarcodeMatch> {
        let (width, height) = image.dimensions();
        if height < 2 {
            return Vec::new();
        }
        let raw = image.as_raw();
        let stride = width as usize;
        let mut hits = Vec::new();
        let mut column = Vec::with_capacity(height as usize);

        for x in (0..width as usize).step_by(Self::line_step(width)) {
            column.clear();
            column.extend((0..height as usize).map(|y| raw[y * stride + x]));
            if let Some(dark) = binarize_line(&column) {
                for hit in code128::decode_row(&dark) {
                    hits.push((x as u32, hit));
                }
            }
        }

        merge_line_hits(hits, Scan::Columns)
    }
}

impl SymbolReader for Code128Reader {
    fn read(&self, image: &GrayImage) -> Result<Vec<BarcodeMatch>, DecodeError> {
        let (width, height) = image.dimensions();
        if width < 2 || height == 0 {
            return Err(DecodeError::InvalidImage {
                reason: format!("{}x{} image is too small to scan", width, height),
            });
        }

        let rows = Self::scan_rows(image);
        if !rows.is_empty() {
            return Ok(rows);
        }
        Ok(Self::scan_columns(image))
    }
}

/// Split one scanline at the midpoint of its luma range.
fn binarize_line(line: &[u8]) -> Option<Vec<bool>> {
    let min = *line.iter().min()?;
    let max = *line.iter().max()?;
    if max - min < MIN_ROW_CONTRAST {
        return None;
    }
    let threshold = ((min as u16 + max as u16) / 2) as u8;
    Some(line.iter().map(|&luma| luma <= threshold).collect())
}

/// Group hits of the same payload whose extents along the scanline
/// overlap into one match per physical barcode. Each hit comes with the
/// index of the row or column it was read on.
fn merge_line_hits(hits: Vec<(u32, RowHit)>, scan: Scan) -> Vec<BarcodeMatch> {
    struct Group {
        payload: String,
        first_line: u32,
        last_line: u32,
        start: u32,
        end: u32,
    }

    let mut groups: Vec<Group> = Vec::new();
    for (line, hit) in hits {
        let existing = groups
            .iter_mut()
            .find(|g| g.payload == hit.payload && g.start < hit.end && hit.start < g.end);
        match existing {
            Some(group) => {
                group.last_line = group.last_line.max(line);
                group.start = group.start.min(hit.start);
                group.end = group.end.max(hit.end);
            }
            None => groups.push(Group {
                payload: hit.payload,
                first_line: line,
                last_line: line,
                start: hit.start,
                end: hit.end,
            }),
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let across = g.last_line - g.first_line + 1;
            let along = g.end - g.start;
            let bounds = match scan {
                Scan::Rows => BoundingBox {
                    top: g.first_line,
                    left: g.start,
                    width: along,
                    height: across,
                },
                Scan::Columns => BoundingBox {
                    top: g.start,
                    left: g.first_line,
                    width: across,
                    height: along,
                },
            };
            BarcodeMatch {
                payload: g.payload,
                bounds,
                stage: DecodeStage::Direct,
            }
        })
        .collect()
}

/// The canonical match: smallest `top + left`, first one on ties.
pub fn select_top_left(matches: Vec<BarcodeMatch>) -> Option<BarcodeMatch> {
    matches
        .into_iter()
        .min_by_key(|m| m.bounds.top as u64 + m.bounds.left as u64)
}

/// Two-stage barcode decoder
pub struct BarcodeDecoder<R: SymbolReader = Code128Reader> {
    reader: R,
}

impl Default for BarcodeDecoder<Code128Reader> {
    fn default() -> Self {
        Self::new(Code128Reader::new())
    }
}

impl<R: SymbolReader> BarcodeDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decode one image. Reader errors count as "no match".
    pub fn decode(&self, image: &GrayImage) -> Option<BarcodeMatch> {
        let direct = match self.reader.read(image) {
            Ok(matches) => matches,
            Err(e) => {
                debug!("Direct decode skipped: {}", e);
                return None;
            }
        };
        if !direct.is_empty() {
            return select_top_left(direct);
        }

        let cleaned = preprocess::denoise(image);
        let binary = preprocess::binarize(&cleaned, preprocess::otsu_threshold(&cleaned));
        match self.reader.read(&binary) {
            Ok(matches) => select_top_left(matches).map(|found| BarcodeMatch {
                stage: DecodeStage::Thresholded,
                ..found
            }),
            Err(e) => {
                debug!("Thresholded decode skipped: {}", e);
                None
            }
        }
    }
}
