//! # Classifier Module
//!
//! Finds a document's identifier by trying its candidate images in order
//! and stopping at the first one that carries a barcode.

use crate::core::barcode::{BarcodeDecoder, BoundingBox, Code128Reader, SymbolReader};
use crate::core::raster::{CandidateSource, PageRasterizer, RasterConfig};
use crate::error::DocumentOpenError;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The identifier found in a document and where it was read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub identifier: String,
    pub source: CandidateSource,
    pub bounds: BoundingBox,
}

/// Maps a document to its identifier.
///
/// `Ok(None)` means the document was read but carries no barcode; an
/// unreadable document is an `Err`.
pub trait Classify: Send {
    fn classify(&self, path: &Path) -> Result<Option<Identification>, DocumentOpenError>;
}

/// Rasterizer plus barcode decoder
pub struct DocumentClassifier<R: SymbolReader = Code128Reader> {
    rasterizer: PageRasterizer,
    decoder: BarcodeDecoder<R>,
}

impl Default for DocumentClassifier<Code128Reader> {
    fn default() -> Self {
        Self::new(RasterConfig::default())
    }
}

impl DocumentClassifier<Code128Reader> {
    pub fn new(config: RasterConfig) -> Self {
        Self::with_decoder(PageRasterizer::new(config), BarcodeDecoder::default())
    }
}

impl<R: SymbolReader> DocumentClassifier<R> {
    pub fn with_decoder(rasterizer: PageRasterizer, decoder: BarcodeDecoder<R>) -> Self {
        Self { rasterizer, decoder }
    }
}

impl<R: SymbolReader> Classify for DocumentClassifier<R> {
    fn classify(&self, path: &Path) -> Result<Option<Identification>, DocumentOpenError> {
        for candidate in self.rasterizer.open(path)? {
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!("{}: skipping candidate: {}", path.display(), e);
                    continue;
                }
            };

            let Some(gray) = normalize_channels(candidate.image) else {
                debug!("{}: skipping {} with unsupported layout", path.display(), candidate.source);
                continue;
            };

            if let Some(found) = self.decoder.decode(&gray) {
                info!(
                    "{}: read {:?} from {} ({:?} stage)",
                    path.display(),
                    found.payload,
                    candidate.source,
                    found.stage
                );
                return Ok(Some(Identification {
                    identifier: found.payload,
                    source: candidate.source,
                    bounds: found.bounds,
                }));
            }
        }

        Ok(None)
    }
}

/// Bring an image to 8-bit single channel.
///
/// Four channels drop alpha first, then go to luma. Layouts other than
/// 8-bit gray, gray+alpha, RGB and RGBA are not decoded, and neither are
/// empty images.
pub fn normalize_channels(image: DynamicImage) -> Option<GrayImage> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }
    match image {
        DynamicImage::ImageLuma8(gray) => Some(gray),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageRgb8(_) => Some(image.to_luma8()),
        DynamicImage::ImageRgba8(_) => Some(DynamicImage::ImageRgb8(image.to_rgb8()).to_luma8()),
        _ => None,
    }
}
