//! # Raster Module
//!
//! Turns a PDF into an ordered sequence of grayscale candidate images.
//!
//! ## Order
//! For every page, in page order:
//! 1. each embedded image XObject, in resource order (images inside form
//!    XObjects included, each object at most once per page)
//! 2. one render of the whole page
//!
//! Every candidate is converted to grayscale and contrast-enhanced before
//! it is yielded. Candidates are produced lazily, so a document whose first
//! image carries the barcode never renders a page.

mod embedded;
pub mod enhance;
mod objects;
mod render;

pub use enhance::enhance_contrast;
pub use render::MAX_RENDER_SIDE;

use crate::error::{DecodeError, DocumentOpenError};
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

/// Form XObjects nested deeper than this are not searched for images
const MAX_FORM_DEPTH: usize = 8;

/// Rasterizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Contrast stretch applied to every candidate
    pub contrast_factor: f32,
    /// Pixels per PDF point for full-page renders
    pub render_scale: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            contrast_factor: 2.0,
            render_scale: 2.0,
        }
    }
}

/// Where a candidate image came from. Pages are numbered from 1, embedded
/// images from 0 within their page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    Embedded { page: u32, index: usize },
    PageRender { page: u32 },
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateSource::Embedded { page, index } => write!(f, "page {} image {}", page, index + 1),
            CandidateSource::PageRender { page } => write!(f, "page {} render", page),
        }
    }
}

/// A grayscale, contrast-enhanced raster to try decoding
#[derive(Debug, Clone)]
pub struct CandidateImage {
    pub image: DynamicImage,
    pub source: CandidateSource,
}

/// Opens PDFs and yields their candidate images
#[derive(Debug, Clone, Default)]
pub struct PageRasterizer {
    config: RasterConfig,
}

impl PageRasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Read and parse a PDF. The file is read in one call and closed before
    /// this returns; the candidates are produced from memory.
    pub fn open(&self, path: &Path) -> Result<CandidateImages, DocumentOpenError> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DocumentOpenError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                DocumentOpenError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let doc = Document::load_mem(&bytes).map_err(|e| DocumentOpenError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        if pages.is_empty() {
            return Err(DocumentOpenError::Corrupt {
                path: path.to_path_buf(),
                reason: "document has no pages".to_string(),
            });
        }
        debug!("Opened {} ({} pages)", path.display(), pages.len());

        Ok(CandidateImages {
            doc,
            pages: pages.into_iter(),
            pending: VecDeque::new(),
            config: self.config,
        })
    }
}

/// An image XObject found in a page's resources
enum ImageSlot {
    Referenced(ObjectId),
    Inline(Stream),
}

enum Pending {
    Embedded { page: u32, index: usize, slot: ImageSlot },
    Render { page: u32, page_id: ObjectId },
}

/// Lazy sequence of candidate images for one document.
///
/// A candidate that cannot be decoded or rendered yields an `Err` and the
/// sequence continues with the next one.
pub struct CandidateImages {
    doc: Document,
    pages: std::vec::IntoIter<(u32, ObjectId)>,
    pending: VecDeque<Pending>,
    config: RasterConfig,
}

impl CandidateImages {
    /// Queue every embedded image of the next page, then its render.
    fn queue_next_page(&mut self) -> bool {
        let Some((page, page_id)) = self.pages.next() else {
            return false;
        };

        let mut slots = Vec::new();
        if let Some(resources) = objects::page_resources(&self.doc, page_id) {
            let mut seen = HashSet::new();
            collect_images(&self.doc, resources, &mut seen, &mut slots, 0);
        }
        for (index, slot) in slots.into_iter().enumerate() {
            self.pending.push_back(Pending::Embedded { page, index, slot });
        }
        self.pending.push_back(Pending::Render { page, page_id });
        true
    }

    fn produce(&self, pending: Pending) -> Result<CandidateImage, DecodeError> {
        let (raw, source) = match pending {
            Pending::Embedded { page, index, slot } => {
                let stream = match &slot {
                    ImageSlot::Inline(stream) => stream,
                    ImageSlot::Referenced(id) => self
                        .doc
                        .get_object(*id)
                        .and_then(Object::as_stream)
                        .map_err(|e| DecodeError::InvalidImage {
                            reason: format!("image object {:?}: {}", id, e),
                        })?,
                };
                (embedded::decode_image(&self.doc, stream)?, CandidateSource::Embedded { page, index })
            }
            Pending::Render { page, page_id } => (
                render::render_page(&self.doc, page_id, page, self.config.render_scale)?,
                CandidateSource::PageRender { page },
            ),
        };

        let gray = enhance_contrast(&raw.to_luma8(), self.config.contrast_factor);
        Ok(CandidateImage {
            image: DynamicImage::ImageLuma8(gray),
            source,
        })
    }
}

impl Iterator for CandidateImages {
    type Item = Result<CandidateImage, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() {
            if !self.queue_next_page() {
                return None;
            }
        }
        let pending = self.pending.pop_front()?;
        Some(self.produce(pending))
    }
}

/// Gather image XObjects from a resource dictionary, descending into forms.
fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<ImageSlot>,
    depth: usize,
) {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|object| objects::dict(doc, object))
    else {
        return;
    };

    for (_, entry) in xobjects.iter() {
        if let Object::Reference(id) = entry {
            if !seen.insert(*id) {
                continue;
            }
        }
        let Some(stream) = objects::stream(doc, entry) else {
            continue;
        };

        match objects::name(doc, &stream.dict, b"Subtype") {
            Some(b"Image") => out.push(match entry {
                Object::Reference(id) => ImageSlot::Referenced(*id),
                _ => ImageSlot::Inline(stream.clone()),
            }),
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                if let Some(inner) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| objects::dict(doc, object))
                {
                    collect_images(doc, inner, seen, out, depth + 1);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::test_support::{image_xobject, PdfBuilder};
    use lopdf::dictionary;
    use tempfile::TempDir;

    #[test]
    fn embedded_images_come_before_page_render() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.pdf");
        PdfBuilder::new()
            .page(|page| {
                page.image(image_xobject(&image::GrayImage::new(8, 4)), 10.0, 10.0, 80.0, 40.0)
                    .image(image_xobject(&image::GrayImage::new(4, 4)), 10.0, 100.0, 40.0, 40.0)
            })
            .page(|page| page)
            .save(&path);

        let sources: Vec<CandidateSource> = PageRasterizer::default()
            .open(&path)
            .unwrap()
            .map(|candidate| candidate.unwrap().source)
            .collect();

        assert_eq!(
            sources,
            vec![
                CandidateSource::Embedded { page: 1, index: 0 },
                CandidateSource::Embedded { page: 1, index: 1 },
                CandidateSource::PageRender { page: 1 },
                CandidateSource::PageRender { page: 2 },
            ]
        );
    }

    #[test]
    fn candidates_are_grayscale() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.pdf");
        PdfBuilder::new().page(|page| page).save(&path);

        let candidate = PageRasterizer::default().open(&path).unwrap().next().unwrap().unwrap();
        assert!(matches!(candidate.image, DynamicImage::ImageLuma8(_)));
        // default 612x792 points at 2 px per point
        assert_eq!((candidate.image.width(), candidate.image.height()), (1224, 1584));
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let result = PageRasterizer::default().open(&temp.path().join("absent.pdf"));
        assert!(matches!(result, Err(DocumentOpenError::NotFound { .. })));
    }

    #[test]
    fn garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junk.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let result = PageRasterizer::default().open(&path);
        assert!(matches!(result, Err(DocumentOpenError::Corrupt { .. })));
    }

    #[test]
    fn undecodable_image_does_not_end_sequence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.pdf");
        let broken = lopdf::Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 8,
                "Filter" => "JPXDecode",
            },
            vec![0; 8],
        );
        PdfBuilder::new()
            .page(|page| page.image(broken, 0.0, 0.0, 10.0, 10.0))
            .save(&path);

        let results: Vec<_> = PageRasterizer::default().open(&path).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
