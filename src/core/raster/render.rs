//! Full-page rendering with tiny-skia.
//!
//! Only what matters for barcode reading is drawn: filled and stroked
//! vector paths, image XObjects and form XObjects. Text operators are
//! skipped, so a barcode typeset with a barcode font renders as blank
//! paper and is not read.

use super::{embedded, objects};
use crate::error::DecodeError;
use image::{DynamicImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};
use tracing::debug;

/// Largest rendered side, in pixels
pub const MAX_RENDER_SIDE: f32 = 10_000.0;

/// US Letter, used when a page has no MediaBox
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Form XObjects nested deeper than this are not drawn
const MAX_FORM_DEPTH: usize = 8;

#[derive(Clone)]
struct GraphicsState {
    ctm: Transform,
    fill: Paint<'static>,
    stroke_paint: Paint<'static>,
    stroke: Stroke,
}

impl GraphicsState {
    fn new(ctm: Transform) -> Self {
        let mut fill = Paint::default();
        fill.set_color(Color::BLACK);
        fill.anti_alias = false;
        let stroke_paint = fill.clone();
        Self {
            ctm,
            fill,
            stroke_paint,
            stroke: Stroke::default(),
        }
    }
}

/// Render one page to an RGBA raster at `scale` pixels per point.
pub(crate) fn render_page(doc: &Document, page_id: ObjectId, page: u32, scale: f32) -> Result<DynamicImage, DecodeError> {
    let render_error = |reason: String| DecodeError::Render { page, reason };

    let [x0, y0, x1, y1] = media_box(doc, page_id);
    let (width_pt, height_pt) = ((x1 - x0).max(1.0), (y1 - y0).max(1.0));
    let scale = scale
        .min(MAX_RENDER_SIDE / width_pt)
        .min(MAX_RENDER_SIDE / height_pt);

    let width = (width_pt * scale).round().max(1.0) as u32;
    let height = (height_pt * scale).round().max(1.0) as u32;
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| render_error(format!("cannot allocate {}x{} canvas", width, height)))?;
    pixmap.fill(Color::WHITE);

    let content = doc
        .get_page_content(page_id)
        .map_err(|e| render_error(format!("content stream: {}", e)))?;
    let content = Content::decode(&content).map_err(|e| render_error(format!("content stream: {}", e)))?;

    let base = Transform::from_row(scale, 0.0, 0.0, -scale, -x0 * scale, y1 * scale);
    let resources = objects::page_resources(doc, page_id);
    let mut painter = Painter { doc, pixmap: &mut pixmap };
    painter.run(&content.operations, resources, GraphicsState::new(base), 0);

    let rgba = RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| render_error("canvas size mismatch".to_string()))?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    match objects::inherited(doc, page_id, b"MediaBox") {
        Some(Object::Array(values)) if values.len() >= 4 => {
            let mut coords = [0.0f32; 4];
            for (slot, value) in coords.iter_mut().zip(values) {
                *slot = objects::number(objects::resolve(doc, value)).unwrap_or(0.0);
            }
            [
                coords[0].min(coords[2]),
                coords[1].min(coords[3]),
                coords[0].max(coords[2]),
                coords[1].max(coords[3]),
            ]
        }
        _ => DEFAULT_MEDIA_BOX,
    }
}

struct Painter<'a> {
    doc: &'a Document,
    pixmap: &'a mut Pixmap,
}

impl Painter<'_> {
    fn run(&mut self, operations: &[Operation], resources: Option<&Dictionary>, initial: GraphicsState, depth: usize) {
        let mut state = initial;
        let mut saved: Vec<GraphicsState> = Vec::new();
        let mut path = PathBuilder::new();
        let mut current = (0.0f32, 0.0f32);

        for op in operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(objects::number).collect();

            match op.operator.as_str() {
                "q" => saved.push(state.clone()),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        state = previous;
                    }
                }
                "cm" if nums.len() == 6 => {
                    let m = Transform::from_row(nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]);
                    state.ctm = state.ctm.pre_concat(m);
                }
                "w" if !nums.is_empty() => state.stroke.width = nums[0].max(0.0),

                "g" | "rg" | "k" | "sc" | "scn" => set_color(&mut state.fill, &nums),
                "G" | "RG" | "K" | "SC" | "SCN" => set_color(&mut state.stroke_paint, &nums),

                "m" if nums.len() >= 2 => {
                    path.move_to(nums[0], nums[1]);
                    current = (nums[0], nums[1]);
                }
                "l" if nums.len() >= 2 => {
                    path.line_to(nums[0], nums[1]);
                    current = (nums[0], nums[1]);
                }
                "c" if nums.len() >= 6 => {
                    path.cubic_to(nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]);
                    current = (nums[4], nums[5]);
                }
                "v" if nums.len() >= 4 => {
                    path.cubic_to(current.0, current.1, nums[0], nums[1], nums[2], nums[3]);
                    current = (nums[2], nums[3]);
                }
                "y" if nums.len() >= 4 => {
                    path.cubic_to(nums[0], nums[1], nums[2], nums[3], nums[2], nums[3]);
                    current = (nums[2], nums[3]);
                }
                "h" => path.close(),
                "re" if nums.len() >= 4 => {
                    let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                    path.move_to(x, y);
                    path.line_to(x + w, y);
                    path.line_to(x + w, y + h);
                    path.line_to(x, y + h);
                    path.close();
                    current = (x, y);
                }

                "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "S" | "s" | "n" => {
                    let operator = op.operator.as_str();
                    if matches!(operator, "b" | "b*" | "s") {
                        path.close();
                    }
                    let finished = std::mem::replace(&mut path, PathBuilder::new()).finish();
                    if let Some(shape) = finished {
                        let rule = if operator.ends_with('*') {
                            FillRule::EvenOdd
                        } else {
                            FillRule::Winding
                        };
                        if matches!(operator, "f" | "F" | "f*" | "B" | "B*" | "b" | "b*") {
                            self.pixmap.fill_path(&shape, &state.fill, rule, state.ctm, None);
                        }
                        if matches!(operator, "B" | "B*" | "b" | "b*" | "S" | "s") {
                            self.pixmap
                                .stroke_path(&shape, &state.stroke_paint, &state.stroke, state.ctm, None);
                        }
                    }
                }

                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.draw_xobject(name, resources, &state, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn draw_xobject(&mut self, name: &[u8], resources: Option<&Dictionary>, state: &GraphicsState, depth: usize) {
        let doc = self.doc;
        let Some(stream) = resources
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|xobjects| objects::dict(doc, xobjects))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|object| objects::stream(doc, object))
        else {
            return;
        };

        match objects::name(doc, &stream.dict, b"Subtype") {
            Some(b"Image") => match embedded::decode_image(doc, stream) {
                Ok(image) => self.draw_image(image, state.ctm),
                Err(e) => debug!("Skipping image /{}: {}", String::from_utf8_lossy(name), e),
            },
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let content = match Content::decode(&data) {
                    Ok(content) => content,
                    Err(e) => {
                        debug!("Skipping form /{}: {}", String::from_utf8_lossy(name), e);
                        return;
                    }
                };

                let mut inner = state.clone();
                if let Ok(Object::Array(values)) = stream.dict.get(b"Matrix") {
                    let m: Vec<f32> = values.iter().filter_map(objects::number).collect();
                    if m.len() == 6 {
                        inner.ctm = inner.ctm.pre_concat(Transform::from_row(m[0], m[1], m[2], m[3], m[4], m[5]));
                    }
                }
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| objects::dict(doc, object))
                    .or(resources);
                self.run(&content.operations, form_resources, inner, depth + 1);
            }
            _ => {}
        }
    }

    /// Images occupy the unit square of user space, first row at the top.
    fn draw_image(&mut self, image: DynamicImage, ctm: Transform) {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let Some(size) = IntSize::from_wh(width, height) else {
            return;
        };
        let Some(source) = Pixmap::from_vec(rgba.into_raw(), size) else {
            return;
        };

        let to_unit = Transform::from_row(1.0 / width as f32, 0.0, 0.0, -1.0 / height as f32, 0.0, 1.0);
        let paint = PixmapPaint {
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, source.as_ref(), &paint, ctm.pre_concat(to_unit), None);
    }
}

/// One operand is gray, three are RGB, four are CMYK. Pattern names are
/// ignored and leave the colour unchanged.
fn set_color(paint: &mut Paint<'static>, components: &[f32]) {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let (r, g, b) = match components {
        [gray] => (*gray, *gray, *gray),
        [r, g, b] => (*r, *g, *b),
        [c, m, y, k] => (1.0 - (c + k).min(1.0), 1.0 - (m + k).min(1.0), 1.0 - (y + k).min(1.0)),
        _ => return,
    };
    paint.set_color_rgba8(to_byte(r), to_byte(g), to_byte(b), 255);
}
