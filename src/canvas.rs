//! Canvas Buffer
//!
//! The single RGBA8 raster shared by stroke rendering and frame compositing.
//! Its dimensions are taken from the background image when the canvas is
//! created and never change afterwards; every write is a synchronous call on
//! the UI thread, so observers never see half a stroke or half a composite.
//!
//! Segments are rasterized with signed distance functions: a pixel belongs
//! to the shape when its centre has a distance <= 0.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::brush::{BrushStyle, LineCap, LineJoin, Shadow, MITER_LIMIT};
use crate::color::HexColor;
use crate::input::Segment;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("background image has no pixels")]
    EmptyBackground,
    #[error("failed to load background image {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode canvas: {0}")]
    Encode(#[from] image::ImageError),
}

/// Raster encoding used when the canvas is sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

/// The drawing surface's pixel store
pub struct Canvas {
    pixels: RgbaImage,
    background: RgbaImage,
    dirty: bool,
}

impl Canvas {
    /// Create a canvas sized to, and showing, the given background
    pub fn from_background(background: RgbaImage) -> Result<Self, CanvasError> {
        if background.width() == 0 || background.height() == 0 {
            return Err(CanvasError::EmptyBackground);
        }
        log::info!("Canvas created: {}x{}", background.width(), background.height());
        Ok(Self {
            pixels: background.clone(),
            background,
            dirty: true,
        })
    }

    /// Load the background image from disk and create a canvas from it
    pub fn load_background(path: impl AsRef<Path>) -> Result<Self, CanvasError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| CanvasError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_background(image.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Current pixels
    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// Returns true once after every change, used to decide when to re-upload
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Rasterize one segment with the style as it is right now
    pub fn draw_segment(&mut self, segment: &Segment, style: &BrushStyle) {
        let shape = SegmentShape::new(segment, style);
        if let Some(shadow) = style.shadow.as_ref().filter(|s| s.is_visible()) {
            self.paint_shadow(&shape, shadow);
        }
        self.paint_solid(&shape, style.color);
        self.dirty = true;
    }

    /// Replace the whole buffer with `image`, scaled to the canvas dimensions
    pub fn replace_with(&mut self, image: &RgbaImage) {
        let (width, height) = self.dimensions();
        self.pixels = if image.dimensions() == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, width, height, FilterType::Triangle)
        };
        self.dirty = true;
    }

    /// Restore the background image the session started with
    pub fn reset_to_background(&mut self) {
        self.pixels.clone_from(&self.background);
        self.dirty = true;
    }

    fn paint_solid(&mut self, shape: &SegmentShape, color: HexColor) {
        let Some((x0, y0, x1, y1)) = self.clip(shape.bounds(0.0, [0.0, 0.0])) else {
            return;
        };
        let rgba = Rgba(color.to_rgba());
        for y in y0..y1 {
            for x in x0..x1 {
                if shape.distance(pixel_centre(x, y)) <= 0.0 {
                    self.pixels.put_pixel(x, y, rgba);
                }
            }
        }
    }

    fn paint_shadow(&mut self, shape: &SegmentShape, shadow: &Shadow) {
        let offset = [shadow.offset_x, shadow.offset_y];
        let Some((x0, y0, x1, y1)) = self.clip(shape.bounds(shadow.blur, offset)) else {
            return;
        };
        let src = shadow.color.to_rgba();
        for y in y0..y1 {
            for x in x0..x1 {
                let [px, py] = pixel_centre(x, y);
                let d = shape.distance([px - offset[0], py - offset[1]]);
                let alpha = if d <= 0.0 {
                    1.0
                } else if shadow.blur > 0.0 {
                    (1.0 - d / shadow.blur).max(0.0)
                } else {
                    0.0
                };
                if alpha > 0.0 {
                    let dst = self.pixels.get_pixel_mut(x, y);
                    blend_over(dst, src, alpha);
                }
            }
        }
    }

    /// Clamp a float bounding box to pixel ranges inside the canvas
    fn clip(&self, (min, max): ([f32; 2], [f32; 2])) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (self.width() as f32, self.height() as f32);
        let x0 = min[0].floor().max(0.0);
        let y0 = min[1].floor().max(0.0);
        let x1 = max[0].ceil().min(w);
        let y1 = max[1].ceil().min(h);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Encode a raster for transmission
pub fn encode_raster(image: &RgbaImage, format: RasterFormat) -> Result<Vec<u8>, CanvasError> {
    let mut bytes = Vec::new();
    match format {
        RasterFormat::Png => {
            image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        }
        RasterFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
        }
    }
    Ok(bytes)
}

impl Shadow {
    /// A shadow hidden exactly under the stroke paints nothing
    fn is_visible(&self) -> bool {
        self.blur > 0.0 || self.offset_x != 0.0 || self.offset_y != 0.0
    }
}

#[inline]
fn pixel_centre(x: u32, y: u32) -> [f32; 2] {
    [x as f32 + 0.5, y as f32 + 0.5]
}

/// Source-over blend of an opaque color at the given coverage
fn blend_over(dst: &mut Rgba<u8>, src: [u8; 4], alpha: f32) {
    let a = alpha.clamp(0.0, 1.0);
    for c in 0..3 {
        let mixed = src[c] as f32 * a + dst.0[c] as f32 * (1.0 - a);
        dst.0[c] = mixed.round() as u8;
    }
    let out_alpha = 255.0 * a + dst.0[3] as f32 * (1.0 - a);
    dst.0[3] = out_alpha.round() as u8;
}

fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

fn length(a: [f32; 2]) -> f32 {
    dot(a, a).sqrt()
}

fn normalize(a: [f32; 2]) -> Option<[f32; 2]> {
    let len = length(a);
    (len > f32::EPSILON).then(|| [a[0] / len, a[1] / len])
}

fn perpendicular(u: [f32; 2]) -> [f32; 2] {
    [-u[1], u[0]]
}

/// Signed distance to an axis-aligned box centred at the origin
fn box_distance(q: [f32; 2], half: [f32; 2]) -> f32 {
    let dx = q[0].abs() - half[0];
    let dy = q[1].abs() - half[1];
    let outside = length([dx.max(0.0), dy.max(0.0)]);
    outside + dx.max(dy).min(0.0)
}

/// Signed distance (exact inside, conservative outside) to a convex polygon
fn convex_distance(points: &[[f32; 2]], p: [f32; 2]) -> f32 {
    let n = points.len();
    let area: f32 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a[0] * b[1] - b[0] * a[1]
        })
        .sum();
    let winding = if area >= 0.0 { 1.0 } else { -1.0 };

    (0..n)
        .filter_map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            let edge = normalize(sub(b, a))?;
            // outward normal for the polygon's winding
            let outward = [edge[1] * winding, -edge[0] * winding];
            Some(dot(sub(p, a), outward))
        })
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Geometry of one segment plus the join with the segment before it
struct SegmentShape {
    from: [f32; 2],
    to: [f32; 2],
    half_width: f32,
    cap: LineCap,
    join: Option<Join>,
}

enum Join {
    Round([f32; 2]),
    Polygon(Vec<[f32; 2]>),
}

impl SegmentShape {
    fn new(segment: &Segment, style: &BrushStyle) -> Self {
        let half_width = style.width / 2.0;
        let join = segment
            .continues_from
            .and_then(|previous| Self::join(previous, segment.from, segment.to, half_width, style.join));
        Self {
            from: segment.from,
            to: segment.to,
            half_width,
            cap: style.cap,
            join,
        }
    }

    fn join(previous: [f32; 2], vertex: [f32; 2], next: [f32; 2], hw: f32, kind: LineJoin) -> Option<Join> {
        let u_in = normalize(sub(vertex, previous))?;
        let u_out = normalize(sub(next, vertex))?;
        if kind == LineJoin::Round {
            return Some(Join::Round(vertex));
        }

        let turn = u_in[0] * u_out[1] - u_in[1] * u_out[0];
        if turn.abs() <= f32::EPSILON {
            return None;
        }
        // the gap opens on the side opposite the turn
        let side = -turn.signum();
        let n_in = perpendicular(u_in);
        let n_out = perpendicular(u_out);
        let outer_in = [vertex[0] + side * n_in[0] * hw, vertex[1] + side * n_in[1] * hw];
        let outer_out = [vertex[0] + side * n_out[0] * hw, vertex[1] + side * n_out[1] * hw];

        if kind == LineJoin::Miter {
            if let Some(bisector) = normalize([n_in[0] + n_out[0], n_in[1] + n_out[1]]) {
                let cos_half = dot(bisector, n_in);
                if cos_half > 0.0 && 1.0 / cos_half <= MITER_LIMIT {
                    let reach = hw / cos_half;
                    let tip = [vertex[0] + side * bisector[0] * reach, vertex[1] + side * bisector[1] * reach];
                    return Some(Join::Polygon(vec![vertex, outer_in, tip, outer_out]));
                }
            }
        }
        Some(Join::Polygon(vec![vertex, outer_in, outer_out]))
    }

    fn body_distance(&self, p: [f32; 2]) -> f32 {
        let hw = self.half_width;
        let Some(u) = normalize(sub(self.to, self.from)) else {
            // zero-length segment: a dot for round caps, a square for square caps
            return match self.cap {
                LineCap::Round => length(sub(p, self.from)) - hw,
                LineCap::Square => box_distance(sub(p, self.from), [hw, hw]),
                LineCap::Butt => f32::INFINITY,
            };
        };
        let len = length(sub(self.to, self.from));
        let rel = sub(p, self.from);
        let along = dot(rel, u);
        let across = dot(rel, perpendicular(u));

        match self.cap {
            LineCap::Round => {
                let t = along.clamp(0.0, len);
                length([along - t, across]) - hw
            }
            LineCap::Butt | LineCap::Square => {
                let extend = if self.cap == LineCap::Square { hw } else { 0.0 };
                let centre = len / 2.0;
                box_distance([along - centre, across], [centre + extend, hw])
            }
        }
    }

    fn distance(&self, p: [f32; 2]) -> f32 {
        let body = self.body_distance(p);
        match &self.join {
            None => body,
            Some(Join::Round(vertex)) => body.min(length(sub(p, *vertex)) - self.half_width),
            Some(Join::Polygon(points)) => body.min(convex_distance(points, p)),
        }
    }

    /// Bounding box grown by `margin` and shifted by `offset`
    fn bounds(&self, margin: f32, offset: [f32; 2]) -> ([f32; 2], [f32; 2]) {
        // square caps reach hw * sqrt(2) from an endpoint, miters at most MITER_LIMIT * hw
        let reach = self.half_width * MITER_LIMIT + margin + 1.0;
        let min = [
            self.from[0].min(self.to[0]) - reach + offset[0],
            self.from[1].min(self.to[1]) - reach + offset[1],
        ];
        let max = [
            self.from[0].max(self.to[0]) + reach + offset[0],
            self.from[1].max(self.to[1]) + reach + offset[1],
        ];
        (min, max)
    }
}
