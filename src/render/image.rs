//! Composite match visualization using tiny-skia
//!
//! These functions build the side-by-side canvas and draw connectors
//! onto an RgbaImage for saving to disk.

use std::io;

use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use tiny_skia::{LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

use super::geometry::{connector, palette_color};

/// A line between a keypoint in the left image and one in the right image.
/// Both ends are in the coordinates of their own source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connector {
    pub from: (f32, f32),
    pub to: (f32, f32),
}

/// Convert RgbaImage to Pixmap, apply drawing function, and copy back
fn with_pixmap(img: &mut RgbaImage, f: impl FnOnce(&mut Pixmap)) {
    let (w, h) = (img.width(), img.height());
    let Some(size) = tiny_skia::IntSize::from_wh(w, h) else {
        return;
    };
    let Some(mut pixmap) = Pixmap::from_vec(img.as_raw().clone(), size) else {
        return;
    };

    f(&mut pixmap);

    // Copy back
    img.copy_from_slice(pixmap.data());
}

/// Place `left` and `right` next to each other on an opaque black canvas
pub fn side_by_side(left: &GrayImage, right: &GrayImage) -> RgbaImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    let left_rgba = DynamicImage::ImageLuma8(left.clone()).to_rgba8();
    let right_rgba = DynamicImage::ImageLuma8(right.clone()).to_rgba8();
    image::imageops::overlay(&mut canvas, &left_rgba, 0, 0);
    image::imageops::overlay(&mut canvas, &right_rgba, i64::from(left.width()), 0);

    canvas
}

/// Draw one colored connector per match, shifting right-hand ends by `right_offset`
pub fn draw_connectors(img: &mut RgbaImage, right_offset: f32, connectors: &[Connector]) {
    if connectors.is_empty() {
        return;
    }

    with_pixmap(img, |pixmap| {
        let stroke = Stroke {
            width: connector::THICKNESS,
            line_cap: LineCap::Round,
            ..Default::default()
        };

        for (index, c) in connectors.iter().enumerate() {
            let [r, g, b] = palette_color(index);
            let mut paint = Paint::default();
            paint.set_color_rgba8(r, g, b, 255);
            paint.anti_alias = true;

            let (x0, y0) = c.from;
            let (x1, y1) = (c.to.0 + right_offset, c.to.1);

            let mut pb = PathBuilder::new();
            pb.move_to(x0, y0);
            pb.line_to(x1, y1);
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }

            for (cx, cy) in [(x0, y0), (x1, y1)] {
                if let Some(circle) = PathBuilder::from_circle(cx, cy, connector::ENDPOINT_RADIUS)
                {
                    pixmap.stroke_path(&circle, &paint, &stroke, Transform::identity(), None);
                }
            }
        }
    });
}

fn write_png<W: io::Write>(w: W, image: &RgbaImage) -> Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(w, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())
}

/// Encode `image` as PNG into `w`
pub fn encode_png<W: io::Write>(w: W, image: &RgbaImage) -> io::Result<()> {
    write_png(w, image).map_err(io::Error::other)
}
