//! Draws marker boxes, heading arrows and ids onto both the full frame and
//! the rectified crop, then JPEG-encodes each for the frame bus.

use crate::arena::ArenaTransform;
use crate::config::JpegQualityConfig;
use crate::error::{FrameError, Result};
use crate::geometry::Point2;
use crate::marker::Marker;
use opencv::core::{Point, Scalar, Size, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;
use std::collections::BTreeMap;

const GREEN: Scalar = Scalar::new(0.0, 255.0, 0.0, 0.0);
const RED: Scalar = Scalar::new(0.0, 0.0, 255.0, 0.0);
const ORIGIN_BOX_HALF_SIZE_PX: i32 = 4;
const BOX_THICKNESS: i32 = 2;

pub struct OverlayRenderer {
    quality: JpegQualityConfig,
    crop_size: Size,
}

/// The two JPEG-encoded outputs produced for one processed frame.
pub struct OverlayOutputs {
    pub overlay_jpeg: Vec<u8>,
    pub crop_jpeg: Option<Vec<u8>>,
}

impl OverlayRenderer {
    pub fn new(quality: JpegQualityConfig, output_width: u32, output_height: u32) -> Self {
        Self {
            quality,
            crop_size: Size::new(output_width as i32, output_height as i32),
        }
    }

    pub fn render(
        &self,
        bgr: &Mat,
        markers: &BTreeMap<i32, Marker>,
        transform: Option<&ArenaTransform>,
    ) -> Result<OverlayOutputs> {
        let mut overlay = bgr.try_clone().map_err(|e| FrameError::JpegEncode {
            details: format!("failed to clone frame for overlay: {e}"),
        })?;
        for marker in markers.values() {
            draw_marker(&mut overlay, marker)?;
        }
        let overlay_jpeg = encode_jpeg(&overlay, self.quality.overlay)?;

        let crop_jpeg = match transform {
            Some(t) => Some(self.render_crop(bgr, markers, t)?),
            None => None,
        };

        Ok(OverlayOutputs {
            overlay_jpeg,
            crop_jpeg,
        })
    }

    fn render_crop(
        &self,
        bgr: &Mat,
        markers: &BTreeMap<i32, Marker>,
        transform: &ArenaTransform,
    ) -> Result<Vec<u8>> {
        let crop_matrix = transform.crop_matrix()?;
        let mut warped = Mat::default();
        imgproc::warp_perspective(
            bgr,
            &mut warped,
            &crop_matrix,
            self.crop_size,
            imgproc::INTER_LINEAR,
            opencv::core::BORDER_CONSTANT,
            Scalar::default(),
        )
        .map_err(|e| FrameError::JpegEncode {
            details: format!("warp_perspective failed: {e}"),
        })?;

        for marker in markers.values() {
            let warped_marker = Marker {
                id: marker.id,
                center: transform.map_to_crop(marker.center),
                corners: [
                    transform.map_to_crop(marker.top_left()),
                    transform.map_to_crop(marker.top_right()),
                    transform.map_to_crop(marker.bottom_right()),
                    transform.map_to_crop(marker.bottom_left()),
                ],
            };
            draw_marker(&mut warped, &warped_marker)?;
        }

        encode_jpeg(&warped, self.quality.crop)
    }
}

fn to_cv_point(p: Point2) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

fn draw_marker(img: &mut Mat, marker: &Marker) -> Result<()> {
    let pts: Vector<Point> = marker.corners.iter().map(|p| to_cv_point(*p)).collect();
    let contours: Vector<Vector<Point>> = Vector::from_iter([pts]);
    imgproc::polylines(img, &contours, true, GREEN, BOX_THICKNESS, imgproc::LINE_8, 0)
        .map_err(draw_err)?;

    let origin = to_cv_point(marker.bottom_left());
    let heading = to_cv_point(marker.top_left());
    imgproc::arrowed_line(
        img,
        origin,
        heading,
        RED,
        BOX_THICKNESS,
        imgproc::LINE_8,
        0,
        0.25,
    )
    .map_err(draw_err)?;

    imgproc::rectangle(
        img,
        opencv::core::Rect::new(
            origin.x - ORIGIN_BOX_HALF_SIZE_PX,
            origin.y - ORIGIN_BOX_HALF_SIZE_PX,
            ORIGIN_BOX_HALF_SIZE_PX * 2,
            ORIGIN_BOX_HALF_SIZE_PX * 2,
        ),
        RED,
        BOX_THICKNESS,
        imgproc::LINE_8,
        0,
    )
    .map_err(draw_err)?;

    let center = to_cv_point(marker.center);
    imgproc::put_text(
        img,
        &marker.id.to_string(),
        Point::new(center.x + 6, center.y - 6),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        GREEN,
        2,
        imgproc::LINE_AA,
        false,
    )
    .map_err(draw_err)?;

    Ok(())
}

fn draw_err(e: opencv::Error) -> crate::error::AppError {
    FrameError::JpegEncode {
        details: format!("overlay draw failed: {e}"),
    }
    .into()
}

fn encode_jpeg(img: &Mat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vector::new();
    let params: Vector<i32> = Vector::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, quality as i32]);
    imgcodecs::imencode(".jpg", img, &mut buf, &params).map_err(|e| FrameError::JpegEncode {
        details: format!("imencode failed: {e}"),
    })?;
    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_cv_point_rounds_to_nearest_pixel() {
        let p = to_cv_point(Point2::new(1.6, 2.4));
        assert_eq!(p.x, 2);
        assert_eq!(p.y, 2);
    }
}
