//! Fiducial detection: wraps OpenCV's ArUco module behind the domain's own
//! `Marker` type so the rest of the system never touches `opencv` directly.

use crate::error::{FrameError, Result};
use crate::geometry::Point2;
use opencv::core::{Mat, Point2f, Vector};
use opencv::objdetect::{
    get_predefined_dictionary, ArucoDetector, DetectorParameters, PredefinedDictionaryType,
    RefineParameters,
};
use opencv::prelude::*;
use std::collections::BTreeMap;

/// A detected fiducial in one frame. Corners are canonicalised to
/// TL, TR, BR, BL regardless of what order OpenCV returned them in.
#[derive(Debug, Clone)]
pub struct Marker {
    pub id: i32,
    pub corners: [Point2; 4],
    pub center: Point2,
}

impl Marker {
    fn from_raw_corners(id: i32, raw: [Point2; 4]) -> Self {
        Self {
            id,
            center: Point2::centroid(&raw),
            corners: raw,
        }
    }

    pub fn top_left(&self) -> Point2 {
        self.corners[0]
    }
    pub fn top_right(&self) -> Point2 {
        self.corners[1]
    }
    pub fn bottom_right(&self) -> Point2 {
        self.corners[2]
    }
    pub fn bottom_left(&self) -> Point2 {
        self.corners[3]
    }
}

/// Decodes 4x4 (dictionary size 1000) fiducials out of a BGR frame.
pub struct MarkerDetector {
    detector: ArucoDetector,
}

impl MarkerDetector {
    pub fn new() -> Result<Self> {
        let dictionary = get_predefined_dictionary(PredefinedDictionaryType::DICT_4X4_1000)
            .map_err(|e| FrameError::Detection {
                details: format!("failed to load dictionary: {e}"),
            })?;

        let mut params = DetectorParameters::default().map_err(|e| FrameError::Detection {
            details: format!("failed to create detector params: {e}"),
        })?;
        params.set_adaptive_thresh_win_size_min(3);
        params.set_adaptive_thresh_win_size_max(23);
        params.set_adaptive_thresh_win_size_step(10);

        let refine = RefineParameters {
            min_rep_distance: 10.0,
            error_correction_rate: 3.0,
            check_all_orders: false,
        };

        let detector = ArucoDetector::new(&dictionary, &params, refine)
            .map_err(|e| FrameError::Detection {
                details: format!("failed to construct detector: {e}"),
            })?;

        Ok(Self { detector })
    }

    /// Detect markers in a decoded BGR image. Duplicate ids keep the first
    /// occurrence; ids the dictionary rejects are simply absent from OpenCV's
    /// output and never appear here.
    pub fn detect(&mut self, bgr: &Mat) -> Result<BTreeMap<i32, Marker>> {
        let mut corners: Vector<Vector<Point2f>> = Vector::new();
        let mut ids: Vector<i32> = Vector::new();
        let mut rejected: Vector<Vector<Point2f>> = Vector::new();

        self.detector
            .detect_markers(bgr, &mut corners, &mut ids, &mut rejected)
            .map_err(|e| FrameError::Detection {
                details: format!("detect_markers failed: {e}"),
            })?;

        let mut markers = BTreeMap::new();
        for (i, id) in ids.iter().enumerate() {
            if markers.contains_key(&id) {
                continue;
            }
            let quad = corners.get(i).map_err(|e| FrameError::Detection {
                details: format!("missing corner set for detection {i}: {e}"),
            })?;
            if quad.len() != 4 {
                continue;
            }
            let raw = canonicalise_corners(&quad);
            markers.insert(id, Marker::from_raw_corners(id, raw));
        }

        Ok(markers)
    }
}

/// OpenCV's ArUco already returns corners in TL, TR, BR, BL order for an
/// upright marker; this re-asserts that invariant explicitly rather than
/// trusting it silently, since overlay and pose math both depend on it.
fn canonicalise_corners(quad: &Vector<Point2f>) -> [Point2; 4] {
    let mut out = [Point2::new(0.0, 0.0); 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let p = quad.get(i).unwrap_or_default();
        *slot = Point2::new(p.x as f64, p.y as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalise_corners_preserves_tl_tr_br_bl_order() {
        let mut v: Vector<Point2f> = Vector::new();
        v.push(Point2f::new(0.0, 0.0));
        v.push(Point2f::new(10.0, 0.0));
        v.push(Point2f::new(10.0, 10.0));
        v.push(Point2f::new(0.0, 10.0));
        let out = canonicalise_corners(&v);
        assert_eq!(out[0], Point2::new(0.0, 0.0));
        assert_eq!(out[1], Point2::new(10.0, 0.0));
        assert_eq!(out[2], Point2::new(10.0, 10.0));
        assert_eq!(out[3], Point2::new(0.0, 10.0));
    }

    #[test]
    fn marker_center_is_mean_of_corners() {
        let raw = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let marker = Marker::from_raw_corners(5, raw);
        assert_eq!(marker.center, Point2::new(5.0, 5.0));
        assert_eq!(marker.bottom_left(), Point2::new(0.0, 10.0));
    }
}
