//! Owns the pixel-to-arena homography cache and turns per-frame marker
//! detections into arena-space poses.

use crate::config::ArenaConfig;
use crate::error::{FrameError, Result};
use crate::geometry::{Point2, Rect};
use crate::marker::Marker;
use opencv::core::{Mat, Point2f, Vector, DECOMP_LU};
use opencv::imgproc;
use opencv::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

/// Sentinel returned whenever a pose cannot be established.
pub const SENTINEL_POSE: MarkerPose = MarkerPose {
    x: -1.0,
    y: -1.0,
    theta: -1.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl MarkerPose {
    pub fn is_sentinel(&self) -> bool {
        *self == SENTINEL_POSE
    }
}

/// The cached pixel<->arena mapping. `img_to_arena` and `img_to_crop` are
/// always replaced together; a reader never observes one without the other
/// having been refreshed at the same moment.
#[derive(Clone)]
pub struct ArenaTransform {
    img_to_arena: [[f64; 3]; 3],
    img_to_crop: [[f64; 3]; 3],
    pub computed_at: Instant,
}

impl ArenaTransform {
    fn map(matrix: &[[f64; 3]; 3], p: Point2) -> Point2 {
        let w = matrix[2][0] * p.x + matrix[2][1] * p.y + matrix[2][2];
        let x = (matrix[0][0] * p.x + matrix[0][1] * p.y + matrix[0][2]) / w;
        let y = (matrix[1][0] * p.x + matrix[1][1] * p.y + matrix[1][2]) / w;
        Point2::new(x, y)
    }

    pub fn map_to_arena(&self, p: Point2) -> Point2 {
        Self::map(&self.img_to_arena, p)
    }

    pub fn map_to_crop(&self, p: Point2) -> Point2 {
        Self::map(&self.img_to_crop, p)
    }

    /// Rebuild the crop transform as an OpenCV matrix for `warp_perspective`.
    pub fn crop_matrix(&self) -> Result<Mat> {
        array_to_mat(&self.img_to_crop)
    }
}

fn array_to_mat(arr: &[[f64; 3]; 3]) -> Result<Mat> {
    let flat: Vec<f64> = arr.iter().flatten().copied().collect();
    Mat::from_slice_2d(&[
        &flat[0..3],
        &flat[3..6],
        &flat[6..9],
    ])
    .map_err(|e| {
        FrameError::Homography {
            details: format!("failed to rebuild crop matrix: {e}"),
        }
        .into()
    })
}

fn mat_to_array(mat: &Mat) -> Result<[[f64; 3]; 3]> {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = *mat
                .at_2d::<f64>(r as i32, c as i32)
                .map_err(|e| FrameError::Homography {
                    details: format!("failed to read transform element ({r},{c}): {e}"),
                })?;
        }
    }
    Ok(out)
}

fn solve_perspective(src: &[Point2; 4], dst: &[Point2; 4]) -> Result<[[f64; 3]; 3]> {
    let to_vec = |pts: &[Point2; 4]| -> Vector<Point2f> {
        pts.iter()
            .map(|p| Point2f::new(p.x as f32, p.y as f32))
            .collect()
    };
    let mat = imgproc::get_perspective_transform(&to_vec(src), &to_vec(dst), DECOMP_LU)
        .map_err(|e| FrameError::Homography {
            details: format!("get_perspective_transform failed: {e}"),
        })?;
    mat_to_array(&mat)
}

/// Owns the transform cache and the most recently processed frame's markers.
pub struct ArenaMapper {
    config: ArenaConfig,
    transform: Option<ArenaTransform>,
    last_markers: BTreeMap<i32, Marker>,
    arena_bounds: Rect,
}

impl ArenaMapper {
    pub fn new(config: ArenaConfig) -> Self {
        let arena_bounds = Rect::from_corners(&config.world_corners);
        Self {
            config,
            transform: None,
            last_markers: BTreeMap::new(),
            arena_bounds,
        }
    }

    pub fn transform(&self) -> Option<&ArenaTransform> {
        self.transform.as_ref()
    }

    /// Run the transform-refresh rule and stash the frame's markers for
    /// subsequent `pose_of`/`seen` calls.
    pub fn process(&mut self, markers: BTreeMap<i32, Marker>) -> Result<()> {
        let corner_ids = [
            self.config.ids.bl,
            self.config.ids.tl,
            self.config.ids.tr,
            self.config.ids.br,
        ];
        let all_present = corner_ids.iter().all(|id| markers.contains_key(id));

        let refresh_due = match &self.transform {
            None => true,
            Some(t) => t.computed_at.elapsed().as_secs_f64() >= self.config.crop_refresh_seconds,
        };

        if all_present && refresh_due {
            self.refresh_transform(&markers, corner_ids)?;
        }

        self.last_markers = markers;
        Ok(())
    }

    fn refresh_transform(
        &mut self,
        markers: &BTreeMap<i32, Marker>,
        corner_ids: [i32; 4],
    ) -> Result<()> {
        let bl = &markers[&corner_ids[0]];
        let tl = &markers[&corner_ids[1]];
        let tr = &markers[&corner_ids[2]];
        let br = &markers[&corner_ids[3]];

        // imgToArena: each corner marker's BL pixel maps to the physical
        // arena corner, in TL, TR, BR, BL order on both sides.
        let src_origins = [
            tl.bottom_left(),
            tr.bottom_left(),
            br.bottom_left(),
            bl.bottom_left(),
        ];
        let dst_arena: [Point2; 4] = {
            let c = &self.config.world_corners;
            [
                Point2::new(c[1].0, c[1].1),
                Point2::new(c[2].0, c[2].1),
                Point2::new(c[3].0, c[3].1),
                Point2::new(c[0].0, c[0].1),
            ]
        };
        let img_to_arena = solve_perspective(&src_origins, &dst_arena)?;

        // imgToCrop: outward-most corner of each corner marker, radially
        // expanded away from the quad centroid, then a small vertical dilation.
        let outer = [
            tl.top_left(),
            tr.top_right(),
            br.bottom_right(),
            bl.bottom_left(),
        ];
        let centroid = Point2::centroid(&outer);
        let mean_edge = {
            let mut total = 0.0;
            for m in [tl, tr, br, bl] {
                total += m.top_left().distance(&m.top_right());
            }
            total / 4.0
        };
        let border = mean_edge * self.config.border_marker_fraction;
        let mut expanded: [Point2; 4] = outer.map(|p| p.expand_from(&centroid, border));

        let pad = self.config.output_height as f64 * self.config.vertical_padding_fraction;
        expanded[0].y -= pad;
        expanded[1].y -= pad;
        expanded[2].y += pad;
        expanded[3].y += pad;

        let (w, h) = (self.config.output_width as f64, self.config.output_height as f64);
        let dst_crop = [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ];
        let img_to_crop = solve_perspective(&expanded, &dst_crop)?;

        self.transform = Some(ArenaTransform {
            img_to_arena,
            img_to_crop,
            computed_at: Instant::now(),
        });
        Ok(())
    }

    pub fn seen(&self, id: i32) -> bool {
        self.last_markers.contains_key(&id)
    }

    /// Arena-space pose for a marker seen in the most recently processed
    /// frame, or the sentinel if it wasn't seen or its origin falls outside
    /// the configured arena rectangle.
    pub fn pose_of(&self, id: i32) -> MarkerPose {
        let Some(transform) = &self.transform else {
            return SENTINEL_POSE;
        };
        let Some(marker) = self.last_markers.get(&id) else {
            return SENTINEL_POSE;
        };

        let arena_xy = transform.map_to_arena(marker.bottom_left());
        if !self.arena_bounds.contains(&arena_xy) {
            return SENTINEL_POSE;
        }

        let tl_arena = transform.map_to_arena(marker.top_left());
        let theta = (tl_arena.y - arena_xy.y).atan2(tl_arena.x - arena_xy.x);

        MarkerPose {
            x: arena_xy.x,
            y: arena_xy.y,
            theta,
        }
    }

    pub fn markers(&self) -> &BTreeMap<i32, Marker> {
        &self.last_markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CornerIds;

    fn test_config() -> ArenaConfig {
        ArenaConfig {
            ids: CornerIds {
                bl: 0,
                tl: 1,
                tr: 2,
                br: 3,
            },
            world_corners: [(0.0, 0.0), (0.0, 2.0), (4.0, 2.0), (4.0, 0.0)],
            crop_refresh_seconds: 600.0,
            border_marker_fraction: 0.5,
            output_width: 1000,
            output_height: 500,
            vertical_padding_fraction: 0.01,
            jpeg_quality: crate::config::JpegQualityConfig {
                overlay: 80,
                crop: 75,
            },
        }
    }

    fn square_marker(id: i32, bl: Point2, edge: f64) -> Marker {
        Marker {
            id,
            corners: [
                Point2::new(bl.x, bl.y - edge),
                Point2::new(bl.x + edge, bl.y - edge),
                Point2::new(bl.x + edge, bl.y),
                bl,
            ],
            center: Point2::new(bl.x + edge / 2.0, bl.y - edge / 2.0),
        }
    }

    #[test]
    fn no_transform_yields_sentinel() {
        let mapper = ArenaMapper::new(test_config());
        assert_eq!(mapper.pose_of(42), SENTINEL_POSE);
    }

    #[test]
    fn transform_established_and_center_maps_near_expected_arena_point() {
        let mut mapper = ArenaMapper::new(test_config());
        let mut markers = BTreeMap::new();
        markers.insert(0, square_marker(0, Point2::new(100.0, 400.0), 20.0));
        markers.insert(1, square_marker(1, Point2::new(100.0, 50.0), 20.0));
        markers.insert(2, square_marker(2, Point2::new(540.0, 50.0), 20.0));
        markers.insert(3, square_marker(3, Point2::new(540.0, 400.0), 20.0));
        markers.insert(42, square_marker(42, Point2::new(320.0, 225.0), 20.0));

        mapper.process(markers).unwrap();
        assert!(mapper.transform().is_some());

        let pose = mapper.pose_of(42);
        assert!(!pose.is_sentinel());
        assert!((pose.x - 2.0).abs() < 0.05, "x was {}", pose.x);
        assert!((pose.y - 1.0).abs() < 0.05, "y was {}", pose.y);
    }

    #[test]
    fn cache_survives_a_missing_corner_marker() {
        let mut mapper = ArenaMapper::new(test_config());
        let mut markers = BTreeMap::new();
        markers.insert(0, square_marker(0, Point2::new(100.0, 400.0), 20.0));
        markers.insert(1, square_marker(1, Point2::new(100.0, 50.0), 20.0));
        markers.insert(2, square_marker(2, Point2::new(540.0, 50.0), 20.0));
        markers.insert(3, square_marker(3, Point2::new(540.0, 400.0), 20.0));
        mapper.process(markers).unwrap();
        let computed_at = mapper.transform().unwrap().computed_at;

        // id 2 vanishes; cache must be preserved, not cleared.
        let mut markers = BTreeMap::new();
        markers.insert(0, square_marker(0, Point2::new(100.0, 400.0), 20.0));
        markers.insert(1, square_marker(1, Point2::new(100.0, 50.0), 20.0));
        markers.insert(3, square_marker(3, Point2::new(540.0, 400.0), 20.0));
        mapper.process(markers).unwrap();

        assert_eq!(mapper.transform().unwrap().computed_at, computed_at);
    }

    #[test]
    fn unknown_marker_is_not_seen() {
        let mapper = ArenaMapper::new(test_config());
        assert!(!mapper.seen(99));
    }
}
