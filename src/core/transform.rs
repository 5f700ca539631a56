// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Depth-to-color alignment.
//!
//! Reprojects the depth sensor's native-resolution image into the color
//! camera's pixel grid: each valid depth pixel is back projected with the
//! depth intrinsics, moved through the relative depth-to-color pose, and
//! projected with the color intrinsics. Conflicting reprojections keep
//! the closest point (z-buffer). Distortion models are out of scope.

use nalgebra::DMatrix;

use crate::core::calibration::{CalibrationProfile, Intrinsics};
use crate::misc::type_aliases::{Float, Mat3, Point2, Vec3};

/// Alignment of depth images into the color camera viewpoint,
/// built once per recording from its calibration profile.
#[derive(Debug, Clone)]
pub struct DepthToColor {
    /// Rotation from the depth sensor frame to the color sensor frame.
    rotation: Mat3,
    /// Translation from the depth sensor frame to the color sensor frame,
    /// in millimeters.
    translation: Vec3,
    depth_intrinsics: Intrinsics,
    color_intrinsics: Intrinsics,
}

impl DepthToColor {
    /// Compose the relative depth-to-color pose from the per-sensor
    /// extrinsics. With `x_s = R_s * x + t_s` mapping device coordinates
    /// into sensor `s`, the depth-to-color map is
    /// `x_c = (R_c * R_d^T) * x_d + (t_c - R_c * R_d^T * t_d)`.
    pub fn new(calibration: &CalibrationProfile) -> DepthToColor {
        let r_color = &calibration.color.extrinsics.rotation;
        let r_depth = &calibration.depth.extrinsics.rotation;
        let rotation = r_color * r_depth.transpose();
        let translation =
            calibration.color.extrinsics.translation - rotation * calibration.depth.extrinsics.translation;
        DepthToColor {
            rotation,
            translation,
            depth_intrinsics: calibration.depth.intrinsics.clone(),
            color_intrinsics: calibration.color.intrinsics.clone(),
        }
    }

    /// Align a native-resolution depth map into a `width x height` grid
    /// seen from the color camera. Pixels without a depth return stay 0.
    ///
    /// Fails on a degenerate (zero-sized) target grid.
    pub fn align(
        &self,
        depth: &DMatrix<u16>,
        width: usize,
        height: usize,
    ) -> Result<DMatrix<u16>, String> {
        if width == 0 || height == 0 {
            return Err(format!(
                "Cannot align depth into an empty {}x{} target",
                width, height
            ));
        }
        let mut aligned = DMatrix::zeros(height, width);
        for row in 0..depth.nrows() {
            for col in 0..depth.ncols() {
                let d = depth[(row, col)];
                if d == 0 {
                    continue;
                }
                let pixel = Point2::new(col as Float, row as Float);
                let point = self.depth_intrinsics.back_project(pixel, Float::from(d));
                let in_color = self.rotation * point + self.translation;
                if in_color.z <= 0.0 {
                    continue;
                }
                let reprojected = self.color_intrinsics.project(in_color);
                let u = reprojected.x.round();
                let v = reprojected.y.round();
                if u < 0.0 || v < 0.0 || u >= width as Float || v >= height as Float {
                    continue;
                }
                let z = in_color.z.round();
                if z > Float::from(u16::max_value()) {
                    continue;
                }
                let target = &mut aligned[(v as usize, u as usize)];
                if *target == 0 || z < Float::from(*target) {
                    *target = z as u16;
                }
            }
        }
        Ok(aligned)
    }
}

// TESTS #############################################################
