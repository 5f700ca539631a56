// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera calibration data model for a recorded RGB-D session.
//!
//! A recording carries one fixed `CalibrationProfile` with the intrinsic
//! and extrinsic parameters of both the color and the depth sensor.
//! Its `Display` implementation is the calibration report printed at
//! startup for operator inspection.

use itertools::Itertools;
use std::fmt;

use crate::misc::type_aliases::{Float, Mat3, Point2, Point3, Vec3};

/// Full calibration of a recording: one entry per sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProfile {
    /// Calibration of the color sensor.
    pub color: SensorCalibration,
    /// Calibration of the depth sensor.
    pub depth: SensorCalibration,
}

/// Intrinsic and extrinsic parameters of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCalibration {
    pub intrinsics: Intrinsics,
    pub extrinsics: Extrinsics,
}

/// Intrinsic parameter vector of one sensor.
///
/// Parameters are ordered `cx cy fx fy ...` as in the device firmware.
/// Entries past the fourth are distortion coefficients, reported as-is
/// but unused since distortion correction is out of scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Intrinsics {
    parameters: Vec<Float>,
}

impl Intrinsics {
    /// Build intrinsics from the raw parameter vector.
    /// Fails if the pinhole part (`cx cy fx fy`) is incomplete.
    pub fn new(parameters: Vec<Float>) -> Result<Intrinsics, String> {
        if parameters.len() < 4 {
            Err(format!(
                "An intrinsics parameter vector needs at least 4 entries, got {}",
                parameters.len()
            ))
        } else {
            Ok(Intrinsics { parameters })
        }
    }

    /// The raw parameter vector.
    pub fn parameters(&self) -> &[Float] {
        &self.parameters
    }

    /// Principal point (cx, cy) in pixels.
    pub fn principal_point(&self) -> (Float, Float) {
        (self.parameters[0], self.parameters[1])
    }

    /// Focal lengths (fx, fy) in pixels.
    pub fn focal(&self) -> (Float, Float) {
        (self.parameters[2], self.parameters[3])
    }

    /// Project a 3D point in the sensor frame onto the pixel grid.
    pub fn project(&self, point: Point3) -> Point2 {
        let (cx, cy) = self.principal_point();
        let (fx, fy) = self.focal();
        Point2::new(
            fx * point.x / point.z + cx,
            fy * point.y / point.z + cy,
        )
    }

    /// Back project a pixel at a given depth into the sensor frame.
    /// Inverse operation of `project`.
    pub fn back_project(&self, pixel: Point2, depth: Float) -> Point3 {
        let (cx, cy) = self.principal_point();
        let (fx, fy) = self.focal();
        let z = depth;
        Point3::new((pixel.x - cx) * z / fx, (pixel.y - cy) * z / fy, z)
    }
}

/// Extrinsic parameters of one sensor: a rotation and a translation
/// mapping device reference coordinates into the sensor frame.
/// Translation is in millimeters, like the depth samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Extrinsics {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Extrinsics {
    pub fn new(rotation: Mat3, translation: Vec3) -> Extrinsics {
        Extrinsics {
            rotation,
            translation,
        }
    }

    /// Identity extrinsics: the sensor frame is the device frame.
    pub fn identity() -> Extrinsics {
        Extrinsics::new(Mat3::identity(), Vec3::zeros())
    }

    /// Build extrinsics from 12 values: the row major 3x3 rotation
    /// followed by the translation.
    pub fn from_row_major(values: &[Float]) -> Result<Extrinsics, String> {
        if values.len() != 12 {
            Err(format!(
                "An extrinsics line needs 12 values (9 rotation + 3 translation), got {}",
                values.len()
            ))
        } else {
            Ok(Extrinsics::new(
                Mat3::from_row_slice(&values[0..9]),
                Vec3::new(values[9], values[10], values[11]),
            ))
        }
    }

    /// Move a point from the device frame into the sensor frame.
    pub fn transform(&self, point: Point3) -> Point3 {
        self.rotation * point + self.translation
    }
}

// CALIBRATION REPORT ################################################

/// The calibration report printed at startup:
/// one line per intrinsics parameter vector, and the row major rotation
/// of each extrinsics with each row followed by its translation component.
impl fmt::Display for CalibrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_sensor(f, "RGB", &self.color)?;
        write_sensor(f, "Depth", &self.depth)
    }
}

fn write_sensor(f: &mut fmt::Formatter, name: &str, sensor: &SensorCalibration) -> fmt::Result {
    writeln!(f, "{} Camera Intrinsics:", name)?;
    writeln!(f, "{}", sensor.intrinsics.parameters().iter().format(" "))?;
    writeln!(f, "{} Camera Extrinsics:", name)?;
    let rotation = &sensor.extrinsics.rotation;
    let translation = &sensor.extrinsics.translation;
    for row in 0..3 {
        writeln!(
            f,
            "{:>10.6} {:>10.6} {:>10.6} {:>10.6}",
            rotation[(row, 0)],
            rotation[(row, 1)],
            rotation[(row, 2)],
            translation[row],
        )?;
    }
    Ok(())
}

// TESTS #############################################################
