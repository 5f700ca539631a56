// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contract of a recorded RGB-D session reader.
//!
//! A recording is an ordered, finite stream of `Capture` units and a
//! separate ordered, finite stream of `ImuSample` units, plus one fixed
//! `CalibrationProfile`. Both streams answer "next element" with
//! `Ok(Some(..))`, end of file with `Ok(None)`, and anything else with a
//! `Stream` error.

use nalgebra::DMatrix;

use crate::core::calibration::CalibrationProfile;
use crate::core::export::ExportError;
use crate::misc::type_aliases::Vec3;

/// One synchronized set of sensor images emitted by the capture stream.
/// Either image may be absent from a given capture.
#[derive(Debug, Clone)]
pub struct Capture {
    pub color: Option<ColorImage>,
    pub depth: Option<DepthImage>,
}

/// A color image as stored in the recording: the still-compressed byte
/// buffer and the device timestamp in microseconds.
/// A zero timestamp is the "missing" sentinel.
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub timestamp_usec: u64,
    pub data: Vec<u8>,
}

/// A native-resolution depth image, in millimeters, 0 meaning no return.
#[derive(Debug, Clone)]
pub struct DepthImage {
    pub timestamp_usec: u64,
    pub map: DMatrix<u16>,
}

/// One accelerometer + gyroscope reading pair with independent timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuSample {
    pub acc_timestamp_usec: u64,
    pub acc: Vec3,
    pub gyro_timestamp_usec: u64,
    pub gyro: Vec3,
}

/// Write an ImuSample as one motion log line.
impl std::string::ToString for ImuSample {
    /// `accTs ax ay az gyroTs gx gy gz`
    fn to_string(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {}",
            self.acc_timestamp_usec,
            self.acc.x,
            self.acc.y,
            self.acc.z,
            self.gyro_timestamp_usec,
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
        )
    }
}

/// A recorded RGB-D session, opened once and read sequentially.
pub trait Recording {
    /// The calibration profile, fixed for the whole recording.
    fn calibration(&self) -> &CalibrationProfile;

    /// Total recording length in microseconds.
    fn length_usec(&self) -> u64;

    /// Position both streams at the first element whose timestamp is at
    /// least `offset_usec` after the beginning of the recording.
    fn seek(&mut self, offset_usec: u64) -> Result<(), ExportError>;

    /// Fetch the next capture. `Ok(None)` is end of stream.
    fn next_capture(&mut self) -> Result<Option<Capture>, ExportError>;

    /// Fetch the next inertial sample. `Ok(None)` is end of stream.
    fn next_imu_sample(&mut self) -> Result<Option<ImuSample>, ExportError>;
}

// TESTS #############################################################
