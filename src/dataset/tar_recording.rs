// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Recording reader for tar-archived RGB-D sessions.
//!
//! A session archive holds four kinds of entries:
//! - `captures.txt`: one line per capture,
//!   `color_ts color_path depth_ts depth_path`,
//!   where a `-` path means the image is absent from that capture;
//! - `calibration.txt`: four value lines (color intrinsics vector,
//!   color extrinsics, depth intrinsics vector, depth extrinsics);
//! - `imu.txt`: one line per inertial sample,
//!   `accTs ax ay az gyroTs gx gy gz`;
//! - the image entries referenced by the index: compressed color images
//!   and 16 bits gray png depth images at native sensor resolution.
//!
//! Timestamps are device microseconds. Lines starting with `#` are
//! comments. The whole archive is read into memory at open time.

use nalgebra::DMatrix;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::core::calibration::CalibrationProfile;
use crate::core::export::ExportError;
use crate::core::recording::{Capture, ColorImage, DepthImage, ImuSample, Recording};
use crate::misc::helper;

/// One line of the capture index.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEntry {
    pub color_timestamp_usec: u64,
    pub color_path: Option<String>,
    pub depth_timestamp_usec: u64,
    pub depth_path: Option<String>,
}

impl CaptureEntry {
    /// Timestamp used to order and seek the capture stream.
    /// A capture without a color image is keyed by its depth timestamp:
    /// the capture is placed by an image it actually carries.
    fn key_timestamp(&self) -> u64 {
        if self.color_path.is_some() {
            self.color_timestamp_usec
        } else {
            self.depth_timestamp_usec
        }
    }
}

/// A tar-archived session, fully loaded in memory.
pub struct TarRecording {
    calibration: CalibrationProfile,
    captures: Vec<CaptureEntry>,
    samples: Vec<ImuSample>,
    entries: HashMap<String, Vec<u8>>,
    capture_cursor: usize,
    imu_cursor: usize,
    first_usec: u64,
    last_usec: u64,
}

impl TarRecording {
    /// Open a session archive from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TarRecording, ExportError> {
        let file = File::open(path).map_err(|err| ExportError::Open(err.to_string()))?;
        TarRecording::from_reader(file)
    }

    /// Open a session archive from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<TarRecording, ExportError> {
        // Read every archive entry into a name -> bytes map.
        let mut archive = tar::Archive::new(reader);
        let mut entries = HashMap::new();
        let archive_entries = archive
            .entries()
            .map_err(|err| ExportError::Open(err.to_string()))?;
        for entry in archive_entries {
            let mut entry = entry.map_err(|err| ExportError::Open(err.to_string()))?;
            let name = entry
                .header()
                .path()
                .map_err(|err| ExportError::Open(err.to_string()))?
                .to_string_lossy()
                .into_owned();
            let size = entry.header().size().unwrap_or(0);
            let mut buffer = Vec::with_capacity(size as usize);
            entry
                .read_to_end(&mut buffer)
                .map_err(|err| ExportError::Open(err.to_string()))?;
            entries.insert(name, buffer);
        }

        let calibration = parse::calibration(&text_entry(&entries, "calibration.txt")?)
            .map_err(ExportError::Open)?;
        let captures =
            parse::captures(&text_entry(&entries, "captures.txt")?).map_err(ExportError::Open)?;
        let samples =
            parse::imu_samples(&text_entry(&entries, "imu.txt")?).map_err(ExportError::Open)?;

        let first_usec = min_option(
            captures.first().map(CaptureEntry::key_timestamp),
            samples.first().map(|s| s.acc_timestamp_usec),
        );
        let last_usec = max_option(
            captures.last().map(CaptureEntry::key_timestamp),
            samples.last().map(|s| s.acc_timestamp_usec),
        );
        Ok(TarRecording {
            calibration,
            captures,
            samples,
            entries,
            capture_cursor: 0,
            imu_cursor: 0,
            first_usec,
            last_usec,
        })
    }

    fn image_bytes(&self, path: &str) -> Result<&Vec<u8>, ExportError> {
        self.entries
            .get(path)
            .ok_or_else(|| ExportError::Stream(format!("Recording has no entry {}", path)))
    }
}

fn text_entry(entries: &HashMap<String, Vec<u8>>, name: &str) -> Result<String, ExportError> {
    let bytes = entries
        .get(name)
        .ok_or_else(|| ExportError::Open(format!("Recording has no {} entry", name)))?;
    String::from_utf8(bytes.clone())
        .map_err(|err| ExportError::Open(format!("{} is not valid text: {}", name, err)))
}

fn min_option(a: Option<u64>, b: Option<u64>) -> u64 {
    match (a, b) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 0,
    }
}

fn max_option(a: Option<u64>, b: Option<u64>) -> u64 {
    match (a, b) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 0,
    }
}

impl Recording for TarRecording {
    fn calibration(&self) -> &CalibrationProfile {
        &self.calibration
    }

    fn length_usec(&self) -> u64 {
        self.last_usec.saturating_sub(self.first_usec)
    }

    fn seek(&mut self, offset_usec: u64) -> Result<(), ExportError> {
        let target = self.first_usec + offset_usec;
        self.capture_cursor = self
            .captures
            .iter()
            .position(|c| c.key_timestamp() >= target)
            .unwrap_or_else(|| self.captures.len());
        self.imu_cursor = self
            .samples
            .iter()
            .position(|s| s.acc_timestamp_usec >= target)
            .unwrap_or_else(|| self.samples.len());
        Ok(())
    }

    fn next_capture(&mut self) -> Result<Option<Capture>, ExportError> {
        let entry = match self.captures.get(self.capture_cursor) {
            None => return Ok(None),
            Some(entry) => entry.clone(),
        };
        self.capture_cursor += 1;

        let color = match entry.color_path {
            None => None,
            Some(path) => Some(ColorImage {
                timestamp_usec: entry.color_timestamp_usec,
                data: self.image_bytes(&path)?.clone(),
            }),
        };
        let depth = match entry.depth_path {
            None => None,
            Some(path) => {
                let bytes = self.image_bytes(&path)?;
                let (w, h, values) = helper::read_png_16bits(Cursor::new(bytes))
                    .map_err(|err| ExportError::Stream(format!("Bad depth image {}: {:?}", path, err)))?;
                Some(DepthImage {
                    timestamp_usec: entry.depth_timestamp_usec,
                    map: DMatrix::from_row_slice(h, w, values.as_slice()),
                })
            }
        };
        Ok(Some(Capture { color, depth }))
    }

    fn next_imu_sample(&mut self) -> Result<Option<ImuSample>, ExportError> {
        let next = self.samples.get(self.imu_cursor).cloned();
        self.imu_cursor += 1;
        Ok(next)
    }
}

/// Parse the text entries of a session archive.
pub mod parse {
    use super::CaptureEntry;
    use crate::core::calibration::{
        CalibrationProfile, Extrinsics, Intrinsics, SensorCalibration,
    };
    use crate::core::recording::ImuSample;
    use crate::misc::type_aliases::{Float, Vec3};
    use nom::{
        alt, anychar, do_parse, double, float, is_not, many0, map, named, space, tag,
        types::CompleteStr,
    };

    /// Parse the capture index into a vector of `CaptureEntry`.
    pub fn captures(file_content: &str) -> Result<Vec<CaptureEntry>, String> {
        multi_line(capture_line, file_content)
    }

    /// Parse the inertial sample file into a vector of `ImuSample`.
    pub fn imu_samples(file_content: &str) -> Result<Vec<ImuSample>, String> {
        multi_line(imu_line, file_content)
    }

    /// Parse the calibration file into a `CalibrationProfile`.
    /// Four value lines are expected: color intrinsics, color extrinsics,
    /// depth intrinsics, depth extrinsics.
    pub fn calibration(file_content: &str) -> Result<CalibrationProfile, String> {
        let mut lines: Vec<Vec<Float>> = Vec::new();
        for line in file_content.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let values: Result<Vec<Float>, _> =
                line.split_whitespace().map(str::parse).collect();
            lines.push(values.map_err(|err| format!("Bad calibration line \"{}\": {}", line, err))?);
        }
        if lines.len() != 4 {
            return Err(format!(
                "A calibration file needs 4 value lines, got {}",
                lines.len()
            ));
        }
        Ok(CalibrationProfile {
            color: SensorCalibration {
                intrinsics: Intrinsics::new(lines[0].clone())?,
                extrinsics: Extrinsics::from_row_major(&lines[1])?,
            },
            depth: SensorCalibration {
                intrinsics: Intrinsics::new(lines[2].clone())?,
                extrinsics: Extrinsics::from_row_major(&lines[3])?,
            },
        })
    }

    fn multi_line<F, T>(line_parser: F, file_content: &str) -> Result<Vec<T>, String>
    where
        F: Fn(CompleteStr) -> nom::IResult<CompleteStr, Option<T>>,
    {
        let mut vec_data = Vec::new();
        for line in file_content.lines() {
            match line_parser(CompleteStr(line)) {
                Ok((_, Some(data))) => vec_data.push(data),
                Ok(_) => (),
                Err(_) => return Err(format!("Parsing error on line: {}", line)),
            }
        }
        Ok(vec_data)
    }

    // nom parsers #############################################################

    // Capture index --------------------

    // Capture line is either a comment or two timestamps and image paths.
    named!(capture_line<CompleteStr, Option<CaptureEntry> >,
        alt!( map!(comment, |_| None) | map!(capture, Some) )
    );

    named!(capture<CompleteStr, CaptureEntry>,
        do_parse!(
            color_timestamp_usec: timestamp >> space >>
            color_path: path >> space >>
            depth_timestamp_usec: timestamp >> space >>
            depth_path: path >>
            (CaptureEntry { color_timestamp_usec, color_path, depth_timestamp_usec, depth_path })
        )
    );

    // A `-` path marks an absent image.
    named!(path<CompleteStr, Option<String> >,
        map!(is_not!(" \t\r\n"), |s| {
            if s.0 == "-" { None } else { Some(s.0.to_string()) }
        })
    );

    // Device timestamps are integer microseconds.
    named!(timestamp<CompleteStr, u64>,
        map!(double, |t| t as u64)
    );

    // Inertial samples ----------------

    // Imu line is either a comment or 8 numeric fields.
    named!(imu_line<CompleteStr, Option<ImuSample> >,
        alt!( map!(comment, |_| None) | map!(imu_sample, Some) )
    );

    named!(imu_sample<CompleteStr, ImuSample>,
        do_parse!(
            acc_timestamp_usec: timestamp >> space >>
            ax: float >> space >>
            ay: float >> space >>
            az: float >> space >>
            gyro_timestamp_usec: timestamp >> space >>
            gx: float >> space >>
            gy: float >> space >>
            gz: float >>
            (ImuSample {
                acc_timestamp_usec,
                acc: Vec3::new(ax, ay, az),
                gyro_timestamp_usec,
                gyro: Vec3::new(gx, gy, gz),
            })
        )
    );

    // Parse a comment.
    named!(comment<CompleteStr,()>,
        do_parse!( tag!("#") >> many0!(anychar) >> ())
    );
} // pub mod parse

// TESTS #############################################################
