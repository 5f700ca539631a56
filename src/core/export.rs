// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The two export passes over a recorded RGB-D session.
//!
//! The extraction pass walks the capture stream, decodes each color
//! image, aligns the depth image into the color viewpoint, crops both to
//! a fixed centered rectangle and writes them as `rgb/<usec>.png` and
//! `depth/<usec>.png`. The motion log pass walks the inertial stream and
//! appends one text line per sample to `imu.txt`.
//!
//! Every failure is fatal to the run: no retries, no skipped captures.
//! Files written before the failure are kept.

use image;
use nalgebra::DMatrix;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::recording::Recording;
use crate::core::transform::DepthToColor;
use crate::misc::helper;

/// Both passes skip the first second of the recording,
/// where the device is still warming up.
pub const WARMUP_SKIP_USEC: u64 = 1_000_000;

/// Everything that can abort an export run.
#[derive(Debug)]
pub enum ExportError {
    /// The recording cannot be opened or its calibration is unreadable.
    Open(String),
    /// The stream cannot be positioned at the warm-up offset.
    Seek(String),
    /// An output subdirectory cannot be created.
    DirectoryCreate(PathBuf, std::io::Error),
    /// A capture lacks a usable image: an image is absent, the color
    /// buffer does not decode, or the color timestamp is the invalid
    /// zero sentinel. The named part is the missing one.
    MissingImage(&'static str),
    /// Depth realignment failed.
    Transform(String),
    /// The centered crop rectangle does not fit the source frame.
    Crop {
        crop_width: u32,
        crop_height: u32,
        width: u32,
        height: u32,
    },
    /// A stream reported neither a next element nor end of file.
    Stream(String),
    /// The motion log file cannot be created.
    FileOpen(PathBuf, std::io::Error),
    /// An output file cannot be encoded or written.
    Write(PathBuf, String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExportError::Open(reason) => write!(f, "Recording open failed: {}", reason),
            ExportError::Seek(reason) => write!(f, "Cannot skip recording warm-up: {}", reason),
            ExportError::DirectoryCreate(path, err) => {
                write!(f, "Cannot create output dir {}: {}", path.display(), err)
            }
            ExportError::MissingImage(part) => write!(f, "Capture has no {}", part),
            ExportError::Transform(reason) => write!(f, "Transform failed: {}", reason),
            ExportError::Crop {
                crop_width,
                crop_height,
                width,
                height,
            } => write!(
                f,
                "Crop {}x{} does not fit the {}x{} source frame",
                crop_width, crop_height, width, height
            ),
            ExportError::Stream(reason) => write!(f, "Stream failed: {}", reason),
            ExportError::FileOpen(path, err) => {
                write!(f, "Cannot open {}: {}", path.display(), err)
            }
            ExportError::Write(path, reason) => {
                write!(f, "Cannot write {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ExportError {}

// EXTRACTION PASS ###################################################

/// Run the frame extraction pass until the capture stream ends.
/// Returns the number of exported frame pairs.
///
/// The caller positions the recording at the warm-up offset beforehand.
pub fn extract_frames<R: Recording>(
    recording: &mut R,
    output_dir: &Path,
    crop_width: u32,
    crop_height: u32,
) -> Result<usize, ExportError> {
    let rgb_dir = output_dir.join("rgb");
    let depth_dir = output_dir.join("depth");
    create_dir(&rgb_dir)?;
    create_dir(&depth_dir)?;

    let transform = DepthToColor::new(recording.calibration());

    let mut frame_idx = 0;
    while let Some(capture) = recording.next_capture()? {
        // A capture without both images aborts the run, it is not skipped.
        let color = capture.color.ok_or(ExportError::MissingImage("color image"))?;
        if color.timestamp_usec == 0 {
            return Err(ExportError::MissingImage("valid color timestamp"));
        }
        let depth = capture.depth.ok_or(ExportError::MissingImage("depth image"))?;

        // Decode the compressed color buffer with the format-sniffing
        // decoder, whatever the recorded color layout was. A buffer that
        // does not decode is as fatal as an absent one.
        let mut rgb = image::load_from_memory(&color.data)
            .map_err(|_| ExportError::MissingImage("decodable color image"))?
            .to_rgb();
        let (width, height) = rgb.dimensions();

        // Reproject the native-resolution depth into the color viewpoint.
        let aligned = transform
            .align(&depth.map, width as usize, height as usize)
            .map_err(ExportError::Transform)?;

        println!("Frame: {}; Timestamp: {}", frame_idx, color.timestamp_usec);

        let (left, top) = crop_origin(width, height, crop_width, crop_height)?;

        let rgb_path = rgb_dir.join(format!("{}.png", color.timestamp_usec));
        let cropped = image::imageops::crop(&mut rgb, left, top, crop_width, crop_height).to_image();
        cropped
            .save(&rgb_path)
            .map_err(|err| ExportError::Write(rgb_path.clone(), err.to_string()))?;

        let depth_path = depth_dir.join(format!("{}.png", color.timestamp_usec));
        let depth_crop = aligned
            .slice(
                (top as usize, left as usize),
                (crop_height as usize, crop_width as usize),
            )
            .into_owned();
        write_depth_png(&depth_path, &depth_crop)?;

        frame_idx += 1;
    }
    Ok(frame_idx)
}

/// Top-left corner of the centered crop rectangle.
/// An oversized rectangle is a fatal error (the original tool silently
/// built an invalid region, which Rust slicing cannot express).
fn crop_origin(
    width: u32,
    height: u32,
    crop_width: u32,
    crop_height: u32,
) -> Result<(u32, u32), ExportError> {
    if crop_width > width || crop_height > height {
        Err(ExportError::Crop {
            crop_width,
            crop_height,
            width,
            height,
        })
    } else {
        Ok(((width - crop_width) / 2, (height - crop_height) / 2))
    }
}

/// Write a cropped depth map as a 16 bits gray png file.
fn write_depth_png(path: &Path, depth: &DMatrix<u16>) -> Result<(), ExportError> {
    let file =
        File::create(path).map_err(|err| ExportError::Write(path.to_path_buf(), err.to_string()))?;
    // Row major reordering of the column major matrix.
    let mut data = Vec::with_capacity(depth.len());
    for row in 0..depth.nrows() {
        for col in 0..depth.ncols() {
            data.push(depth[(row, col)]);
        }
    }
    helper::write_png_16bits(BufWriter::new(file), depth.ncols(), depth.nrows(), &data)
        .map_err(|err| ExportError::Write(path.to_path_buf(), format!("{:?}", err)))
}

fn create_dir(path: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(path).map_err(|err| ExportError::DirectoryCreate(path.to_path_buf(), err))
}

// MOTION LOG PASS ###################################################

/// Run the motion log pass until the inertial stream ends.
/// Returns the number of logged samples.
///
/// The caller seeks the recording back to the warm-up offset beforehand.
/// On failure the partially written log is kept, not rolled back.
pub fn write_imu_log<R: Recording>(
    recording: &mut R,
    output_dir: &Path,
) -> Result<usize, ExportError> {
    let log_path = output_dir.join("imu.txt");
    let file = File::create(&log_path).map_err(|err| ExportError::FileOpen(log_path.clone(), err))?;
    let mut log = BufWriter::new(file);

    let mut sample_idx = 0;
    while let Some(sample) = recording.next_imu_sample()? {
        writeln!(log, "{}", sample.to_string())
            .map_err(|err| ExportError::Write(log_path.clone(), err.to_string()))?;
        println!(
            "Sample Idx: {}; Timestamp: {}",
            sample_idx, sample.acc_timestamp_usec
        );
        sample_idx += 1;
    }
    Ok(sample_idx)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use png::HasParameters;
    use std::io::Read;

    use crate::core::calibration::{
        CalibrationProfile, Extrinsics, Intrinsics, SensorCalibration,
    };
    use crate::core::recording::{Capture, ColorImage, DepthImage, ImuSample};
    use crate::misc::type_aliases::Vec3;

    // A recording held fully in memory.
    struct FakeRecording {
        calibration: CalibrationProfile,
        captures: Vec<Capture>,
        samples: Vec<ImuSample>,
        capture_cursor: usize,
        imu_cursor: usize,
    }

    impl FakeRecording {
        fn new(captures: Vec<Capture>, samples: Vec<ImuSample>) -> FakeRecording {
            let sensor = SensorCalibration {
                intrinsics: Intrinsics::new(vec![3.5, 2.5, 500.0, 500.0]).unwrap(),
                extrinsics: Extrinsics::identity(),
            };
            FakeRecording {
                calibration: CalibrationProfile {
                    color: sensor.clone(),
                    depth: sensor,
                },
                captures,
                samples,
                capture_cursor: 0,
                imu_cursor: 0,
            }
        }
    }

    impl Recording for FakeRecording {
        fn calibration(&self) -> &CalibrationProfile {
            &self.calibration
        }
        fn length_usec(&self) -> u64 {
            0
        }
        fn seek(&mut self, _offset_usec: u64) -> Result<(), ExportError> {
            self.capture_cursor = 0;
            self.imu_cursor = 0;
            Ok(())
        }
        fn next_capture(&mut self) -> Result<Option<Capture>, ExportError> {
            let next = self.captures.get(self.capture_cursor).cloned();
            self.capture_cursor += 1;
            Ok(next)
        }
        fn next_imu_sample(&mut self) -> Result<Option<ImuSample>, ExportError> {
            let next = self.samples.get(self.imu_cursor).cloned();
            self.imu_cursor += 1;
            Ok(next)
        }
    }

    // GENERATORS ####################################################

    fn color_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, width, height);
            encoder.set(png::ColorType::RGB).set(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..3 * width * height).map(|i| (i % 251) as u8).collect();
            writer.write_image_data(&data).unwrap();
        }
        bytes
    }

    fn gen_capture(timestamp_usec: u64, width: u32, height: u32) -> Capture {
        Capture {
            color: Some(ColorImage {
                timestamp_usec,
                data: color_png(width, height),
            }),
            depth: Some(DepthImage {
                timestamp_usec,
                map: nalgebra::DMatrix::from_element(height as usize, width as usize, 1000),
            }),
        }
    }

    fn gen_sample(acc_timestamp_usec: u64) -> ImuSample {
        ImuSample {
            acc_timestamp_usec,
            acc: Vec3::new(0.01, -9.81, 0.2),
            gyro_timestamp_usec: acc_timestamp_usec + 50,
            gyro: Vec3::new(0.0, 0.125, -0.5),
        }
    }

    fn tmp_output_dir(test_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rgbdx-{}-{}", test_name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    // EXTRACTION PASS ###############################################

    #[test]
    fn exported_pairs_share_names_and_crop_size() {
        let out = tmp_output_dir("pairs");
        let mut recording = FakeRecording::new(
            vec![gen_capture(1_100_000, 8, 6), gen_capture(1_133_000, 8, 6)],
            vec![],
        );
        let count = extract_frames(&mut recording, &out, 4, 2).unwrap();
        assert_eq!(2, count);

        let rgb_names = file_names(&out.join("rgb"));
        let depth_names = file_names(&out.join("depth"));
        assert_eq!(vec!["1100000.png", "1133000.png"], rgb_names);
        assert_eq!(rgb_names, depth_names);

        for name in &depth_names {
            let file = File::open(out.join("depth").join(name)).unwrap();
            let (w, h, data) = helper::read_png_16bits(file).unwrap();
            assert_eq!((4, 2), (w, h));
            // Identity calibration: the aligned crop keeps the raw values.
            assert!(data.iter().all(|&d| d == 1000));
        }
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn missing_depth_aborts_and_keeps_previous_frames() {
        let out = tmp_output_dir("missing-depth");
        let mut broken = gen_capture(1_200_000, 8, 6);
        broken.depth = None;
        let mut recording =
            FakeRecording::new(vec![gen_capture(1_100_000, 8, 6), broken], vec![]);

        match extract_frames(&mut recording, &out, 4, 2) {
            Err(ExportError::MissingImage(part)) => assert_eq!("depth image", part),
            other => panic!("Expected a missing image error, got {:?}", other),
        }
        // The first frame stays on disk.
        assert_eq!(vec!["1100000.png"], file_names(&out.join("rgb")));
        assert_eq!(vec!["1100000.png"], file_names(&out.join("depth")));
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn undecodable_color_buffer_aborts() {
        let out = tmp_output_dir("bad-color");
        let mut broken = gen_capture(1_100_000, 8, 6);
        broken.color = Some(ColorImage {
            timestamp_usec: 1_100_000,
            data: vec![1, 2, 3],
        });
        let mut recording = FakeRecording::new(vec![broken], vec![]);
        match extract_frames(&mut recording, &out, 4, 2) {
            Err(ExportError::MissingImage(part)) => assert_eq!("decodable color image", part),
            other => panic!("Expected a missing image error, got {:?}", other),
        }
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn zero_color_timestamp_aborts() {
        let out = tmp_output_dir("zero-timestamp");
        let mut recording = FakeRecording::new(vec![gen_capture(0, 8, 6)], vec![]);
        match extract_frames(&mut recording, &out, 4, 2) {
            Err(ExportError::MissingImage(_)) => (),
            other => panic!("Expected a missing image error, got {:?}", other),
        }
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn oversized_crop_is_fatal() {
        let out = tmp_output_dir("oversized-crop");
        let mut recording = FakeRecording::new(vec![gen_capture(1_100_000, 8, 6)], vec![]);
        match extract_frames(&mut recording, &out, 100, 100) {
            Err(ExportError::Crop { .. }) => (),
            other => panic!("Expected a crop error, got {:?}", other),
        }
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn empty_recording_exports_nothing() {
        let out = tmp_output_dir("empty");
        let mut recording = FakeRecording::new(vec![], vec![]);
        assert_eq!(0, extract_frames(&mut recording, &out, 4, 2).unwrap());
        assert_eq!(0, write_imu_log(&mut recording, &out).unwrap());
        assert!(file_names(&out.join("rgb")).is_empty());
        assert!(file_names(&out.join("depth")).is_empty());
        let mut content = String::new();
        File::open(out.join("imu.txt"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.is_empty());
        let _ = fs::remove_dir_all(&out);
    }

    // MOTION LOG PASS ###############################################

    #[test]
    fn imu_log_has_one_line_of_8_fields_per_sample() {
        let out = tmp_output_dir("imu-log");
        let samples = vec![
            gen_sample(1_002_000),
            gen_sample(1_004_000),
            gen_sample(1_006_000),
        ];
        let mut recording = FakeRecording::new(vec![], samples);
        assert_eq!(3, write_imu_log(&mut recording, &out).unwrap());

        let mut content = String::new();
        File::open(out.join("imu.txt"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(3, lines.len());
        for line in lines {
            assert_eq!(8, line.split_whitespace().count());
            assert!(line
                .split_whitespace()
                .all(|field| field.parse::<f64>().is_ok()));
        }
        let _ = fs::remove_dir_all(&out);
    }
}
