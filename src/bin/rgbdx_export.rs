// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate rgbd_export_rs as rgbdx;

use std::{env, error::Error, path::PathBuf};

use rgbdx::core::export::{self, WARMUP_SKIP_USEC};
use rgbdx::core::recording::Recording;
use rgbdx::dataset::tar_recording::TarRecording;

fn main() {
    let args: Vec<String> = env::args().collect();
    if let Err(error) = run(&args) {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./rgbdx_export input_path output_dir crop_width crop_height";

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Open the recording, read it whole and report on it.
    let mut recording = TarRecording::open(&valid_args.input_path)?;
    println!("Recording Length : {} s", recording.length_usec() / 1_000_000);
    recording.seek(WARMUP_SKIP_USEC)?;
    print!("{}", recording.calibration());

    // First pass: extract the cropped frame pairs.
    export::extract_frames(
        &mut recording,
        &valid_args.output_dir,
        valid_args.crop_width,
        valid_args.crop_height,
    )?;

    // Second pass: rewind past the warm-up again and write the motion log.
    recording.seek(WARMUP_SKIP_USEC)?;
    export::write_imu_log(&mut recording, &valid_args.output_dir)?;

    Ok(())
}

struct Args {
    input_path: PathBuf,
    output_dir: PathBuf,
    crop_width: u32,
    crop_height: u32,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    if let [_, input_path, output_dir, crop_width, crop_height] = args {
        Ok(Args {
            input_path: PathBuf::from(input_path),
            output_dir: PathBuf::from(output_dir),
            // atoi semantics: non-numeric input becomes a 0 crop.
            crop_width: crop_width.parse().unwrap_or(0),
            crop_height: crop_height.parse().unwrap_or(0),
        })
    } else {
        eprintln!("{}", USAGE);
        Err("Wrong number of arguments".to_string())
    }
}
