// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Rgbdx
//!
//! Export synchronized color frames, depth frames and inertial samples
//! from a recorded RGB-D camera session.
//!
//! The crate is split into three parts:
//! - `core` holds the data model (calibration, captures, inertial samples),
//!   the depth-to-color alignment, and the two export passes.
//! - `dataset` holds the concrete recording reader for tar-archived
//!   sessions.
//! - `misc` holds helpers such as 16 bits PNG decoding/encoding.

extern crate byteorder;
extern crate image;
extern crate itertools;
extern crate nalgebra;
extern crate nom;
extern crate png;
extern crate tar;

pub mod core;
pub mod dataset;
pub mod misc;
