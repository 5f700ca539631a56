// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use png::{self, HasParameters};
use std::io::{Cursor, Read, Write};

/// Read a 16 bits gray png image from any reader.
pub fn read_png_16bits<R: Read>(r: R) -> Result<(usize, usize, Vec<u16>), png::DecodingError> {
    // Load 16 bits PNG depth image.
    let mut decoder = png::Decoder::new(r);
    // Use the IDENTITY transformation because by default
    // it will use STRIP_16 which only keep 8 bits.
    // See also SWAP_ENDIAN that might be useful
    //   (but seems not possible to use according to documentation).
    decoder.set(png::Transformations::IDENTITY);
    let (info, mut reader) = decoder.read_info()?;
    let mut buffer = vec![0; info.buffer_size()];
    reader.next_frame(&mut buffer)?;

    // Transform buffer into 16 bits slice.
    // if cfg!(target_endian = "big") ...
    let mut buffer_u16 = vec![0; (info.width * info.height) as usize];
    let mut buffer_cursor = Cursor::new(buffer);
    buffer_cursor.read_u16_into::<BigEndian>(&mut buffer_u16)?;

    // Return u16 buffer.
    Ok((info.width as usize, info.height as usize, buffer_u16))
}

/// Write a 16 bits gray png image into any writer.
/// Inverse operation of `read_png_16bits`.
///
/// The data slice is in row major order and must
/// contain exactly `width * height` values.
pub fn write_png_16bits<W: Write>(
    w: W,
    width: usize,
    height: usize,
    data: &[u16],
) -> Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(w, width as u32, height as u32);
    encoder.set(png::ColorType::Grayscale).set(png::BitDepth::Sixteen);
    let mut writer = encoder.write_header()?;

    // PNG 16 bits samples are big-endian.
    let mut buffer = Vec::with_capacity(2 * data.len());
    for &value in data {
        buffer.write_u16::<BigEndian>(value)?;
    }
    writer.write_image_data(&buffer)?;
    Ok(())
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn png_16bits_write_read_round_trip() {
        let (width, height) = (3, 2);
        let data: Vec<u16> = vec![0, 1, 256, 65535, 42, 1000];
        let mut encoded = Vec::new();
        write_png_16bits(&mut encoded, width, height, &data).unwrap();
        let (w, h, decoded) = read_png_16bits(Cursor::new(encoded)).unwrap();
        assert_eq!(width, w);
        assert_eq!(height, h);
        assert_eq!(data, decoded);
    }
}
