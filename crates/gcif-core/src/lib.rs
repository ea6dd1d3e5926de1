// crates/gcif-core/src/lib.rs
//
// Lossless RGBA still-image codec. The pipeline pairs tiled spatial/color
// filtering with a chaos-binned entropy coder, a pixel-copy LZ layer, and a
// recursive monochrome sub-compressor for the filter maps and alpha plane.
// Encoder and decoder walk pixels in the identical raster order, so every
// stream position is implied rather than signaled.

pub mod bits;
pub mod entropy;
pub mod error;
pub mod filters;
pub mod knobs;
pub mod lz;
pub mod mask;
pub mod mono;
pub mod rgba;
pub mod stats;

pub use error::{GcifError, Result};
pub use knobs::EncoderKnobs;
pub use mask::MaskPlane;
pub use stats::EncodeStats;

use bits::{BitReader, BitWriter};
use rgba::{RgbaReader, RgbaWriter};

/// Result of a successful encode: the bit-exact payload plus framing info
/// for the container.
pub struct Encoded {
    pub bit_count: u64,
    pub bytes: Vec<u8>,
    pub stats: EncodeStats,
}

/// Compress a row-major RGBA plane. The payload starts with the dominant
/// color mask, then the filter/chaos tables, then the interleaved pixel
/// stream.
pub fn encode(rgba: &[u8], xsize: u32, ysize: u32, knobs: &EncoderKnobs) -> Result<Encoded> {
    let mask = MaskPlane::build(rgba, xsize, ysize);
    let mut writer = RgbaWriter::new(rgba, xsize, ysize, &mask, knobs.clone())?;

    let mut w = BitWriter::new();
    mask.serialize(&mut w);
    let mask_bits = w.bit_count();
    writer.write(&mut w)?;

    let mut stats = writer.stats();
    stats.mask_bits = mask_bits;
    stats.total_bits = w.bit_count();

    let (bit_count, bytes) = w.finalize();
    Ok(Encoded {
        bit_count,
        bytes,
        stats,
    })
}

/// Decompress a payload produced by `encode` back to the RGBA plane.
pub fn decode(payload: &[u8], xsize: u32, ysize: u32) -> Result<Vec<u8>> {
    if xsize == 0 || ysize == 0 || xsize > u16::MAX as u32 || ysize > u16::MAX as u32 {
        return Err(GcifError::InvalidParam(format!(
            "image dimensions {}x{} out of range",
            xsize, ysize
        )));
    }
    (xsize as usize)
        .checked_mul(ysize as usize)
        .and_then(|p| p.checked_mul(4))
        .ok_or_else(|| GcifError::InvalidParam("image size overflows".into()))?;

    let mut r = BitReader::new(payload);
    let mask = MaskPlane::deserialize(&mut r, xsize, ysize)?;
    let mut reader = RgbaReader::read_tables(&mut r, xsize, ysize)?;
    reader.read_pixels(&mut r, &mask)
}
