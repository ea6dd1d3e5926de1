// crates/gcif-core/src/mono/mod.rs
//
// Monochrome sub-compressor: tiled filter selection plus chaos-binned
// entropy coding for byte grids with alphabets up to 256. Used for the
// alpha plane, for the SF/CF tile maps, and recursively for its own tile
// map.
//
// The host drives emission element by element, which lets tile filters
// interleave lazily with the data they govern. Counting (`count`) must
// replay the exact sequence that writing (`write`) will see; the standalone
// `compress`/`decompress` helpers below do that in raster order.

pub mod reader;
pub mod writer;

pub use reader::MonoReader;
pub use writer::MonoWriter;

use crate::bits::{BitReader, BitWriter};
use crate::error::{GcifError, Result};
use crate::mask::BitGrid;

pub const MASK_TILE: u8 = 255;
pub const TODO_TILE: u8 = 0;

/// Hard cap on selected filters (normal + palette) per level.
pub const MAX_FILTERS: usize = 32;
pub const MAX_PALETTE: usize = 15;

pub const MAX_PASSES: usize = 4;
pub const MAX_ROW_PASSES: usize = 2;

/// Grids with at least this many tiles try a recursive tile-map writer.
pub const RECURSIVE_THRESH: u32 = 256;

/// Estimator nudge toward tile choices matching their neighbors.
pub const NEIGHBOR_REWARD: f64 = 1.0;

/// Award weights for the top-scoring filters of each tile.
pub const AWARDS: [u32; 4] = [5, 3, 1, 1];

/// Row filter codes for the tile map.
pub const RF_NOOP: u8 = 0;
pub const RF_A: u8 = 1;
pub const RF_B: u8 = 2;
pub const RF_C: u8 = 3;
pub const RF_COUNT: usize = 4;

#[derive(Clone)]
pub struct MonoParams {
    pub xsize: u32,
    pub ysize: u32,
    pub num_syms: u16,
    pub min_bits: u8,
    pub max_bits: u8,
    pub max_chaos_levels: u8,
    pub sympal_thresh: f32,
    pub filter_thresh: f32,
    pub revisit_count: u32,
    /// Elements the host never emits; `None` means none.
    pub mask: Option<BitGrid>,
    /// Per-element emission order key; `None` means raster order. Neighbors
    /// that have not been emitted yet predict as zero on both sides.
    pub emit_pos: Option<Vec<u64>>,
}

impl MonoParams {
    pub fn new(xsize: u32, ysize: u32, num_syms: u16) -> Self {
        MonoParams {
            xsize,
            ysize,
            num_syms,
            min_bits: 2,
            max_bits: 4,
            max_chaos_levels: 8,
            sympal_thresh: 0.1,
            filter_thresh: 0.6,
            revisit_count: 4096,
            mask: None,
            emit_pos: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.xsize == 0 || self.ysize == 0 {
            return Err(GcifError::InvalidParam("empty grid".into()));
        }
        if self.num_syms == 0 || self.num_syms > 256 {
            return Err(GcifError::InvalidParam(format!(
                "num_syms must be in 1..=256, got {}",
                self.num_syms
            )));
        }
        if self.min_bits == 0 || self.max_bits > 8 || self.min_bits > self.max_bits {
            return Err(GcifError::InvalidParam(format!(
                "tile bits range {}..={} out of bounds",
                self.min_bits, self.max_bits
            )));
        }
        if self.max_chaos_levels == 0 || self.max_chaos_levels as usize > crate::filters::chaos::MONO_MAX_CHAOS_LEVELS {
            return Err(GcifError::InvalidParam("mono chaos levels out of range".into()));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn is_masked(&self, x: u32, y: u32) -> bool {
        self.mask.as_ref().map_or(false, |m| m.get(x, y))
    }

    #[inline]
    pub(crate) fn emit_key(&self, x: u32, y: u32) -> u64 {
        let idx = y as usize * self.xsize as usize + x as usize;
        match &self.emit_pos {
            Some(v) => v[idx],
            None => idx as u64,
        }
    }
}

/// One-shot compression of a full grid in raster order.
pub fn compress(data: &[u8], params: MonoParams) -> Result<Vec<u8>> {
    params.validate()?;
    if data.len() != params.xsize as usize * params.ysize as usize {
        return Err(GcifError::InvalidParam("grid size mismatch".into()));
    }
    let mut writer = MonoWriter::process(params, data.to_vec())?;

    for y in 0..writer.ysize() {
        writer.count_row_header(y);
        for x in 0..writer.xsize() {
            if !writer.is_masked(x, y) {
                writer.count(x, y);
            }
        }
    }
    writer.finalize();

    let mut w = BitWriter::new();
    writer.write_tables(&mut w);
    for y in 0..writer.ysize() {
        writer.write_row_header(y, &mut w);
        for x in 0..writer.xsize() {
            if !writer.is_masked(x, y) {
                writer.write(x, y, &mut w);
            }
        }
    }
    let (_, bytes) = w.finalize();
    Ok(bytes)
}

/// Inverse of `compress`; masked elements come back as zero.
pub fn decompress(
    bytes: &[u8],
    xsize: u32,
    ysize: u32,
    num_syms: u16,
    mask: Option<&BitGrid>,
) -> Result<Vec<u8>> {
    let mut r = BitReader::new(bytes);
    let mut reader = MonoReader::read_tables(&mut r, xsize, ysize, num_syms)?;
    let mut out = vec![0u8; xsize as usize * ysize as usize];
    for y in 0..ysize {
        reader.read_row_header(y, &mut r)?;
        for x in 0..xsize {
            if mask.map_or(false, |m| m.get(x, y)) {
                continue;
            }
            out[(y * xsize + x) as usize] = reader.read(x, y, &mut r)?;
        }
    }
    Ok(out)
}
