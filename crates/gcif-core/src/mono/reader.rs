// crates/gcif-core/src/mono/reader.rs
//
// Decoder for the monochrome sub-compressor. Driven element by element by
// the host in the same order the writer emitted; tile filters materialize
// lazily the first time a tile is touched within its tile row. Neighbors
// that have not been decoded yet predict as zero, mirroring the writer's
// emission-order rule.

use crate::bits::BitReader;
use crate::entropy::coder::EntropyDecoder;
use crate::entropy::huffman::{read_table, HuffmanDecoder};
use crate::error::{corrupt, Result};
use crate::filters::chaos::{residual_score, ChannelChaos, ChaosMap, MONO_MAX_CHAOS_LEVELS};
use crate::filters::mono::{MonoFn, MONO_FILTERS, MF_COUNT};
use crate::mask::BitGrid;

use super::{MASK_TILE, RECURSIVE_THRESH};

/// Sentinel for tiles whose filter has not been read; shares the MASK_TILE
/// value so untouched neighbors predict as zero either way.
const NOT_READ: u8 = MASK_TILE;

pub struct MonoReader {
    xsize: u32,
    num_syms: u16,

    tile_bits: u32,
    tile_size: u32,
    tiles_x: u32,

    filters: Vec<MonoFn>,
    sympal: Vec<u8>,
    filter_count: usize,

    chaos_map: ChaosMap,
    chaos_row: ChannelChaos,
    decoders: Vec<EntropyDecoder>,

    child: Option<Box<MonoReader>>,
    rf_dec: Option<HuffmanDecoder>,
    row_filter: u8,

    tiles: Vec<u8>,
    seen: Vec<bool>,
    data: Vec<u8>,
    decoded: BitGrid,
}

impl MonoReader {
    pub fn read_tables(r: &mut BitReader, xsize: u32, ysize: u32, num_syms: u16) -> Result<Self> {
        let tile_bits = r.read_bits(3)? + 1;
        let tile_size = 1u32 << tile_bits;
        let tiles_x = (xsize + tile_size - 1) >> tile_bits;
        let tiles_y = (ysize + tile_size - 1) >> tile_bits;

        let normal_count = r.read_bits(5)? as usize + 1;
        let mut filters = Vec::with_capacity(normal_count);
        for _ in 0..normal_count {
            let idx = r.read_bits(7)? as usize;
            if idx >= MF_COUNT {
                return corrupt("spatial filter index out of catalog");
            }
            filters.push(MONO_FILTERS[idx]);
        }

        let sympal_count = r.read_bits(4)? as usize;
        let mut sympal = Vec::with_capacity(sympal_count);
        for _ in 0..sympal_count {
            let v = r.read_bits(8)? as u16;
            if v >= num_syms {
                return corrupt("palette value outside alphabet");
            }
            sympal.push(v as u8);
        }

        let filter_count = normal_count + sympal_count;
        if filter_count >= MASK_TILE as usize {
            return corrupt("too many filters declared");
        }

        let chaos_levels = r.read_bits(4)? as usize + 1;
        if chaos_levels > MONO_MAX_CHAOS_LEVELS {
            return corrupt("mono chaos level count out of range");
        }
        let mut decoders = Vec::with_capacity(chaos_levels);
        for _ in 0..chaos_levels {
            decoders.push(EntropyDecoder::read_table(num_syms as usize, r)?);
        }

        let (child, rf_dec) = if r.read_bit()? != 0 {
            if tiles_x * tiles_y < RECURSIVE_THRESH {
                return corrupt("recursive tile map below threshold");
            }
            let child = MonoReader::read_tables(r, tiles_x, tiles_y, filter_count as u16)?;
            (Some(Box::new(child)), None)
        } else {
            let lens = read_table(filter_count, r)?;
            (None, Some(HuffmanDecoder::from_lens(&lens)?))
        };

        Ok(MonoReader {
            xsize,
            num_syms,
            tile_bits,
            tile_size,
            tiles_x,
            filters,
            sympal,
            filter_count,
            chaos_map: ChaosMap::new(chaos_levels),
            chaos_row: ChannelChaos::new(xsize),
            decoders,
            child,
            rf_dec,
            row_filter: 0,
            tiles: vec![NOT_READ; (tiles_x * tiles_y) as usize],
            seen: vec![false; tiles_x as usize],
            data: vec![0; xsize as usize * ysize as usize],
            decoded: BitGrid::new(xsize, ysize),
        })
    }

    pub fn read_row_header(&mut self, y: u32, r: &mut BitReader) -> Result<()> {
        if y & (self.tile_size - 1) != 0 {
            return Ok(());
        }
        self.seen.fill(false);
        let ty = y >> self.tile_bits;
        match self.child.as_mut() {
            Some(child) => child.read_row_header(ty, r),
            None => {
                self.row_filter = r.read_bits(2)? as u8;
                Ok(())
            }
        }
    }

    /// Decoded value at `(x, y)`; zero if that element has not been read.
    #[inline]
    fn fetch(&self, nx: i64, ny: i64) -> u8 {
        if nx < 0 || ny < 0 || nx >= self.xsize as i64 {
            return 0;
        }
        let (nx, ny) = (nx as u32, ny as u32);
        if !self.decoded.get(nx, ny) {
            return 0;
        }
        self.data[(ny * self.xsize + nx) as usize]
    }

    fn rf_neighbor(&self, tx: i64, ty: i64) -> u8 {
        if tx < 0 || ty < 0 || tx >= self.tiles_x as i64 {
            return 0;
        }
        let f = self.tiles[(ty as u32 * self.tiles_x + tx as u32) as usize];
        if f == NOT_READ {
            0
        } else {
            f
        }
    }

    fn read_tile_filter(&mut self, tx: u32, ty: u32, r: &mut BitReader) -> Result<u8> {
        if let Some(child) = self.child.as_mut() {
            return child.read(tx, ty, r);
        }
        let res = self
            .rf_dec
            .as_ref()
            .expect("row filter table present when not recursing")
            .next(r)? as usize;
        let pred = match self.row_filter {
            super::RF_A => self.rf_neighbor(tx as i64 - 1, ty as i64),
            super::RF_B => self.rf_neighbor(tx as i64, ty as i64 - 1),
            super::RF_C => self.rf_neighbor(tx as i64 - 1, ty as i64 - 1),
            _ => 0,
        } as usize;
        Ok(((res + pred) % self.filter_count) as u8)
    }

    pub fn read(&mut self, x: u32, y: u32, r: &mut BitReader) -> Result<u8> {
        let tx = x >> self.tile_bits;
        let ty = y >> self.tile_bits;
        let t = (ty * self.tiles_x + tx) as usize;

        if !self.seen[tx as usize] {
            self.seen[tx as usize] = true;
            let f = self.read_tile_filter(tx, ty, r)?;
            if f as usize >= self.filter_count {
                return corrupt("tile filter out of declared range");
            }
            self.tiles[t] = f;
        }

        let f = self.tiles[t] as usize;
        let value = if f >= self.filters.len() {
            self.chaos_row.store(x, 0);
            self.sympal[f - self.filters.len()]
        } else {
            let (left, up) = self.chaos_row.scores(x);
            let bin = self.chaos_map.bin(left, up);
            let res = self.decoders[bin].next(r)?;
            if res >= self.num_syms {
                return corrupt("residual outside alphabet");
            }
            let a = self.fetch(x as i64 - 1, y as i64);
            let b = self.fetch(x as i64, y as i64 - 1);
            let c = self.fetch(x as i64 - 1, y as i64 - 1);
            let d = self.fetch(x as i64 + 1, y as i64 - 1);
            let pred = self.filters[f](a, b, c, d) as u16 % self.num_syms;
            self.chaos_row.store(x, residual_score(res as u8, self.num_syms));
            ((res + pred) % self.num_syms) as u8
        };

        self.data[(y * self.xsize + x) as usize] = value;
        self.decoded.set(x, y);
        Ok(value)
    }
}
