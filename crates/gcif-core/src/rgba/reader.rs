// crates/gcif-core/src/rgba/reader.rs
//
// Single-pass decoder: rebuild every table from the header, then walk
// pixels left-to-right, top-to-bottom exactly once. Per pixel: dominant
// mask wins, then an active LZ run copies, otherwise Y (escapes open a
// run), U, V, alpha, and - the first time a tile is touched - its SF and
// CF indices.

use crate::bits::BitReader;
use crate::entropy::coder::EntropyDecoder;
use crate::error::{corrupt, Result};
use crate::filters::chaos::{residual_score, ChannelChaos, ChaosMap, MAX_CHAOS_LEVELS};
use crate::filters::color::{ColorFilter, COLOR_FILTERS, CF_COUNT};
use crate::filters::spatial::{predict, SpatialFn, SPATIAL_FILTERS, SF_COUNT};
use crate::lz::{read_distance, read_length};
use crate::mask::MaskPlane;
use crate::mono::MonoReader;

use super::{NUM_UV_SYMS, NUM_Y_SYMS};

pub struct RgbaReader {
    xsize: u32,
    ysize: u32,

    tile_bits: u32,
    tile_size: u32,

    sf_subset: Vec<SpatialFn>,
    cf_subset: Vec<ColorFilter>,
    lz_enabled: bool,

    sf_reader: MonoReader,
    cf_reader: MonoReader,
    a_reader: MonoReader,

    chaos_map: ChaosMap,
    chaos_y: ChannelChaos,
    chaos_u: ChannelChaos,
    chaos_v: ChannelChaos,
    y_decoders: Vec<EntropyDecoder>,
    u_decoders: Vec<EntropyDecoder>,
    v_decoders: Vec<EntropyDecoder>,

    // Lazily-read (sf, cf) per tile of the current tile row.
    filter_row: Vec<Option<(usize, usize)>>,
}

impl RgbaReader {
    pub fn read_tables(r: &mut BitReader, xsize: u32, ysize: u32) -> Result<Self> {
        let tile_bits = r.read_bits(3)? + 1;
        let tile_size = 1u32 << tile_bits;
        let tiles_x = (xsize + tile_size - 1) >> tile_bits;
        let tiles_y = (ysize + tile_size - 1) >> tile_bits;

        let sf_count = r.read_bits(5)? as usize + 1;
        let mut sf_subset = Vec::with_capacity(sf_count);
        for _ in 0..sf_count {
            let idx = r.read_bits(7)? as usize;
            if idx >= SF_COUNT {
                return corrupt("spatial filter index out of catalog");
            }
            sf_subset.push(SPATIAL_FILTERS[idx]);
        }

        let cf_count = r.read_bits(4)? as usize + 1;
        let mut cf_subset = Vec::with_capacity(cf_count);
        for _ in 0..cf_count {
            let idx = r.read_bits(4)? as usize;
            if idx >= CF_COUNT {
                return corrupt("color filter index out of catalog");
            }
            cf_subset.push(COLOR_FILTERS[idx]);
        }

        let chaos_levels = r.read_bits(5)? as usize + 1;
        if chaos_levels > MAX_CHAOS_LEVELS {
            return corrupt("chaos level count out of range");
        }
        let lz_enabled = r.read_bit()? != 0;

        let sf_reader = MonoReader::read_tables(r, tiles_x, tiles_y, sf_count as u16)?;
        let cf_reader = MonoReader::read_tables(r, tiles_x, tiles_y, cf_count as u16)?;
        let a_reader = MonoReader::read_tables(r, xsize, ysize, 256)?;

        let mut y_decoders = Vec::with_capacity(chaos_levels);
        let mut u_decoders = Vec::with_capacity(chaos_levels);
        let mut v_decoders = Vec::with_capacity(chaos_levels);
        for _ in 0..chaos_levels {
            y_decoders.push(EntropyDecoder::read_table(NUM_Y_SYMS, r)?);
            u_decoders.push(EntropyDecoder::read_table(NUM_UV_SYMS, r)?);
            v_decoders.push(EntropyDecoder::read_table(NUM_UV_SYMS, r)?);
        }

        Ok(RgbaReader {
            xsize,
            ysize,
            tile_bits,
            tile_size,
            sf_subset,
            cf_subset,
            lz_enabled,
            sf_reader,
            cf_reader,
            a_reader,
            chaos_map: ChaosMap::new(chaos_levels),
            chaos_y: ChannelChaos::new(xsize),
            chaos_u: ChannelChaos::new(xsize),
            chaos_v: ChannelChaos::new(xsize),
            y_decoders,
            u_decoders,
            v_decoders,
            filter_row: vec![None; tiles_x as usize],
        })
    }

    pub fn read_pixels(&mut self, r: &mut BitReader, mask: &MaskPlane) -> Result<Vec<u8>> {
        let n = self.xsize as usize * self.ysize as usize;
        let mut out = vec![0u8; n * 4];
        let dominant = mask.dominant();

        let mut run_remaining: u32 = 0;
        let mut run_distance: u32 = 0;

        for y in 0..self.ysize {
            if y & (self.tile_size - 1) == 0 {
                let ty = y >> self.tile_bits;
                self.sf_reader.read_row_header(ty, r)?;
                self.cf_reader.read_row_header(ty, r)?;
                self.filter_row.fill(None);
            }
            self.a_reader.read_row_header(y, r)?;

            for x in 0..self.xsize {
                let idx = (y * self.xsize + x) as usize;

                if run_remaining > 0 {
                    run_remaining -= 1;
                    let px = if mask.masked(x, y) {
                        dominant
                    } else {
                        copy_pixel(&out, idx, run_distance)
                    };
                    out[idx * 4..idx * 4 + 4].copy_from_slice(&px);
                    self.store_zero(x);
                    continue;
                }

                if mask.masked(x, y) {
                    out[idx * 4..idx * 4 + 4].copy_from_slice(&dominant);
                    self.store_zero(x);
                    continue;
                }

                let (ly, uy) = self.chaos_y.scores(x);
                let by = self.chaos_map.bin(ly, uy);
                let ysym = self.y_decoders[by].next(r)?;

                if ysym >= 256 {
                    if !self.lz_enabled {
                        return corrupt("match escape with LZ disabled");
                    }
                    let len = read_length(ysym as u32 - 256, r)? as u32;
                    let dist = read_distance(r)?;
                    if dist as usize > idx {
                        return corrupt("match distance reaches before the image");
                    }
                    if idx + len as usize > n {
                        return corrupt("match overruns the image");
                    }
                    let px = copy_pixel(&out, idx, dist);
                    out[idx * 4..idx * 4 + 4].copy_from_slice(&px);
                    run_remaining = len - 1;
                    run_distance = dist;
                    self.store_zero(x);
                    continue;
                }

                let (lu, uu) = self.chaos_u.scores(x);
                let (lv, uv) = self.chaos_v.scores(x);
                let usym = self.u_decoders[self.chaos_map.bin(lu, uu)].next(r)?;
                let vsym = self.v_decoders[self.chaos_map.bin(lv, uv)].next(r)?;
                let alpha = !self.a_reader.read(x, y, r)?;

                let tx = (x >> self.tile_bits) as usize;
                let (sf, cf) = match self.filter_row[tx] {
                    Some(pair) => pair,
                    None => {
                        let ty = y >> self.tile_bits;
                        let sf = self.sf_reader.read(tx as u32, ty, r)? as usize;
                        let cf = self.cf_reader.read(tx as u32, ty, r)? as usize;
                        self.filter_row[tx] = Some((sf, cf));
                        (sf, cf)
                    }
                };

                let rgb_res = (self.cf_subset[cf].inv)([ysym as u8, usym as u8, vsym as u8]);
                let pred = predict(self.sf_subset[sf], &out, x, y, self.xsize);
                let px = [
                    rgb_res[0].wrapping_add(pred[0]),
                    rgb_res[1].wrapping_add(pred[1]),
                    rgb_res[2].wrapping_add(pred[2]),
                    alpha,
                ];
                out[idx * 4..idx * 4 + 4].copy_from_slice(&px);

                self.chaos_y.store(x, residual_score(ysym as u8, 256));
                self.chaos_u.store(x, residual_score(usym as u8, 256));
                self.chaos_v.store(x, residual_score(vsym as u8, 256));
            }
        }

        Ok(out)
    }

    #[inline]
    fn store_zero(&mut self, x: u32) {
        self.chaos_y.store(x, 0);
        self.chaos_u.store(x, 0);
        self.chaos_v.store(x, 0);
    }
}

#[inline]
fn copy_pixel(out: &[u8], idx: usize, dist: u32) -> [u8; 4] {
    let src = (idx - dist as usize) * 4;
    [out[src], out[src + 1], out[src + 2], out[src + 3]]
}
