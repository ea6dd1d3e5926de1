// crates/gcif-core/src/rgba/writer.rs
//
// Top-level RGBA encoder. Phases run in a fixed order: mask tiles, design
// the joint SF/CF subsets, assign per-tile pairs (greedy + revisits), sort
// the subsets for tile-map coherence, materialize residuals, price them,
// design LZ, compress alpha, design chaos, compute the write order, then
// compress the two tile maps. Emission is two passes over the identical
// pixel walk: a counting replay that fills every histogram, then the real
// bit-producing pass.

use crate::bits::BitWriter;
use crate::entropy::coder::EntropyEncoder;
use crate::entropy::estimator::EntropyEstimator;
use crate::error::{GcifError, Result};
use crate::filters::chaos::{residual_score, ChannelChaos, ChaosMap};
use crate::filters::color::{COLOR_FILTERS, CF_COUNT, CF_FIXED};
use crate::filters::spatial::{predict, SPATIAL_FILTERS, SF_COUNT, SF_FIXED};
use crate::knobs::EncoderKnobs;
use crate::lz::finder::find_rgba_matches;
use crate::lz::{length_class, write_distance, write_length_tail, LzMatch};
use crate::mask::{BitGrid, MaskPlane};
use crate::mono::{MonoParams, MonoWriter, AWARDS, MASK_TILE, MAX_PASSES};
use crate::stats::EncodeStats;

use super::{NUM_UV_SYMS, NUM_Y_SYMS};

/// Maximum spatial filters the header can carry.
const MAX_SF: usize = 32;

fn table_overhead_bits(distinct: u32) -> f64 {
    distinct as f64 * 7.0 + 16.0
}

pub struct RgbaWriter<'a> {
    xsize: u32,
    ysize: u32,
    mask: &'a MaskPlane,
    knobs: EncoderKnobs,

    tile_bits: u32,
    tile_size: u32,
    sf_subset: Vec<u8>,
    cf_subset: Vec<u8>,

    residuals: Vec<u8>, // [y, u, v, unused] per pixel
    matches: Vec<LzMatch>,

    sf_mono: MonoWriter,
    cf_mono: MonoWriter,
    a_mono: MonoWriter,

    chaos_levels: usize,
    chaos_map: ChaosMap,
    chaos_y: ChannelChaos,
    chaos_u: ChannelChaos,
    chaos_v: ChannelChaos,
    y_coders: Vec<EntropyEncoder>,
    u_coders: Vec<EntropyEncoder>,
    v_coders: Vec<EntropyEncoder>,

    seen: Vec<bool>,
    stats: EncodeStats,
}

struct TileDesign {
    tile_bits: u32,
    tile_size: u32,
    tiles_x: u32,
    tiles_y: u32,
    sf_tiles: Vec<u8>,
    cf_tiles: Vec<u8>,
}

impl<'a> RgbaWriter<'a> {
    pub fn new(
        rgba: &'a [u8],
        xsize: u32,
        ysize: u32,
        mask: &'a MaskPlane,
        knobs: EncoderKnobs,
    ) -> Result<Self> {
        knobs.validate()?;
        if xsize == 0 || ysize == 0 || xsize > u16::MAX as u32 || ysize > u16::MAX as u32 {
            return Err(GcifError::InvalidParam(format!(
                "image dimensions {}x{} out of range",
                xsize, ysize
            )));
        }
        let n = (xsize as usize)
            .checked_mul(ysize as usize)
            .and_then(|p| p.checked_mul(4))
            .ok_or_else(|| GcifError::InvalidParam("image size overflows".into()))?;
        if rgba.len() != n {
            return Err(GcifError::InvalidParam(format!(
                "rgba plane is {} bytes, expected {}",
                rgba.len(),
                n
            )));
        }

        let mut td = mask_tiles(xsize, ysize, mask, knobs.tile_bits as u32);
        let (mut sf_subset, mut cf_subset) =
            design_filters(rgba, xsize, mask, &td, knobs.filter_thresh);
        design_tiles(rgba, xsize, mask, &mut td, &sf_subset, &cf_subset, &knobs);
        sort_filters(&mut td, &mut sf_subset, &mut cf_subset);
        let residuals = compute_residuals(rgba, xsize, mask, &td, &sf_subset, &cf_subset);
        let costs = price_residuals(&residuals, xsize, ysize, mask);

        let matches = if knobs.lz_enabled {
            let pixels: Vec<u32> = rgba
                .chunks_exact(4)
                .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
                .collect();
            find_rgba_matches(&pixels, &costs, |i| {
                mask.masked(i as u32 % xsize, i as u32 / xsize)
            })
        } else {
            Vec::new()
        };

        let mut lz_cover = BitGrid::new(xsize, ysize);
        let mut lz_covered: u64 = 0;
        for m in &matches {
            for i in m.offset as usize..m.offset as usize + m.length as usize {
                lz_cover.set_index(i);
            }
            lz_covered += m.length as u64;
        }

        // Write order: the first literal pixel per tile decides when (and
        // whether) that tile's filters hit the stream.
        let first_literal = generate_write_order(xsize, ysize, mask, &matches, &td);

        let a_mono = {
            let alpha_inv: Vec<u8> = rgba.chunks_exact(4).map(|p| !p[3]).collect();
            let mut amask = BitGrid::new(xsize, ysize);
            for y in 0..ysize {
                for x in 0..xsize {
                    if mask.masked(x, y) || lz_cover.get(x, y) {
                        amask.set(x, y);
                    }
                }
            }
            MonoWriter::process(mono_params(&knobs, xsize, ysize, 256, Some(amask), None), alpha_inv)?
        };

        let (chaos_levels, chaos_map) =
            design_chaos(&residuals, xsize, ysize, mask, &matches, &knobs);

        let tile_mono_mask = {
            let mut g = BitGrid::new(td.tiles_x, td.tiles_y);
            for (t, &pos) in first_literal.iter().enumerate() {
                if pos == u64::MAX {
                    g.set_index(t);
                }
            }
            g
        };
        let sf_mono = MonoWriter::process(
            mono_params(
                &knobs,
                td.tiles_x,
                td.tiles_y,
                sf_subset.len() as u16,
                Some(tile_mono_mask.clone()),
                Some(first_literal.clone()),
            ),
            td.sf_tiles.clone(),
        )?;
        let cf_mono = MonoWriter::process(
            mono_params(
                &knobs,
                td.tiles_x,
                td.tiles_y,
                cf_subset.len() as u16,
                Some(tile_mono_mask),
                Some(first_literal),
            ),
            td.cf_tiles.clone(),
        )?;

        let stats = EncodeStats {
            tile_bits: td.tile_bits as u8,
            chaos_levels: chaos_levels as u8,
            sf_filters: sf_subset.len() as u8,
            cf_filters: cf_subset.len() as u8,
            lz_matches: matches.len() as u32,
            lz_covered_pixels: lz_covered,
            ..EncodeStats::default()
        };

        Ok(RgbaWriter {
            xsize,
            ysize,
            mask,
            knobs,
            tile_bits: td.tile_bits,
            tile_size: td.tile_size,
            sf_subset,
            cf_subset,
            residuals,
            matches,
            sf_mono,
            cf_mono,
            a_mono,
            chaos_levels,
            chaos_map,
            chaos_y: ChannelChaos::new(xsize),
            chaos_u: ChannelChaos::new(xsize),
            chaos_v: ChannelChaos::new(xsize),
            y_coders: (0..chaos_levels).map(|_| EntropyEncoder::new(NUM_Y_SYMS)).collect(),
            u_coders: (0..chaos_levels).map(|_| EntropyEncoder::new(NUM_UV_SYMS)).collect(),
            v_coders: (0..chaos_levels).map(|_| EntropyEncoder::new(NUM_UV_SYMS)).collect(),
            seen: vec![false; td.tiles_x as usize],
            stats,
        })
    }

    pub fn stats(&self) -> EncodeStats {
        self.stats
    }

    /// Emit tables and pixels. Call once.
    pub fn write(&mut self, w: &mut BitWriter) -> Result<()> {
        // Counting replay.
        self.pixel_pass(None);
        for c in self.y_coders.iter_mut().chain(&mut self.u_coders).chain(&mut self.v_coders) {
            c.finalize();
            c.begin_write();
        }
        self.sf_mono.finalize();
        self.cf_mono.finalize();
        self.a_mono.finalize();
        self.chaos_y.reset();
        self.chaos_u.reset();
        self.chaos_v.reset();
        self.seen.fill(false);

        self.write_tables(w);
        let mark = w.bit_count();
        self.pixel_pass(Some(w));
        self.stats.pixel_bits = w.bit_count() - mark;
        self.stats.total_bits = w.bit_count();
        Ok(())
    }

    fn write_tables(&mut self, w: &mut BitWriter) {
        w.write_bits(self.tile_bits - 1, 3);

        w.write_bits(self.sf_subset.len() as u32 - 1, 5);
        for &f in &self.sf_subset {
            w.write_bits(f as u32, 7);
        }
        w.write_bits(self.cf_subset.len() as u32 - 1, 4);
        for &f in &self.cf_subset {
            w.write_bits(f as u32, 4);
        }

        w.write_bits(self.chaos_levels as u32 - 1, 5);
        w.write_bit(self.knobs.lz_enabled);

        let mut mark = w.bit_count();
        self.sf_mono.write_tables(w);
        self.stats.sf_table_bits = w.bit_count() - mark;

        mark = w.bit_count();
        self.cf_mono.write_tables(w);
        self.stats.cf_table_bits = w.bit_count() - mark;

        mark = w.bit_count();
        self.a_mono.write_tables(w);
        self.stats.alpha_table_bits = w.bit_count() - mark;

        mark = w.bit_count();
        for bin in 0..self.chaos_levels {
            self.y_coders[bin].write_table(w);
            self.u_coders[bin].write_table(w);
            self.v_coders[bin].write_table(w);
        }
        self.stats.chaos_table_bits = w.bit_count() - mark;
    }

    /// One walk over every pixel, shared by the counting and writing
    /// passes. The sequence of coder and chaos operations must be identical
    /// in both, and identical to the decoder's.
    fn pixel_pass(&mut self, mut out: Option<&mut BitWriter>) {
        let mut next_match = 0usize;
        let mut run_remaining: u32 = 0;

        for y in 0..self.ysize {
            if y & (self.tile_size - 1) == 0 {
                let ty = y >> self.tile_bits;
                match out.as_deref_mut() {
                    Some(w) => {
                        self.sf_mono.write_row_header(ty, w);
                        self.cf_mono.write_row_header(ty, w);
                    }
                    None => {
                        self.sf_mono.count_row_header(ty);
                        self.cf_mono.count_row_header(ty);
                    }
                }
                self.seen.fill(false);
            }
            match out.as_deref_mut() {
                Some(w) => self.a_mono.write_row_header(y, w),
                None => self.a_mono.count_row_header(y),
            }

            for x in 0..self.xsize {
                let idx = (y * self.xsize + x) as usize;

                if run_remaining > 0 {
                    run_remaining -= 1;
                    self.store_zero(x);
                    continue;
                }
                if self.mask.masked(x, y) {
                    self.store_zero(x);
                    continue;
                }

                if next_match < self.matches.len() && self.matches[next_match].offset as usize == idx
                {
                    let m = self.matches[next_match];
                    next_match += 1;
                    let (ly, uy) = self.chaos_y.scores(x);
                    let bin = self.chaos_map.bin(ly, uy);
                    let sym = (256 + length_class(m.length)) as u16;
                    match out.as_deref_mut() {
                        Some(w) => {
                            self.y_coders[bin].write(sym, w);
                            write_length_tail(m.length, w);
                            write_distance(m.distance, w);
                        }
                        None => self.y_coders[bin].add(sym),
                    }
                    run_remaining = m.length as u32 - 1;
                    self.store_zero(x);
                    continue;
                }

                // Literal pixel: Y, U, V, alpha, then the tile's filters the
                // first time the tile is touched.
                let ry = self.residuals[idx * 4];
                let ru = self.residuals[idx * 4 + 1];
                let rv = self.residuals[idx * 4 + 2];

                let (ly, uy) = self.chaos_y.scores(x);
                let (lu, uu) = self.chaos_u.scores(x);
                let (lv, uv) = self.chaos_v.scores(x);
                let by = self.chaos_map.bin(ly, uy);
                let bu = self.chaos_map.bin(lu, uu);
                let bv = self.chaos_map.bin(lv, uv);

                match out.as_deref_mut() {
                    Some(w) => {
                        self.y_coders[by].write(ry as u16, w);
                        self.u_coders[bu].write(ru as u16, w);
                        self.v_coders[bv].write(rv as u16, w);
                        self.a_mono.write(x, y, w);
                    }
                    None => {
                        self.y_coders[by].add(ry as u16);
                        self.u_coders[bu].add(ru as u16);
                        self.v_coders[bv].add(rv as u16);
                        self.a_mono.count(x, y);
                    }
                }

                let tx = x >> self.tile_bits;
                if !self.seen[tx as usize] {
                    self.seen[tx as usize] = true;
                    let ty = y >> self.tile_bits;
                    match out.as_deref_mut() {
                        Some(w) => {
                            self.sf_mono.write(tx, ty, w);
                            self.cf_mono.write(tx, ty, w);
                        }
                        None => {
                            self.sf_mono.count(tx, ty);
                            self.cf_mono.count(tx, ty);
                        }
                    }
                }

                self.chaos_y.store(x, residual_score(ry, 256));
                self.chaos_u.store(x, residual_score(ru, 256));
                self.chaos_v.store(x, residual_score(rv, 256));
            }
        }
    }

    #[inline]
    fn store_zero(&mut self, x: u32) {
        self.chaos_y.store(x, 0);
        self.chaos_u.store(x, 0);
        self.chaos_v.store(x, 0);
    }
}

fn mono_params(
    knobs: &EncoderKnobs,
    xsize: u32,
    ysize: u32,
    num_syms: u16,
    mask: Option<BitGrid>,
    emit_pos: Option<Vec<u64>>,
) -> MonoParams {
    MonoParams {
        xsize,
        ysize,
        num_syms,
        min_bits: knobs.mono_min_bits,
        max_bits: knobs.mono_max_bits,
        max_chaos_levels: knobs.mono_max_chaos_levels,
        sympal_thresh: knobs.sympal_thresh,
        filter_thresh: knobs.filter_thresh,
        revisit_count: knobs.revisit_count,
        mask,
        emit_pos,
    }
}

fn mask_tiles(xsize: u32, ysize: u32, mask: &MaskPlane, tile_bits: u32) -> TileDesign {
    let tile_size = 1u32 << tile_bits;
    let tiles_x = (xsize + tile_size - 1) >> tile_bits;
    let tiles_y = (ysize + tile_size - 1) >> tile_bits;
    let count = (tiles_x * tiles_y) as usize;
    let mut sf_tiles = vec![0u8; count];
    let mut cf_tiles = vec![0u8; count];

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut all_masked = true;
            'tile: for y in (ty << tile_bits)..((ty + 1) << tile_bits).min(ysize) {
                for x in (tx << tile_bits)..((tx + 1) << tile_bits).min(xsize) {
                    if !mask.masked(x, y) {
                        all_masked = false;
                        break 'tile;
                    }
                }
            }
            if all_masked {
                let t = (ty * tiles_x + tx) as usize;
                sf_tiles[t] = MASK_TILE;
                cf_tiles[t] = MASK_TILE;
            }
        }
    }

    TileDesign {
        tile_bits,
        tile_size,
        tiles_x,
        tiles_y,
        sf_tiles,
        cf_tiles,
    }
}

/// YUV residual of one pixel under a (spatial, color) catalog pair.
#[inline]
fn residual_at(rgba: &[u8], xsize: u32, x: u32, y: u32, sf: usize, cf: usize) -> [u8; 3] {
    let i = ((y * xsize + x) * 4) as usize;
    let pred = predict(SPATIAL_FILTERS[sf], rgba, x, y, xsize);
    let rgb = [
        rgba[i].wrapping_sub(pred[0]),
        rgba[i + 1].wrapping_sub(pred[1]),
        rgba[i + 2].wrapping_sub(pred[2]),
    ];
    (COLOR_FILTERS[cf].fwd)(rgb)
}

#[inline]
fn score3(yuv: [u8; 3]) -> u64 {
    residual_score(yuv[0], 256) as u64
        + residual_score(yuv[1], 256) as u64
        + residual_score(yuv[2], 256) as u64
}

fn tile_pixels(
    xsize: u32,
    ysize: u32,
    mask: &MaskPlane,
    td: &TileDesign,
    tx: u32,
    ty: u32,
) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for y in (ty << td.tile_bits)..((ty + 1) << td.tile_bits).min(ysize) {
        for x in (tx << td.tile_bits)..((tx + 1) << td.tile_bits).min(xsize) {
            if !mask.masked(x, y) {
                out.push((x, y));
            }
        }
    }
    out
}

/// Joint SF x CF scoring: each tile awards its best few pairs; the global
/// award tallies pick the active subsets, fixed defaults always included.
fn design_filters(
    rgba: &[u8],
    xsize: u32,
    mask: &MaskPlane,
    td: &TileDesign,
    filter_thresh: f32,
) -> (Vec<u8>, Vec<u8>) {
    let ysize = rgba.len() as u32 / 4 / xsize;
    let mut award_sf = [0u64; SF_COUNT];
    let mut award_cf = [0u64; CF_COUNT];

    for ty in 0..td.tiles_y {
        for tx in 0..td.tiles_x {
            let t = (ty * td.tiles_x + tx) as usize;
            if td.sf_tiles[t] == MASK_TILE {
                continue;
            }
            let pixels = tile_pixels(xsize, ysize, mask, td, tx, ty);
            if pixels.is_empty() {
                continue;
            }

            let mut pairs: Vec<(u64, usize, usize)> = Vec::with_capacity(SF_COUNT * CF_COUNT);
            for sf in 0..SF_COUNT {
                let rgb_res: Vec<[u8; 3]> = pixels
                    .iter()
                    .map(|&(x, y)| {
                        let i = ((y * xsize + x) * 4) as usize;
                        let pred = predict(SPATIAL_FILTERS[sf], rgba, x, y, xsize);
                        [
                            rgba[i].wrapping_sub(pred[0]),
                            rgba[i + 1].wrapping_sub(pred[1]),
                            rgba[i + 2].wrapping_sub(pred[2]),
                        ]
                    })
                    .collect();
                for cf in 0..CF_COUNT {
                    let score: u64 = rgb_res
                        .iter()
                        .map(|&r| score3((COLOR_FILTERS[cf].fwd)(r)))
                        .sum();
                    pairs.push((score, sf, cf));
                }
            }
            pairs.sort_by_key(|&(s, sf, cf)| (s, sf, cf));
            for (rank, &(_, sf, cf)) in pairs.iter().take(AWARDS.len()).enumerate() {
                award_sf[sf] += AWARDS[rank] as u64;
                award_cf[cf] += AWARDS[rank] as u64;
            }
        }
    }

    let tiles_count = (td.tiles_x * td.tiles_y) as f64;
    let thresh = filter_thresh as f64 * tiles_count;
    let sf = select_bank(&award_sf, SF_FIXED, MAX_SF, thresh);
    let cf = select_bank(&award_cf, CF_FIXED, CF_COUNT, thresh);
    (sf, cf)
}

fn select_bank(awards: &[u64], fixed: usize, max: usize, thresh: f64) -> Vec<u8> {
    let mut chosen: Vec<u8> = (0..fixed as u8).collect();
    let mut order: Vec<usize> = (0..awards.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(awards[i]), i));

    let mut coverage = 0.0;
    for &i in &order {
        if awards[i] == 0 {
            break;
        }
        coverage += awards[i] as f64 / AWARDS[0] as f64;
        if i >= fixed {
            chosen.push(i as u8);
        }
        if coverage >= thresh || chosen.len() >= max {
            break;
        }
    }
    chosen
}

/// Greedy pair assignment, then entropy-driven revisit passes with a nudge
/// toward agreeing with neighbor tiles.
fn design_tiles(
    rgba: &[u8],
    xsize: u32,
    mask: &MaskPlane,
    td: &mut TileDesign,
    sf_subset: &[u8],
    cf_subset: &[u8],
    knobs: &EncoderKnobs,
) {
    let ysize = rgba.len() as u32 / 4 / xsize;
    let mut ee = EntropyEstimator::new(256);
    let mut revisit = knobs.revisit_count;

    for pass in 0..MAX_PASSES {
        for ty in 0..td.tiles_y {
            for tx in 0..td.tiles_x {
                let t = (ty * td.tiles_x + tx) as usize;
                if td.sf_tiles[t] == MASK_TILE {
                    continue;
                }
                if pass > 0 {
                    if revisit == 0 {
                        return;
                    }
                    revisit -= 1;
                }

                let pixels = tile_pixels(xsize, ysize, mask, td, tx, ty);
                if pixels.is_empty() {
                    continue;
                }

                let codes_for = |si: usize, ci: usize| -> Vec<u8> {
                    let mut codes = Vec::with_capacity(pixels.len() * 3);
                    for &(x, y) in &pixels {
                        let yuv = residual_at(
                            rgba,
                            xsize,
                            x,
                            y,
                            sf_subset[si] as usize,
                            cf_subset[ci] as usize,
                        );
                        codes.extend_from_slice(&yuv);
                    }
                    codes
                };

                if pass > 0 {
                    let old = codes_for(td.sf_tiles[t] as usize, td.cf_tiles[t] as usize);
                    ee.subtract(&old);
                }

                let neighbor = |dx: i64, dy: i64| -> Option<(u8, u8)> {
                    let nx = tx as i64 + dx;
                    let ny = ty as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= td.tiles_x as i64 {
                        return None;
                    }
                    let n = (ny as u32 * td.tiles_x + nx as u32) as usize;
                    if td.sf_tiles[n] == MASK_TILE {
                        None
                    } else {
                        Some((td.sf_tiles[n], td.cf_tiles[n]))
                    }
                };
                let neighbors: Vec<(u8, u8)> = [(-1, 0), (0, -1), (-1, -1), (1, -1)]
                    .iter()
                    .filter_map(|&(dx, dy)| neighbor(dx, dy))
                    .collect();

                let mut best = (0usize, 0usize);
                let mut best_cost = f64::MAX;
                for si in 0..sf_subset.len() {
                    for ci in 0..cf_subset.len() {
                        let codes = codes_for(si, ci);
                        let mut cost = ee.entropy(&codes);
                        for &(nsf, ncf) in &neighbors {
                            if nsf as usize == si {
                                cost -= 1.0;
                            }
                            if ncf as usize == ci {
                                cost -= 1.0;
                            }
                        }
                        if cost < best_cost {
                            best_cost = cost;
                            best = (si, ci);
                        }
                    }
                }

                td.sf_tiles[t] = best.0 as u8;
                td.cf_tiles[t] = best.1 as u8;
                ee.add(&codes_for(best.0, best.1));
            }
        }
    }
}

/// Frequency-sort both subsets so common filters take small indices; the
/// tile maps shrink under the monochrome coder when neighboring indices
/// correlate.
fn sort_filters(td: &mut TileDesign, sf_subset: &mut Vec<u8>, cf_subset: &mut Vec<u8>) {
    for (subset, tiles) in [
        (&mut *sf_subset, &mut td.sf_tiles),
        (&mut *cf_subset, &mut td.cf_tiles),
    ] {
        let mut usage = vec![0u64; subset.len()];
        for &t in tiles.iter() {
            if t != MASK_TILE {
                usage[t as usize] += 1;
            }
        }
        let mut order: Vec<usize> = (0..subset.len()).collect();
        order.sort_by_key(|&i| (std::cmp::Reverse(usage[i]), i));

        let mut remap = vec![0u8; subset.len()];
        let mut new_subset = vec![0u8; subset.len()];
        for (new_i, &old_i) in order.iter().enumerate() {
            remap[old_i] = new_i as u8;
            new_subset[new_i] = subset[old_i];
        }
        *subset = new_subset;
        for t in tiles.iter_mut() {
            if *t != MASK_TILE {
                *t = remap[*t as usize];
            }
        }
    }
}

fn compute_residuals(
    rgba: &[u8],
    xsize: u32,
    mask: &MaskPlane,
    td: &TileDesign,
    sf_subset: &[u8],
    cf_subset: &[u8],
) -> Vec<u8> {
    let ysize = rgba.len() as u32 / 4 / xsize;
    let mut residuals = vec![0u8; rgba.len()];
    for ty in 0..td.tiles_y {
        for tx in 0..td.tiles_x {
            let t = (ty * td.tiles_x + tx) as usize;
            if td.sf_tiles[t] == MASK_TILE {
                continue;
            }
            let sf = sf_subset[td.sf_tiles[t] as usize] as usize;
            let cf = cf_subset[td.cf_tiles[t] as usize] as usize;
            for (x, y) in tile_pixels(xsize, ysize, mask, td, tx, ty) {
                let yuv = residual_at(rgba, xsize, x, y, sf, cf);
                let i = ((y * xsize + x) * 4) as usize;
                residuals[i..i + 3].copy_from_slice(&yuv);
            }
        }
    }
    residuals
}

/// Approximate bits per pixel from single-context channel histograms; the
/// LZ cost model spends these.
fn price_residuals(residuals: &[u8], xsize: u32, ysize: u32, mask: &MaskPlane) -> Vec<u8> {
    let n = (xsize * ysize) as usize;
    let mut hist = [[0u64; 256]; 3];
    let mut total = 0u64;
    for y in 0..ysize {
        for x in 0..xsize {
            if mask.masked(x, y) {
                continue;
            }
            let i = ((y * xsize + x) * 4) as usize;
            for c in 0..3 {
                hist[c][residuals[i + c] as usize] += 1;
            }
            total += 1;
        }
    }

    let mut costs = vec![0u8; n];
    if total == 0 {
        return costs;
    }
    for y in 0..ysize {
        for x in 0..xsize {
            if mask.masked(x, y) {
                continue;
            }
            let i = ((y * xsize + x) * 4) as usize;
            let mut bits = 1.0f64; // alpha
            for c in 0..3 {
                let h = hist[c][residuals[i + c] as usize].max(1);
                bits += -((h as f64 / total as f64).log2());
            }
            costs[(y * xsize + x) as usize] = bits.round().clamp(1.0, 255.0) as u8;
        }
    }
    costs
}

/// Raster index of the first literal pixel per tile (u64::MAX when the tile
/// never emits filters).
fn generate_write_order(
    xsize: u32,
    ysize: u32,
    mask: &MaskPlane,
    matches: &[LzMatch],
    td: &TileDesign,
) -> Vec<u64> {
    let mut first = vec![u64::MAX; (td.tiles_x * td.tiles_y) as usize];
    let mut next_match = 0usize;
    let mut run_remaining = 0u32;
    for y in 0..ysize {
        for x in 0..xsize {
            let idx = (y * xsize + x) as u64;
            if run_remaining > 0 {
                run_remaining -= 1;
                continue;
            }
            if mask.masked(x, y) {
                continue;
            }
            if next_match < matches.len() && matches[next_match].offset as u64 == idx {
                run_remaining = matches[next_match].length as u32 - 1;
                next_match += 1;
                continue;
            }
            let t = ((y >> td.tile_bits) * td.tiles_x + (x >> td.tile_bits)) as usize;
            if first[t] == u64::MAX {
                first[t] = idx;
            }
        }
    }
    first
}

/// Sweep the chaos level count over an exact replay of the emission walk;
/// table overhead keeps large level counts honest.
fn design_chaos(
    residuals: &[u8],
    xsize: u32,
    ysize: u32,
    mask: &MaskPlane,
    matches: &[LzMatch],
    knobs: &EncoderKnobs,
) -> (usize, ChaosMap) {
    let mut best_levels = 1;
    let mut best_cost = f64::MAX;

    for levels in 1..=knobs.max_chaos_levels as usize {
        let map = ChaosMap::new(levels);
        let mut row_y = vec![0u8; xsize as usize + 1];
        let mut row_u = vec![0u8; xsize as usize + 1];
        let mut row_v = vec![0u8; xsize as usize + 1];
        let mut ee_y: Vec<EntropyEstimator> =
            (0..levels).map(|_| EntropyEstimator::new(NUM_Y_SYMS)).collect();
        let mut ee_u: Vec<EntropyEstimator> =
            (0..levels).map(|_| EntropyEstimator::new(NUM_UV_SYMS)).collect();
        let mut ee_v: Vec<EntropyEstimator> =
            (0..levels).map(|_| EntropyEstimator::new(NUM_UV_SYMS)).collect();

        let mut next_match = 0usize;
        let mut run_remaining = 0u32;
        for y in 0..ysize {
            for x in 0..xsize {
                let idx = (y * xsize + x) as usize;
                let xi = x as usize;
                if run_remaining > 0 {
                    run_remaining -= 1;
                    row_y[xi + 1] = 0;
                    row_u[xi + 1] = 0;
                    row_v[xi + 1] = 0;
                    continue;
                }
                if mask.masked(x, y) {
                    row_y[xi + 1] = 0;
                    row_u[xi + 1] = 0;
                    row_v[xi + 1] = 0;
                    continue;
                }
                if next_match < matches.len() && matches[next_match].offset as usize == idx {
                    let m = matches[next_match];
                    next_match += 1;
                    let bin = map.bin(row_y[xi], row_y[xi + 1]);
                    ee_y[bin].add_one(256 + length_class(m.length) as usize);
                    run_remaining = m.length as u32 - 1;
                    row_y[xi + 1] = 0;
                    row_u[xi + 1] = 0;
                    row_v[xi + 1] = 0;
                    continue;
                }

                let ry = residuals[idx * 4];
                let ru = residuals[idx * 4 + 1];
                let rv = residuals[idx * 4 + 2];
                let by = map.bin(row_y[xi], row_y[xi + 1]);
                let bu = map.bin(row_u[xi], row_u[xi + 1]);
                let bv = map.bin(row_v[xi], row_v[xi + 1]);
                ee_y[by].add_one(ry as usize);
                ee_u[bu].add_one(ru as usize);
                ee_v[bv].add_one(rv as usize);
                row_y[xi + 1] = residual_score(ry, 256);
                row_u[xi + 1] = residual_score(ru, 256);
                row_v[xi + 1] = residual_score(rv, 256);
            }
        }

        let cost: f64 = ee_y
            .iter()
            .chain(&ee_u)
            .chain(&ee_v)
            .map(|ee| ee.entropy_overall() + table_overhead_bits(ee.distinct()))
            .sum();
        if cost < best_cost {
            best_cost = cost;
            best_levels = levels;
        }
    }

    (best_levels, ChaosMap::new(best_levels))
}
