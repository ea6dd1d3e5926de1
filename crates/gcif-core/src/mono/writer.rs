// crates/gcif-core/src/mono/writer.rs
//
// Design pipeline, in order: mask tiles, design palette filters, design
// filters, design palette tiles, design tiles (greedy + revisit), compute
// residuals, design row filters, recurse on the tile map when it is large
// enough to pay off, design chaos. `process` sweeps the tile-size range and
// keeps the cheapest design.
//
// Neighbor availability: an element predicts from a neighbor only when that
// neighbor is unmasked and emitted earlier (per the host's emission order).
// The reader applies the mirror rule "decoded yet?", so both sides agree
// without signaling.

use crate::bits::BitWriter;
use crate::entropy::coder::EntropyEncoder;
use crate::entropy::estimator::EntropyEstimator;
use crate::entropy::huffman::HuffmanCodes;
use crate::error::{GcifError, Result};
use crate::filters::chaos::{residual_score, ChannelChaos, ChaosMap};
use crate::filters::mono::{MONO_FILTERS, MF_COUNT, MF_FIXED};
use crate::mask::BitGrid;

use super::{
    MonoParams, AWARDS, MASK_TILE, MAX_FILTERS, MAX_PALETTE, MAX_PASSES, MAX_ROW_PASSES,
    NEIGHBOR_REWARD, RECURSIVE_THRESH, RF_COUNT, TODO_TILE,
};

/// Rough serialized cost of one entropy table.
fn table_overhead_bits(distinct: u32) -> f64 {
    distinct as f64 * 7.0 + 16.0
}

pub struct MonoWriter {
    params: MonoParams,
    data: Vec<u8>,

    tile_bits: u32,
    tile_size: u32,
    tiles_x: u32,
    tiles_y: u32,
    tiles: Vec<u8>,
    tile_pos: Vec<u64>,

    filters: Vec<u8>,
    sympal: Vec<u8>,
    row_filters: Vec<u8>,
    residuals: Vec<u8>,

    chaos_levels: usize,
    chaos_map: ChaosMap,
    chaos_row: ChannelChaos,

    child: Option<Box<MonoWriter>>,
    coders: Vec<EntropyEncoder>,
    rf_hist: Vec<u32>,
    rf_codes: Option<HuffmanCodes>,
    seen: Vec<bool>,

    est_bits: f64,
}

impl MonoWriter {
    /// Design a writer for `data`, trying every tile size in the configured
    /// range and keeping the cheapest estimate.
    pub fn process(params: MonoParams, data: Vec<u8>) -> Result<Self> {
        params.validate()?;
        if data.len() != params.xsize as usize * params.ysize as usize {
            return Err(GcifError::InvalidParam("grid size mismatch".into()));
        }

        let max_dim = params.xsize.max(params.ysize);
        let mut best: Option<MonoWriter> = None;
        for bits in params.min_bits..=params.max_bits {
            let cand = MonoWriter::design(params.clone(), data.clone(), bits as u32)?;
            if best.as_ref().map_or(true, |b| cand.est_bits < b.est_bits) {
                best = Some(cand);
            }
            // Once one tile covers the grid, larger tiles design identically.
            if (1u32 << bits) >= max_dim {
                break;
            }
        }
        Ok(best.expect("tile bits range is non-empty"))
    }

    #[inline]
    pub fn xsize(&self) -> u32 {
        self.params.xsize
    }

    #[inline]
    pub fn ysize(&self) -> u32 {
        self.params.ysize
    }

    #[inline]
    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.params.is_masked(x, y)
    }

    #[inline]
    fn filter_count(&self) -> usize {
        self.filters.len() + self.sympal.len()
    }

    #[inline]
    fn tile_index(&self, tx: u32, ty: u32) -> usize {
        (ty * self.tiles_x + tx) as usize
    }

    /// Prediction for element `(x, y)` through catalog filter `cat`, honoring
    /// mask and emission-order availability.
    fn predict(&self, cat: u8, x: u32, y: u32) -> u8 {
        let me = self.params.emit_key(x, y);
        let fetch = |nx: i64, ny: i64| -> u8 {
            if nx < 0 || ny < 0 || nx >= self.params.xsize as i64 {
                return 0;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if self.params.is_masked(nx, ny) || self.params.emit_key(nx, ny) >= me {
                return 0;
            }
            self.data[(ny * self.params.xsize + nx) as usize]
        };
        let a = fetch(x as i64 - 1, y as i64);
        let b = fetch(x as i64, y as i64 - 1);
        let c = fetch(x as i64 - 1, y as i64 - 1);
        let d = fetch(x as i64 + 1, y as i64 - 1);
        (MONO_FILTERS[cat as usize](a, b, c, d) as u16 % self.params.num_syms) as u8
    }

    #[inline]
    fn residual_of(&self, value: u8, cat: u8, x: u32, y: u32) -> u8 {
        let ns = self.params.num_syms;
        let pred = self.predict(cat, x, y) as u16;
        ((value as u16 + ns - pred) % ns) as u8
    }

    /// Row-filter neighbor: zero unless in-grid, coded, and emitted before
    /// this tile.
    fn rf_neighbor(&self, tx: i64, ty: i64, me: u64) -> u8 {
        if tx < 0 || ty < 0 || tx >= self.tiles_x as i64 {
            return 0;
        }
        let t = (ty as u32 * self.tiles_x + tx as u32) as usize;
        if self.tiles[t] == MASK_TILE || self.tile_pos[t] >= me {
            return 0;
        }
        self.tiles[t]
    }

    fn rf_predict(&self, rf: u8, tx: u32, ty: u32) -> u8 {
        let me = self.tile_pos[self.tile_index(tx, ty)];
        let (tx, ty) = (tx as i64, ty as i64);
        match rf {
            super::RF_A => self.rf_neighbor(tx - 1, ty, me),
            super::RF_B => self.rf_neighbor(tx, ty - 1, me),
            super::RF_C => self.rf_neighbor(tx - 1, ty - 1, me),
            _ => 0,
        }
    }

    fn design(params: MonoParams, data: Vec<u8>, tile_bits: u32) -> Result<Self> {
        let tile_size = 1u32 << tile_bits;
        let tiles_x = (params.xsize + tile_size - 1) >> tile_bits;
        let tiles_y = (params.ysize + tile_size - 1) >> tile_bits;
        let tiles_count = tiles_x * tiles_y;

        let mut mw = MonoWriter {
            chaos_row: ChannelChaos::new(params.xsize),
            chaos_map: ChaosMap::new(1),
            params,
            data,
            tile_bits,
            tile_size,
            tiles_x,
            tiles_y,
            tiles: vec![TODO_TILE; tiles_count as usize],
            tile_pos: vec![u64::MAX; tiles_count as usize],
            filters: Vec::new(),
            sympal: Vec::new(),
            row_filters: vec![0; tiles_y as usize],
            residuals: Vec::new(),
            chaos_levels: 1,
            child: None,
            coders: Vec::new(),
            rf_hist: Vec::new(),
            rf_codes: None,
            seen: vec![false; tiles_x as usize],
            est_bits: 0.0,
        };

        mw.mask_tiles();
        let sympal_cand = mw.design_palette_filters();
        let marks = mw.design_filters(&sympal_cand);
        mw.design_palette_tiles(&marks);
        mw.design_tiles();
        mw.compute_residuals();
        let row_bits = mw.design_row_filters();
        let map_bits = mw.recurse_compress(row_bits)?;
        let chaos_bits = mw.design_chaos();

        let header_bits = 3.0
            + 5.0
            + 7.0 * mw.filters.len() as f64
            + 4.0
            + 8.0 * mw.sympal.len() as f64
            + 4.0
            + 1.0;
        mw.est_bits = header_bits + chaos_bits + map_bits;

        mw.coders = (0..mw.chaos_levels)
            .map(|_| EntropyEncoder::new(mw.params.num_syms as usize))
            .collect();
        mw.rf_hist = vec![0; mw.filter_count()];
        Ok(mw)
    }

    /// Visit a tile's unmasked elements.
    fn for_each_element(&self, tx: u32, ty: u32, mut f: impl FnMut(u32, u32, u8)) {
        let x0 = tx << self.tile_bits;
        let y0 = ty << self.tile_bits;
        let x1 = (x0 + self.tile_size).min(self.params.xsize);
        let y1 = (y0 + self.tile_size).min(self.params.ysize);
        for y in y0..y1 {
            for x in x0..x1 {
                if !self.params.is_masked(x, y) {
                    f(x, y, self.data[(y * self.params.xsize + x) as usize]);
                }
            }
        }
    }

    fn mask_tiles(&mut self) {
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let mut any = false;
                let mut pos = u64::MAX;
                self.for_each_element(tx, ty, |x, y, _| {
                    any = true;
                    pos = pos.min(self.params.emit_key(x, y));
                });
                let t = self.tile_index(tx, ty);
                self.tiles[t] = if any { TODO_TILE } else { MASK_TILE };
                self.tile_pos[t] = pos;
            }
        }
    }

    /// Uniform-tile value histogram; values covering enough tiles become
    /// palette-filter candidates.
    fn design_palette_filters(&mut self) -> Vec<u8> {
        let mut hist = [0u32; 256];
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                if self.tiles[self.tile_index(tx, ty)] == MASK_TILE {
                    continue;
                }
                let mut uniform = true;
                let mut value = None;
                self.for_each_element(tx, ty, |_, _, v| match value {
                    None => value = Some(v),
                    Some(u) if u != v => uniform = false,
                    _ => {}
                });
                if uniform {
                    if let Some(v) = value {
                        hist[v as usize] += 1;
                    }
                }
            }
        }

        let thresh = (self.params.sympal_thresh as f64 * (self.tiles_x * self.tiles_y) as f64)
            .max(0.0) as u32;
        let mut cand = Vec::new();
        for (sym, &coverage) in hist.iter().enumerate().take(self.params.num_syms as usize) {
            if coverage > thresh {
                cand.push(sym as u8);
                if cand.len() >= MAX_PALETTE {
                    break;
                }
            }
        }
        cand
    }

    /// Score every catalog filter per tile, award the top few, then select
    /// the filter set by award rank until coverage is satisfied. Returns the
    /// per-tile sympal candidate marks.
    fn design_filters(&mut self, sympal_cand: &[u8]) -> Vec<Option<usize>> {
        let n_cand = MF_COUNT + sympal_cand.len();
        let mut awards = vec![0u64; n_cand];
        let mut marks = vec![None; self.tiles.len()];

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let t = self.tile_index(tx, ty);
                if self.tiles[t] == MASK_TILE {
                    continue;
                }

                let mut scores = [0u64; MF_COUNT];
                let mut uniform = true;
                let mut value = None;
                let mut elems: Vec<(u32, u32, u8)> = Vec::new();
                self.for_each_element(tx, ty, |x, y, v| {
                    match value {
                        None => value = Some(v),
                        Some(u) if u != v => uniform = false,
                        _ => {}
                    }
                    elems.push((x, y, v));
                });
                for &(x, y, v) in &elems {
                    for f in 0..MF_COUNT {
                        let res = self.residual_of(v, f as u8, x, y);
                        scores[f] += residual_score(res, self.params.num_syms) as u64;
                    }
                }

                let mut offset = 0;
                if uniform {
                    if let Some(v) = value {
                        if let Some(k) = sympal_cand.iter().position(|&s| s == v) {
                            awards[MF_COUNT + k] += AWARDS[0] as u64;
                            marks[t] = Some(k);
                            offset = 1;
                        }
                    }
                }

                let mut order: Vec<usize> = (0..MF_COUNT).collect();
                order.sort_by_key(|&f| (scores[f], f));
                for (rank, &f) in order.iter().take(AWARDS.len() - offset).enumerate() {
                    awards[f] += AWARDS[offset + rank] as u64;
                }
            }
        }

        // Fixed defaults always survive.
        let mut chosen: Vec<u8> = (0..MF_FIXED as u8).collect();
        let mut sympal_map = vec![usize::MAX; sympal_cand.len()];
        let mut sympal_list = Vec::new();

        let thresh = self.params.filter_thresh as f64 * (self.tiles_x * self.tiles_y) as f64;
        let mut coverage = 0.0f64;

        let mut order: Vec<usize> = (0..n_cand).collect();
        order.sort_by_key(|&i| (std::cmp::Reverse(awards[i]), i));
        for &i in &order {
            if awards[i] == 0 {
                break;
            }
            coverage += awards[i] as f64 / AWARDS[0] as f64;
            if i < MF_FIXED {
                // Already kept; only its coverage counts.
            } else if i < MF_COUNT {
                chosen.push(i as u8);
            } else {
                let k = i - MF_COUNT;
                sympal_map[k] = sympal_list.len();
                sympal_list.push(sympal_cand[k]);
            }
            if coverage >= thresh || chosen.len() + sympal_list.len() >= MAX_FILTERS {
                break;
            }
        }

        self.filters = chosen;
        self.sympal = sympal_list;

        // Remap candidate marks to selected palette slots.
        for m in marks.iter_mut() {
            if let Some(k) = *m {
                *m = if sympal_map[k] != usize::MAX {
                    Some(sympal_map[k])
                } else {
                    None
                };
            }
        }
        marks
    }

    fn design_palette_tiles(&mut self, marks: &[Option<usize>]) {
        let normal = self.filters.len();
        for (t, m) in marks.iter().enumerate() {
            if self.tiles[t] == MASK_TILE {
                continue;
            }
            if let Some(slot) = m {
                self.tiles[t] = (normal + slot) as u8;
            }
        }
    }

    /// Greedy pass then entropy-revisit passes, nudged toward neighbor
    /// agreement so the tile map itself compresses well.
    fn design_tiles(&mut self) {
        let normal = self.filters.len();
        let mut ee = EntropyEstimator::new(256);
        let mut revisit = self.params.revisit_count;
        let mut codes: Vec<Vec<u8>> = vec![Vec::new(); normal];

        for pass in 0..MAX_PASSES {
            for ty in 0..self.tiles_y {
                for tx in 0..self.tiles_x {
                    let t = self.tile_index(tx, ty);
                    let cur = self.tiles[t];
                    // Masked and palette tiles are settled.
                    if cur == MASK_TILE || (cur as usize) >= normal {
                        continue;
                    }
                    if pass > 0 {
                        if revisit == 0 {
                            return;
                        }
                        revisit -= 1;
                    }

                    let mut elems: Vec<(u32, u32, u8)> = Vec::new();
                    self.for_each_element(tx, ty, |x, y, v| elems.push((x, y, v)));
                    for (f, buf) in codes.iter_mut().enumerate() {
                        buf.clear();
                        let cat = self.filters[f];
                        for &(x, y, v) in &elems {
                            buf.push(self.residual_of(v, cat, x, y));
                        }
                    }

                    if pass > 0 {
                        ee.subtract(&codes[cur as usize]);
                    }

                    let neighbors = [
                        (tx as i64 - 1, ty as i64),
                        (tx as i64, ty as i64 - 1),
                        (tx as i64 - 1, ty as i64 - 1),
                        (tx as i64 + 1, ty as i64 - 1),
                    ];
                    let neighbor_vals: Vec<u8> = neighbors
                        .iter()
                        .filter(|&&(nx, ny)| nx >= 0 && ny >= 0 && nx < self.tiles_x as i64)
                        .map(|&(nx, ny)| self.tiles[(ny as u32 * self.tiles_x + nx as u32) as usize])
                        .collect();

                    let mut best = 0usize;
                    let mut best_cost = f64::MAX;
                    for f in 0..normal {
                        let mut cost = ee.entropy(&codes[f]);
                        if cost == 0.0 {
                            cost -= NEIGHBOR_REWARD;
                        }
                        for &nv in &neighbor_vals {
                            if nv as usize == f {
                                cost -= NEIGHBOR_REWARD;
                            }
                        }
                        if cost < best_cost {
                            best_cost = cost;
                            best = f;
                        }
                    }

                    self.tiles[t] = best as u8;
                    ee.add(&codes[best]);
                }
            }
        }
    }

    fn compute_residuals(&mut self) {
        let normal = self.filters.len();
        self.residuals = vec![0; self.data.len()];
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let t = self.tile_index(tx, ty);
                let f = self.tiles[t];
                if f == MASK_TILE || f as usize >= normal {
                    continue;
                }
                let cat = self.filters[f as usize];
                let mut out: Vec<(usize, u8)> = Vec::new();
                self.for_each_element(tx, ty, |x, y, v| {
                    let res = self.residual_of(v, cat, x, y);
                    out.push(((y * self.params.xsize + x) as usize, res));
                });
                for (idx, res) in out {
                    self.residuals[idx] = res;
                }
            }
        }
    }

    /// Pick one of four predictors per tile row, same subtract-then-rechoose
    /// trick as tile design. Returns the estimated row-filtered map bits.
    fn design_row_filters(&mut self) -> f64 {
        let fc = self.filter_count() as u16;
        let mut ee = EntropyEstimator::new(256);
        let mut total = 0.0;

        let mut row_codes: Vec<Vec<u8>> = vec![Vec::new(); RF_COUNT];
        for pass in 0..MAX_ROW_PASSES {
            total = 0.0;
            for ty in 0..self.tiles_y {
                for buf in row_codes.iter_mut() {
                    buf.clear();
                }
                for tx in 0..self.tiles_x {
                    let t = self.tile_index(tx, ty);
                    let f = self.tiles[t];
                    if f == MASK_TILE {
                        continue;
                    }
                    let me = self.tile_pos[t];
                    let a = self.rf_neighbor(tx as i64 - 1, ty as i64, me);
                    let b = self.rf_neighbor(tx as i64, ty as i64 - 1, me);
                    let c = self.rf_neighbor(tx as i64 - 1, ty as i64 - 1, me);
                    row_codes[0].push(f);
                    row_codes[1].push(((f as u16 + fc - a as u16) % fc) as u8);
                    row_codes[2].push(((f as u16 + fc - b as u16) % fc) as u8);
                    row_codes[3].push(((f as u16 + fc - c as u16) % fc) as u8);
                }

                if pass > 0 {
                    ee.subtract(&row_codes[self.row_filters[ty as usize] as usize]);
                }

                let mut best = 0usize;
                let mut best_cost = f64::MAX;
                for (rf, buf) in row_codes.iter().enumerate() {
                    let cost = ee.entropy(buf);
                    if cost < best_cost {
                        best_cost = cost;
                        best = rf;
                    }
                }
                self.row_filters[ty as usize] = best as u8;
                total += best_cost;
                ee.add(&row_codes[best]);
            }
        }

        // Row selection bits plus the residual table.
        total + 2.0 * self.tiles_y as f64 + table_overhead_bits(ee.distinct())
    }

    /// Try a recursive writer over the tile map; keep it only when its
    /// estimate beats the row filters. Returns the winning map cost.
    fn recurse_compress(&mut self, row_bits: f64) -> Result<f64> {
        if self.tiles_x * self.tiles_y < RECURSIVE_THRESH {
            return Ok(row_bits);
        }

        let mut mask = BitGrid::new(self.tiles_x, self.tiles_y);
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                if self.tiles[self.tile_index(tx, ty)] == MASK_TILE {
                    mask.set(tx, ty);
                }
            }
        }

        let child_params = MonoParams {
            xsize: self.tiles_x,
            ysize: self.tiles_y,
            num_syms: self.filter_count() as u16,
            mask: Some(mask),
            emit_pos: Some(self.tile_pos.clone()),
            ..self.params.clone()
        };
        let child = MonoWriter::process(child_params, self.tiles.clone())?;
        if child.est_bits < row_bits {
            let est = child.est_bits;
            self.child = Some(Box::new(child));
            Ok(est)
        } else {
            Ok(row_bits)
        }
    }

    /// Sweep the chaos level count over the residual plane (raster estimate)
    /// with table overhead included. Returns the winning data cost.
    fn design_chaos(&mut self) -> f64 {
        let normal = self.filters.len();
        let ns = self.params.num_syms;
        let mut best_cost = f64::MAX;
        let mut best_levels = 1;

        for levels in 1..=self.params.max_chaos_levels as usize {
            let map = ChaosMap::new(levels);
            let mut row = vec![0u8; self.params.xsize as usize + 1];
            let mut ees: Vec<EntropyEstimator> =
                (0..levels).map(|_| EntropyEstimator::new(256)).collect();

            for y in 0..self.params.ysize {
                for x in 0..self.params.xsize {
                    if self.params.is_masked(x, y) {
                        continue;
                    }
                    let t = self.tile_index(x >> self.tile_bits, y >> self.tile_bits);
                    let f = self.tiles[t];
                    let xi = x as usize;
                    if f as usize >= normal {
                        row[xi + 1] = 0;
                        continue;
                    }
                    let bin = map.bin(row[xi], row[xi + 1]);
                    let res = self.residuals[(y * self.params.xsize + x) as usize];
                    ees[bin].add_one(res as usize);
                    row[xi + 1] = residual_score(res, ns);
                }
            }

            let cost: f64 = ees
                .iter()
                .map(|ee| ee.entropy_overall() + table_overhead_bits(ee.distinct()))
                .sum();
            if cost < best_cost {
                best_cost = cost;
                best_levels = levels;
            }
        }

        self.chaos_levels = best_levels;
        self.chaos_map = ChaosMap::new(best_levels);
        best_cost
    }

    // ---- emission ----

    /// Histogram pass for one element; must mirror the upcoming `write`
    /// sequence exactly.
    pub fn count(&mut self, x: u32, y: u32) {
        self.element(x, y, None);
    }

    pub fn count_row_header(&mut self, y: u32) {
        self.row_header(y, None);
    }

    /// Close counting, build every table, and arm the write replay.
    pub fn finalize(&mut self) {
        for c in self.coders.iter_mut() {
            c.finalize();
            c.begin_write();
        }
        self.rf_codes = Some(HuffmanCodes::from_hist(&self.rf_hist));
        if let Some(child) = self.child.as_mut() {
            child.finalize();
        }
        self.chaos_row.reset();
        self.seen.fill(false);
    }

    pub fn write_tables(&self, w: &mut BitWriter) {
        w.write_bits(self.tile_bits - 1, 3);

        w.write_bits(self.filters.len() as u32 - 1, 5);
        for &f in &self.filters {
            w.write_bits(f as u32, 7);
        }

        w.write_bits(self.sympal.len() as u32, 4);
        for &v in &self.sympal {
            w.write_bits(v as u32, 8);
        }

        w.write_bits(self.chaos_levels as u32 - 1, 4);
        for c in &self.coders {
            c.write_table(w);
        }

        match &self.child {
            Some(child) => {
                w.write_bit(true);
                child.write_tables(w);
            }
            None => {
                w.write_bit(false);
                self.rf_codes
                    .as_ref()
                    .expect("finalize before write_tables")
                    .write_table(w);
            }
        }
    }

    pub fn write_row_header(&mut self, y: u32, w: &mut BitWriter) {
        self.row_header(y, Some(w));
    }

    pub fn write(&mut self, x: u32, y: u32, w: &mut BitWriter) {
        self.element(x, y, Some(w));
    }

    fn row_header(&mut self, y: u32, out: Option<&mut BitWriter>) {
        if y & (self.tile_size - 1) != 0 {
            return;
        }
        self.seen.fill(false);
        let ty = y >> self.tile_bits;
        match self.child.as_mut() {
            Some(child) => child.row_header(ty, out),
            None => {
                if let Some(w) = out {
                    w.write_bits(self.row_filters[ty as usize] as u32, 2);
                }
            }
        }
    }

    fn element(&mut self, x: u32, y: u32, mut out: Option<&mut BitWriter>) {
        debug_assert!(!self.params.is_masked(x, y));
        let tx = x >> self.tile_bits;
        let ty = y >> self.tile_bits;
        let t = self.tile_index(tx, ty);

        if !self.seen[tx as usize] {
            self.seen[tx as usize] = true;
            let f = self.tiles[t];
            debug_assert!(f != MASK_TILE);
            if let Some(child) = self.child.as_mut() {
                child.element(tx, ty, out.as_deref_mut());
            } else {
                let rf = self.row_filters[ty as usize];
                let pred = self.rf_predict(rf, tx, ty) as u16;
                let fc = self.filter_count() as u16;
                let res = ((f as u16 + fc - pred) % fc) as usize;
                match out.as_deref_mut() {
                    Some(w) => self
                        .rf_codes
                        .as_ref()
                        .expect("finalize before write")
                        .write(res, w),
                    None => self.rf_hist[res] += 1,
                }
            }
        }

        let f = self.tiles[t];
        if (f as usize) < self.filters.len() {
            let (left, up) = self.chaos_row.scores(x);
            let bin = self.chaos_map.bin(left, up);
            let res = self.residuals[(y * self.params.xsize + x) as usize];
            match out {
                Some(w) => self.coders[bin].write(res as u16, w),
                None => self.coders[bin].add(res as u16),
            }
            self.chaos_row.store(x, residual_score(res, self.params.num_syms));
        } else {
            // Palette filter: the tile index already carries the value.
            self.chaos_row.store(x, 0);
        }
    }
}
