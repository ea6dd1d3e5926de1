// crates/gcif-core/src/entropy/huffman.rs
//
// Canonical, length-limited static Huffman codes plus their wire form.
//
// Table serialization uses the DEFLATE code-length scheme: symbols 0..=15
// are literal lengths, 16 repeats the previous length 3-6 times (2 extra
// bits), 17 repeats zero 3-10 times (3 extra bits), 18 repeats zero 11-138
// times (7 extra bits). The 19 meta lengths travel first, 3 bits each, in
// the fixed order below with trailing zeros elided.
//
// Decoding runs through a first-level table over 7-bit prefixes; codes
// longer than 7 bits fall through to canonical per-length resolution.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::bits::{BitReader, BitWriter};
use crate::error::{corrupt, GcifError, Result};

pub const MAX_CODE_LEN: u32 = 15;
pub const META_MAX_CODE_LEN: u32 = 7;
pub const HUFF_LUT_BITS: u32 = 7;

const META_SYMS: usize = 19;
const META_ORDER: [usize; META_SYMS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Code lengths for `hist`, limited to `max_len` bits. Frequencies are
/// halved and the tree rebuilt until the limit holds; with n <= 512 symbols
/// the all-ones fallback is depth 9, so this always terminates.
pub fn build_lengths(hist: &[u32], max_len: u32) -> Vec<u8> {
    let mut freq: Vec<u64> = hist.iter().map(|&f| f as u64).collect();
    loop {
        let lens = tree_lengths(&freq);
        let deepest = lens.iter().copied().max().unwrap_or(0) as u32;
        if deepest <= max_len {
            return lens;
        }
        for f in freq.iter_mut() {
            if *f > 0 {
                *f = (*f + 1) >> 1;
            }
        }
    }
}

fn tree_lengths(freq: &[u64]) -> Vec<u8> {
    let used: Vec<usize> = (0..freq.len()).filter(|&s| freq[s] > 0).collect();
    let mut lens = vec![0u8; freq.len()];
    match used.len() {
        0 => return lens,
        1 => {
            lens[used[0]] = 1;
            return lens;
        }
        _ => {}
    }

    // Flat arena of nodes: leaves first, then internals.
    let cap = 2 * used.len();
    let mut node_freq: Vec<u64> = Vec::with_capacity(cap);
    let mut children: Vec<Option<(usize, usize)>> = Vec::with_capacity(cap);
    for &s in &used {
        node_freq.push(freq[s]);
        children.push(None);
    }

    let mut heap: BinaryHeap<(Reverse<u64>, Reverse<usize>)> = (0..used.len())
        .map(|id| (Reverse(node_freq[id]), Reverse(id)))
        .collect();

    while heap.len() > 1 {
        let (Reverse(f1), Reverse(id1)) = heap.pop().unwrap();
        let (Reverse(f2), Reverse(id2)) = heap.pop().unwrap();
        let id = node_freq.len();
        node_freq.push(f1 + f2);
        children.push(Some((id1, id2)));
        heap.push((Reverse(f1 + f2), Reverse(id)));
    }

    let root = heap.pop().unwrap().1 .0;
    let mut stack = vec![(root, 0u8)];
    while let Some((node, depth)) = stack.pop() {
        match children[node] {
            Some((l, r)) => {
                stack.push((l, depth + 1));
                stack.push((r, depth + 1));
            }
            None => lens[used[node]] = depth.max(1),
        }
    }
    lens
}

/// Canonical code assignment: symbols sorted by (length, ordinal).
pub fn canonical_codes(lens: &[u8]) -> Vec<u16> {
    let mut order: Vec<usize> = (0..lens.len()).filter(|&s| lens[s] > 0).collect();
    order.sort_by_key(|&s| (lens[s], s));

    let mut codes = vec![0u16; lens.len()];
    let mut code: u32 = 0;
    let mut prev_len = 0u8;
    for s in order {
        if prev_len > 0 {
            code = (code + 1) << (lens[s] - prev_len);
        }
        codes[s] = code as u16;
        prev_len = lens[s];
    }
    codes
}

/// Encoder-side code table.
pub struct HuffmanCodes {
    lens: Vec<u8>,
    codes: Vec<u16>,
}

impl HuffmanCodes {
    pub fn from_hist(hist: &[u32]) -> Self {
        let lens = build_lengths(hist, MAX_CODE_LEN);
        let codes = canonical_codes(&lens);
        HuffmanCodes { lens, codes }
    }

    #[inline]
    pub fn len(&self, sym: usize) -> u8 {
        self.lens[sym]
    }

    #[inline]
    pub fn lens(&self) -> &[u8] {
        &self.lens
    }

    #[inline]
    pub fn write(&self, sym: usize, w: &mut BitWriter) {
        debug_assert!(self.lens[sym] > 0, "symbol {} has no code", sym);
        w.write_bits(self.codes[sym] as u32, self.lens[sym] as u32);
    }

    pub fn write_table(&self, w: &mut BitWriter) {
        write_table(&self.lens, w);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LenToken {
    Literal(u8),
    RepPrev { count: u8 },  // 16: 3..=6
    RepZero { count: u8 },  // 17: 3..=10
    RepZeroLong { count: u8 }, // 18: 11..=138
}

fn tokenize(lens: &[u8]) -> Vec<LenToken> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lens.len() {
        let v = lens[i];
        let mut run = 1;
        while i + run < lens.len() && lens[i + run] == v {
            run += 1;
        }
        if v == 0 {
            let mut left = run;
            while left > 0 {
                if left < 3 {
                    for _ in 0..left {
                        out.push(LenToken::Literal(0));
                    }
                    left = 0;
                } else if left <= 10 {
                    out.push(LenToken::RepZero { count: left as u8 });
                    left = 0;
                } else {
                    let take = left.min(138);
                    out.push(LenToken::RepZeroLong { count: take as u8 });
                    left -= take;
                }
            }
        } else {
            out.push(LenToken::Literal(v));
            let mut left = run - 1;
            while left >= 3 {
                let take = left.min(6);
                out.push(LenToken::RepPrev { count: take as u8 });
                left -= take;
            }
            for _ in 0..left {
                out.push(LenToken::Literal(v));
            }
        }
        i += run;
    }
    out
}

fn token_sym(t: LenToken) -> usize {
    match t {
        LenToken::Literal(v) => v as usize,
        LenToken::RepPrev { .. } => 16,
        LenToken::RepZero { .. } => 17,
        LenToken::RepZeroLong { .. } => 18,
    }
}

/// Serialize a code-length vector. A leading bit distinguishes an unused
/// (all-zero) table, which costs exactly one bit.
pub fn write_table(lens: &[u8], w: &mut BitWriter) {
    if lens.iter().all(|&l| l == 0) {
        w.write_bit(false);
        return;
    }
    w.write_bit(true);

    let tokens = tokenize(lens);
    let mut meta_hist = [0u32; META_SYMS];
    for &t in &tokens {
        meta_hist[token_sym(t)] += 1;
    }

    let meta_lens = build_lengths(&meta_hist, META_MAX_CODE_LEN);
    let meta_codes = canonical_codes(&meta_lens);

    let mut present = META_SYMS;
    while present > 0 && meta_lens[META_ORDER[present - 1]] == 0 {
        present -= 1;
    }
    w.write_bits(present as u32, 5);
    for &sym in META_ORDER.iter().take(present) {
        w.write_bits(meta_lens[sym] as u32, 3);
    }

    for &t in &tokens {
        let sym = token_sym(t);
        w.write_bits(meta_codes[sym] as u32, meta_lens[sym] as u32);
        match t {
            LenToken::Literal(_) => {}
            LenToken::RepPrev { count } => w.write_bits(count as u32 - 3, 2),
            LenToken::RepZero { count } => w.write_bits(count as u32 - 3, 3),
            LenToken::RepZeroLong { count } => w.write_bits(count as u32 - 11, 7),
        }
    }
}

/// Inverse of `write_table` for an alphabet of `n_syms` lengths.
pub fn read_table(n_syms: usize, r: &mut BitReader) -> Result<Vec<u8>> {
    if r.read_bit()? == 0 {
        return Ok(vec![0; n_syms]);
    }

    let present = r.read_bits(5)? as usize;
    if present == 0 || present > META_SYMS {
        return corrupt("bad meta code length count");
    }
    let mut meta_lens = [0u8; META_SYMS];
    for &sym in META_ORDER.iter().take(present) {
        meta_lens[sym] = r.read_bits(3)? as u8;
    }
    let meta = HuffmanDecoder::from_lens(&meta_lens)?;

    let mut lens = vec![0u8; n_syms];
    let mut i = 0;
    while i < n_syms {
        let sym = meta.next(r)? as usize;
        match sym {
            0..=15 => {
                lens[i] = sym as u8;
                i += 1;
            }
            16 => {
                if i == 0 {
                    return corrupt("repeat with no previous code length");
                }
                let count = 3 + r.read_bits(2)? as usize;
                if i + count > n_syms {
                    return corrupt("code length repeat overruns alphabet");
                }
                let prev = lens[i - 1];
                lens[i..i + count].fill(prev);
                i += count;
            }
            17 | 18 => {
                let count = if sym == 17 {
                    3 + r.read_bits(3)? as usize
                } else {
                    11 + r.read_bits(7)? as usize
                };
                if i + count > n_syms {
                    return corrupt("zero run overruns alphabet");
                }
                i += count;
            }
            _ => return corrupt("bad meta symbol"),
        }
    }
    Ok(lens)
}

/// Decoder-side table: 7-bit first-level lookup backed by canonical
/// per-length resolution for the long tail.
pub struct HuffmanDecoder {
    lut: Vec<(u16, u8)>,
    count: [u16; MAX_CODE_LEN as usize + 1],
    first_code: [u32; MAX_CODE_LEN as usize + 2],
    base_index: [u16; MAX_CODE_LEN as usize + 1],
    sorted: Vec<u16>,
    max_len: u8,
}

impl HuffmanDecoder {
    pub fn from_lens(lens: &[u8]) -> Result<Self> {
        let mut count = [0u16; MAX_CODE_LEN as usize + 1];
        for &l in lens {
            if l as u32 > MAX_CODE_LEN {
                return corrupt("code length exceeds limit");
            }
            if l > 0 {
                count[l as usize] += 1;
            }
        }

        // Reject over-subscribed length sets; under-full sets surface as
        // invalid prefixes during decode.
        let mut kraft: u64 = 0;
        for l in 1..=MAX_CODE_LEN as usize {
            kraft += (count[l] as u64) << (MAX_CODE_LEN as usize - l);
        }
        if kraft > 1u64 << MAX_CODE_LEN {
            return corrupt("over-subscribed code lengths");
        }

        let mut sorted: Vec<u16> = (0..lens.len() as u16).filter(|&s| lens[s as usize] > 0).collect();
        sorted.sort_by_key(|&s| (lens[s as usize], s));

        let mut first_code = [0u32; MAX_CODE_LEN as usize + 2];
        let mut base_index = [0u16; MAX_CODE_LEN as usize + 1];
        let mut code: u32 = 0;
        let mut index: u16 = 0;
        for l in 1..=MAX_CODE_LEN as usize {
            first_code[l] = code;
            base_index[l] = index;
            code = (code + count[l] as u32) << 1;
            index += count[l];
        }

        let codes = canonical_codes(lens);
        let mut lut = vec![(0u16, 0u8); 1 << HUFF_LUT_BITS];
        for &s in &sorted {
            let l = lens[s as usize] as u32;
            if l > HUFF_LUT_BITS {
                continue;
            }
            let lo = (codes[s as usize] as u32) << (HUFF_LUT_BITS - l);
            let hi = lo + (1 << (HUFF_LUT_BITS - l));
            for entry in lut[lo as usize..hi as usize].iter_mut() {
                *entry = (s, l as u8);
            }
        }

        let max_len = lens.iter().copied().max().unwrap_or(0);
        Ok(HuffmanDecoder {
            lut,
            count,
            first_code,
            base_index,
            sorted,
            max_len,
        })
    }

    pub fn next(&self, r: &mut BitReader) -> Result<u16> {
        if self.max_len == 0 {
            return corrupt("read from empty code table");
        }

        let (sym, len) = self.lut[r.peek7() as usize];
        if len > 0 {
            r.consume(len as u32)?;
            return Ok(sym);
        }

        let mut code: u32 = 0;
        for l in 1..=self.max_len as usize {
            code = (code << 1) | r.read_bit()?;
            let n = self.count[l] as u32;
            if n > 0 && code >= self.first_code[l] && code - self.first_code[l] < n {
                let idx = self.base_index[l] as u32 + (code - self.first_code[l]);
                return Ok(self.sorted[idx as usize]);
            }
        }
        Err(GcifError::Corrupt("invalid prefix code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_next(x: &mut u64) -> u64 {
        *x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        *x
    }

    fn roundtrip(hist: &[u32], stream: &[u16]) {
        let enc = HuffmanCodes::from_hist(hist);
        let mut w = BitWriter::new();
        enc.write_table(&mut w);
        for &s in stream {
            enc.write(s as usize, &mut w);
        }
        let (_, bytes) = w.finalize();

        let mut r = BitReader::new(&bytes);
        let lens = read_table(hist.len(), &mut r).unwrap();
        assert_eq!(lens, enc.lens);
        let dec = HuffmanDecoder::from_lens(&lens).unwrap();
        for &s in stream {
            assert_eq!(dec.next(&mut r).unwrap(), s);
        }
    }

    #[test]
    fn skewed_histogram_roundtrip() {
        let mut hist = vec![0u32; 300];
        hist[0] = 10_000;
        hist[1] = 500;
        hist[42] = 100;
        hist[299] = 1;
        let stream = [0u16, 0, 1, 42, 0, 299, 1, 0];
        roundtrip(&hist, &stream);
    }

    #[test]
    fn random_histogram_roundtrip() {
        let mut seed = 0x1234_5678_9abc_def0u64;
        let mut hist = vec![0u32; 128];
        for h in hist.iter_mut() {
            *h = (lcg_next(&mut seed) >> 56) as u32;
        }
        hist[7] = hist[7].max(1);
        let stream: Vec<u16> = (0..400)
            .map(|_| {
                loop {
                    let s = (lcg_next(&mut seed) % 128) as u16;
                    if hist[s as usize] > 0 {
                        return s;
                    }
                }
            })
            .collect();
        roundtrip(&hist, &stream);
    }

    #[test]
    fn single_symbol_gets_one_bit() {
        let mut hist = vec![0u32; 40];
        hist[13] = 77;
        let enc = HuffmanCodes::from_hist(&hist);
        assert_eq!(enc.len(13), 1);
        roundtrip(&hist, &[13u16; 20]);
    }

    #[test]
    fn empty_table_costs_one_bit() {
        let hist = vec![0u32; 64];
        let enc = HuffmanCodes::from_hist(&hist);
        let mut w = BitWriter::new();
        enc.write_table(&mut w);
        let (bits, bytes) = w.finalize();
        assert_eq!(bits, 1);
        let mut r = BitReader::new(&bytes);
        let lens = read_table(64, &mut r).unwrap();
        assert!(lens.iter().all(|&l| l == 0));
        let dec = HuffmanDecoder::from_lens(&lens).unwrap();
        assert!(dec.next(&mut r).is_err());
    }

    #[test]
    fn lengths_respect_limit_under_pathological_skew() {
        // Fibonacci-ish frequencies force deep unbounded trees.
        let mut hist = vec![0u32; 24];
        let (mut a, mut b) = (1u32, 1u32);
        for h in hist.iter_mut() {
            *h = a;
            let c = a.saturating_add(b);
            a = b;
            b = c;
        }
        let lens = build_lengths(&hist, MAX_CODE_LEN);
        assert!(lens.iter().all(|&l| (l as u32) <= MAX_CODE_LEN));
        let dec_syms = lens.iter().filter(|&&l| l > 0).count();
        assert_eq!(dec_syms, 24);
    }

    #[test]
    fn truncated_table_is_corrupt() {
        let mut hist = vec![0u32; 300];
        for (i, h) in hist.iter_mut().enumerate() {
            *h = (i % 17 + 1) as u32;
        }
        let enc = HuffmanCodes::from_hist(&hist);
        let mut w = BitWriter::new();
        enc.write_table(&mut w);
        let (_, bytes) = w.finalize();
        let cut = &bytes[..bytes.len() / 2];
        let mut r = BitReader::new(cut);
        assert!(read_table(300, &mut r).is_err());
    }

    #[test]
    fn oversubscribed_lengths_rejected() {
        // Three codes of length 1 cannot coexist.
        assert!(HuffmanDecoder::from_lens(&[1, 1, 1]).is_err());
    }
}
