// crates/gcif-core/src/entropy/coder.rs
//
// Per-context entropy coder: canonical Huffman over `num_lit` literal
// symbols plus a 128-symbol zero-run sub-alphabet. A maximal run of r >= 1
// zero residuals is coded at the position of its first zero: r <= 127 uses
// run symbol r-1, longer runs use the last run symbol followed by r-128 as
// a 6-bit significant-bit count and that many value bits, so a run costs
// O(log r) bits regardless of length.
//
// Counting and writing are two passes over the same symbol sequence: the
// counting pass records run lengths in order, the write pass replays them,
// which keeps emitted bits at stable stream positions even though many
// contexts interleave into one stream.

use crate::bits::{sig_bits, BitReader, BitWriter};
use crate::error::{corrupt, Result};
use crate::entropy::huffman::{HuffmanCodes, HuffmanDecoder, read_table};

pub const ZRLE_SYMS: usize = 128;

pub struct EntropyEncoder {
    num_lit: usize,
    hist: Vec<u32>,
    codes: Option<HuffmanCodes>,

    // Counting state
    zero_run: u32,
    runs: Vec<u32>,

    // Write replay state
    next_run: usize,
    pending: u32,
}

impl EntropyEncoder {
    pub fn new(num_lit: usize) -> Self {
        EntropyEncoder {
            num_lit,
            hist: vec![0; num_lit + ZRLE_SYMS],
            codes: None,
            zero_run: 0,
            runs: Vec::new(),
            next_run: 0,
            pending: 0,
        }
    }

    #[inline]
    fn run_sym(&self, run: u32) -> usize {
        if run <= 127 {
            self.num_lit + run as usize - 1
        } else {
            self.num_lit + ZRLE_SYMS - 1
        }
    }

    fn flush_run(&mut self) {
        if self.zero_run > 0 {
            let run = self.zero_run;
            let run_sym = self.run_sym(run);
            self.hist[run_sym] += 1;
            self.runs.push(run);
            self.zero_run = 0;
        }
    }

    /// Counting pass: feed one symbol.
    pub fn add(&mut self, sym: u16) {
        if sym == 0 {
            self.zero_run += 1;
        } else {
            self.flush_run();
            self.hist[sym as usize] += 1;
        }
    }

    /// Close the counting pass and build the code table.
    pub fn finalize(&mut self) {
        self.flush_run();
        self.codes = Some(HuffmanCodes::from_hist(&self.hist));
    }

    pub fn write_table(&self, w: &mut BitWriter) {
        self.codes
            .as_ref()
            .expect("finalize before write_table")
            .write_table(w);
    }

    /// Arm the write pass; the upcoming `write` calls must replay exactly
    /// the symbol sequence the counting pass saw.
    pub fn begin_write(&mut self) {
        self.next_run = 0;
        self.pending = 0;
    }

    pub fn write(&mut self, sym: u16, w: &mut BitWriter) {
        if sym == 0 {
            if self.pending > 0 {
                self.pending -= 1;
                return;
            }
            let run = self.runs[self.next_run];
            self.next_run += 1;
            self.pending = run - 1;
            let run_sym = self.run_sym(run);
            self.codes
                .as_ref()
                .expect("finalize before write")
                .write(run_sym, w);
            if run > 127 {
                let v = run - 128;
                let n = sig_bits(v);
                w.write_bits(n, 6);
                if n > 0 {
                    w.write_bits(v, n);
                }
            }
        } else {
            debug_assert_eq!(self.pending, 0, "nonzero symbol inside a zero run");
            self.codes
                .as_ref()
                .expect("finalize before write")
                .write(sym as usize, w);
        }
    }
}

pub struct EntropyDecoder {
    num_lit: u16,
    dec: HuffmanDecoder,
    pending: u32,
}

impl EntropyDecoder {
    pub fn read_table(num_lit: usize, r: &mut BitReader) -> Result<Self> {
        let lens = read_table(num_lit + ZRLE_SYMS, r)?;
        Ok(EntropyDecoder {
            num_lit: num_lit as u16,
            dec: HuffmanDecoder::from_lens(&lens)?,
            pending: 0,
        })
    }

    /// Decode one symbol; zeros inside an armed run consume no bits.
    pub fn next(&mut self, r: &mut BitReader) -> Result<u16> {
        if self.pending > 0 {
            self.pending -= 1;
            return Ok(0);
        }
        let sym = self.dec.next(r)?;
        if sym < self.num_lit {
            return Ok(sym);
        }
        let k = (sym - self.num_lit) as u32;
        let run = if (k as usize) < ZRLE_SYMS - 1 {
            k + 1
        } else {
            let n = r.read_bits(6)?;
            if n > 32 {
                return corrupt("zero run length class out of range");
            }
            let v = if n > 0 { r.read_bits(n)? } else { 0 };
            match 128u32.checked_add(v) {
                Some(run) => run,
                None => return corrupt("zero run overflow"),
            }
        };
        self.pending = run - 1;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_next(x: &mut u64) -> u64 {
        *x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        *x
    }

    fn roundtrip(num_lit: usize, stream: &[u16]) {
        let mut enc = EntropyEncoder::new(num_lit);
        for &s in stream {
            enc.add(s);
        }
        enc.finalize();

        let mut w = BitWriter::new();
        enc.write_table(&mut w);
        enc.begin_write();
        for &s in stream {
            enc.write(s, &mut w);
        }
        let (_, bytes) = w.finalize();

        let mut r = BitReader::new(&bytes);
        let mut dec = EntropyDecoder::read_table(num_lit, &mut r).unwrap();
        for (i, &s) in stream.iter().enumerate() {
            assert_eq!(dec.next(&mut r).unwrap(), s, "at {}", i);
        }
    }

    #[test]
    fn literals_and_short_runs() {
        roundtrip(256, &[5, 0, 0, 9, 0, 1, 1, 0, 0, 0, 200, 0]);
    }

    #[test]
    fn long_zero_run_past_256() {
        let mut stream = vec![17u16];
        stream.extend(std::iter::repeat(0).take(1000));
        stream.push(42);
        stream.extend(std::iter::repeat(0).take(127));
        stream.push(17);
        roundtrip(256, &stream);
    }

    #[test]
    fn run_boundary_lengths() {
        for run in [1usize, 2, 126, 127, 128, 129, 255, 256, 257] {
            let mut stream = vec![3u16];
            stream.extend(std::iter::repeat(0).take(run));
            stream.push(3);
            roundtrip(16, &stream);
        }
    }

    #[test]
    fn trailing_run_decodes() {
        let mut stream = vec![7u16, 8];
        stream.extend(std::iter::repeat(0).take(500));
        roundtrip(64, &stream);
    }

    #[test]
    fn extended_alphabet_symbols() {
        // Y-style alphabet: escapes live above 255.
        let stream = [260u16, 0, 0, 255, 268, 1];
        roundtrip(269, &stream);
    }

    #[test]
    fn random_mix_roundtrip() {
        let mut seed = 0xdead_beef_0bad_cafeu64;
        let mut stream = Vec::with_capacity(4000);
        for _ in 0..4000 {
            let r = lcg_next(&mut seed);
            if r % 3 != 0 {
                stream.push(0u16);
            } else {
                stream.push((r >> 40) as u16 % 256);
            }
        }
        roundtrip(256, &stream);
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let stream = [9u16, 0, 0, 9, 9, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut enc = EntropyEncoder::new(16);
        for &s in &stream {
            enc.add(s);
        }
        enc.finalize();
        let mut w = BitWriter::new();
        enc.write_table(&mut w);
        enc.begin_write();
        for &s in &stream {
            enc.write(s, &mut w);
        }
        let (bits, bytes) = w.finalize();
        // Chop off the tail past the table.
        let keep = ((bits / 2) / 8) as usize;
        let mut r = BitReader::new(&bytes[..keep.max(1)]);
        match EntropyDecoder::read_table(16, &mut r) {
            Err(_) => {} // table itself truncated
            Ok(mut dec) => {
                let mut failed = false;
                for _ in 0..stream.len() {
                    if dec.next(&mut r).is_err() {
                        failed = true;
                        break;
                    }
                }
                assert!(failed, "truncation must surface as an error");
            }
        }
    }
}
