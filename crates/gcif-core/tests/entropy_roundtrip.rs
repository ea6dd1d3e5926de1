// crates/gcif-core/tests/entropy_roundtrip.rs
//
// Cross-context behavior: several coders share one bitstream, interleaved
// the way the pixel loop interleaves channels, and zero runs must land at
// stable positions despite the interleave.

use gcif_core::bits::{BitReader, BitWriter};
use gcif_core::entropy::coder::{EntropyDecoder, EntropyEncoder};

fn lcg_next(x: &mut u64) -> u64 {
    *x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
    *x
}

#[test]
fn interleaved_contexts_with_runs() {
    // Context 0 carries long zero runs; context 1 carries literals. The
    // streams interleave per "pixel" like Y/U/V do.
    let mut seed = 0xc0ff_ee00_dead_10ccu64;
    let n = 3000usize;
    let s0: Vec<u16> = (0..n)
        .map(|i| if i % 97 == 0 { (i % 200) as u16 + 1 } else { 0 })
        .collect();
    let s1: Vec<u16> = (0..n).map(|_| (lcg_next(&mut seed) % 256) as u16).collect();

    let mut e0 = EntropyEncoder::new(256);
    let mut e1 = EntropyEncoder::new(256);
    for i in 0..n {
        e0.add(s0[i]);
        e1.add(s1[i]);
    }
    e0.finalize();
    e1.finalize();

    let mut w = BitWriter::new();
    e0.write_table(&mut w);
    e1.write_table(&mut w);
    e0.begin_write();
    e1.begin_write();
    for i in 0..n {
        e0.write(s0[i], &mut w);
        e1.write(s1[i], &mut w);
    }
    let (_, bytes) = w.finalize();

    let mut r = BitReader::new(&bytes);
    let mut d0 = EntropyDecoder::read_table(256, &mut r).unwrap();
    let mut d1 = EntropyDecoder::read_table(256, &mut r).unwrap();
    for i in 0..n {
        assert_eq!(d0.next(&mut r).unwrap(), s0[i], "ctx0 at {}", i);
        assert_eq!(d1.next(&mut r).unwrap(), s1[i], "ctx1 at {}", i);
    }
}

#[test]
fn run_spanning_whole_stream() {
    let n = 100_000usize;
    let mut enc = EntropyEncoder::new(256);
    for _ in 0..n {
        enc.add(0);
    }
    enc.finalize();

    let mut w = BitWriter::new();
    enc.write_table(&mut w);
    enc.begin_write();
    for _ in 0..n {
        enc.write(0, &mut w);
    }
    let (bits, bytes) = w.finalize();
    // One run symbol plus a logarithmic tail.
    assert!(bits < 128, "a single run should stay tiny, got {} bits", bits);

    let mut r = BitReader::new(&bytes);
    let mut dec = EntropyDecoder::read_table(256, &mut r).unwrap();
    for i in 0..n {
        assert_eq!(dec.next(&mut r).unwrap(), 0, "at {}", i);
    }
}
