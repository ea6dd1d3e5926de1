// crates/gcif-core/tests/mono_roundtrip.rs

use gcif_core::mask::BitGrid;
use gcif_core::mono::{compress, decompress, MonoParams};

fn lcg_next(x: &mut u64) -> u64 {
    *x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
    *x
}

fn roundtrip(data: &[u8], params: MonoParams) -> Vec<u8> {
    let mask = params.mask.clone();
    let (xsize, ysize, num_syms) = (params.xsize, params.ysize, params.num_syms);
    let bytes = compress(data, params).expect("compress ok");
    let back = decompress(&bytes, xsize, ysize, num_syms, mask.as_ref()).expect("decompress ok");
    for y in 0..ysize {
        for x in 0..xsize {
            if mask.as_ref().map_or(false, |m| m.get(x, y)) {
                continue;
            }
            let i = (y * xsize + x) as usize;
            assert_eq!(back[i], data[i], "element {},{}", x, y);
        }
    }
    bytes
}

#[test]
fn uniform_grid_takes_palette_path() {
    let data = vec![9u8; 32 * 32];
    let bytes = roundtrip(&data, MonoParams::new(32, 32, 256));
    // One palette filter covers everything; per-element bits vanish.
    assert!(
        bytes.len() < 64,
        "uniform grid should be near-free, got {} bytes",
        bytes.len()
    );
}

#[test]
fn gradient_grid() {
    let mut data = Vec::new();
    for y in 0..24u32 {
        for x in 0..24u32 {
            data.push((x * 3 + y) as u8);
        }
    }
    roundtrip(&data, MonoParams::new(24, 24, 256));
}

#[test]
fn small_alphabet() {
    let mut seed = 0x5555_7777_9999_bbbbu64;
    let data: Vec<u8> = (0..19 * 11).map(|_| (lcg_next(&mut seed) % 5) as u8).collect();
    roundtrip(&data, MonoParams::new(19, 11, 5));
}

#[test]
fn single_element_grid() {
    roundtrip(&[3u8], MonoParams::new(1, 1, 256));
}

#[test]
fn one_symbol_alphabet() {
    let data = vec![0u8; 8 * 8];
    roundtrip(&data, MonoParams::new(8, 8, 1));
}

#[test]
fn masked_elements_are_skipped() {
    let mut seed = 0x1212_3434_5656_7878u64;
    let (w, h) = (20u32, 20u32);
    let mut mask = BitGrid::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if (x + y) % 3 == 0 {
                mask.set(x, y);
            }
        }
    }
    let data: Vec<u8> = (0..w * h).map(|_| (lcg_next(&mut seed) % 64) as u8).collect();
    let mut params = MonoParams::new(w, h, 64);
    params.mask = Some(mask);
    roundtrip(&data, params);
}

#[test]
fn fully_masked_grid_is_header_only() {
    let (w, h) = (16u32, 16u32);
    let mut mask = BitGrid::new(w, h);
    for y in 0..h {
        for x in 0..w {
            mask.set(x, y);
        }
    }
    let mut params = MonoParams::new(w, h, 256);
    params.mask = Some(mask);
    let bytes = roundtrip(&vec![0u8; (w * h) as usize], params);
    assert!(bytes.len() < 32, "got {} bytes", bytes.len());
}

#[test]
fn grid_large_enough_to_recurse() {
    // 128x128 at 2-bit tiles is a 32x32 = 1024-tile map, past the
    // recursion threshold. Smooth data keeps the run fast.
    let mut data = Vec::new();
    for y in 0..128u32 {
        for x in 0..128u32 {
            data.push(((x / 7 + y / 9) % 13) as u8);
        }
    }
    let mut params = MonoParams::new(128, 128, 256);
    params.min_bits = 2;
    params.max_bits = 2;
    roundtrip(&data, params);
}

#[test]
fn truncated_stream_is_error() {
    let mut seed = 0x9090_8080_7070_6060u64;
    let data: Vec<u8> = (0..32 * 32).map(|_| (lcg_next(&mut seed) >> 56) as u8).collect();
    let bytes = compress(&data, MonoParams::new(32, 32, 256)).expect("compress ok");
    let cut = &bytes[..bytes.len() / 3];
    assert!(decompress(cut, 32, 32, 256, None).is_err());
}

#[test]
fn invalid_params_rejected() {
    assert!(compress(&[], MonoParams::new(0, 4, 256)).is_err());
    assert!(compress(&[0; 16], MonoParams::new(4, 4, 0)).is_err());
    assert!(compress(&[0; 16], MonoParams::new(4, 4, 300)).is_err());
    let mut p = MonoParams::new(4, 4, 256);
    p.min_bits = 6;
    p.max_bits = 3;
    assert!(compress(&[0; 16], p).is_err());
}
