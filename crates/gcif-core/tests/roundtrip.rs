// crates/gcif-core/tests/roundtrip.rs

use gcif_core::{decode, encode, EncoderKnobs};

fn lcg_next(x: &mut u64) -> u64 {
    *x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
    *x
}

fn roundtrip(rgba: &[u8], xsize: u32, ysize: u32, knobs: &EncoderKnobs) -> gcif_core::Encoded {
    let encoded = encode(rgba, xsize, ysize, knobs).expect("encode ok");
    let back = decode(&encoded.bytes, xsize, ysize).expect("decode ok");
    assert_eq!(back, rgba, "round-trip mismatch at {}x{}", xsize, ysize);
    encoded
}

fn solid(xsize: u32, ysize: u32, px: [u8; 4]) -> Vec<u8> {
    (0..xsize * ysize).flat_map(|_| px).collect()
}

#[test]
fn single_pixel() {
    roundtrip(&[17, 34, 51, 68], 1, 1, &EncoderKnobs::default());
}

#[test]
fn uniform_black_4x4_is_tiny() {
    let rgba = solid(4, 4, [0, 0, 0, 255]);
    let encoded = roundtrip(&rgba, 4, 4, &EncoderKnobs::default());
    // Whole image rides the dominant-color mask; payload is headers only.
    assert!(
        encoded.bytes.len() < 100,
        "uniform image should compress to almost nothing, got {} bytes",
        encoded.bytes.len()
    );
}

#[test]
fn uniform_color_picks_one_chaos_level() {
    let rgba = solid(16, 16, [40, 90, 200, 255]);
    let encoded = roundtrip(&rgba, 16, 16, &EncoderKnobs::default());
    assert_eq!(encoded.stats.chaos_levels, 1);
}

#[test]
fn alternating_rows_8x8() {
    let red = [255, 0, 0, 255];
    let green = [0, 255, 0, 255];
    let mut rgba = Vec::new();
    for y in 0..8 {
        for _ in 0..8 {
            rgba.extend_from_slice(if y % 2 == 0 { &red } else { &green });
        }
    }
    roundtrip(&rgba, 8, 8, &EncoderKnobs::default());
}

#[test]
fn horizontal_ramp_compresses() {
    // R = G = B = x: constant residual 1 after the first pixel.
    let rgba: Vec<u8> = (0..64u8).flat_map(|x| [x, x, x, 255]).collect();
    let encoded = roundtrip(&rgba, 64, 1, &EncoderKnobs::default());
    assert!(
        encoded.bytes.len() < rgba.len() / 2,
        "ramp should beat raw: {} vs {}",
        encoded.bytes.len(),
        rgba.len()
    );
}

#[test]
fn random_32x32() {
    let mut seed = 0x0123_4567_89ab_cdefu64;
    let rgba: Vec<u8> = (0..32 * 32 * 4).map(|_| (lcg_next(&mut seed) >> 56) as u8).collect();
    roundtrip(&rgba, 32, 32, &EncoderKnobs::default());
}

#[test]
fn repeated_row_uses_lz() {
    // 256x2 with the second row equal to the first: one long pixel copy.
    let row: Vec<u8> = (0..256u32)
        .flat_map(|x| [x as u8, (x >> 1) as u8, (x * 7) as u8, 255])
        .collect();
    let mut rgba = row.clone();
    rgba.extend_from_slice(&row);
    let encoded = roundtrip(&rgba, 256, 2, &EncoderKnobs::default());
    assert!(encoded.stats.lz_matches >= 1, "expected a pixel copy match");
    assert!(encoded.stats.lz_covered_pixels >= 256);
}

#[test]
fn masked_region_decodes_to_dominant() {
    // Top two rows fully transparent; the rest a gradient.
    let clear = [0u8, 0, 0, 0];
    let mut rgba = Vec::new();
    for y in 0..16u32 {
        for x in 0..16u32 {
            if y < 2 {
                rgba.extend_from_slice(&clear);
            } else {
                rgba.extend_from_slice(&[x as u8 * 10, y as u8 * 10, 77, 255]);
            }
        }
    }
    let encoded = encode(&rgba, 16, 16, &EncoderKnobs::default()).expect("encode ok");
    let back = decode(&encoded.bytes, 16, 16).expect("decode ok");
    assert_eq!(back, rgba);
    for i in 0..32 {
        assert_eq!(&back[i * 4..i * 4 + 4], &clear, "masked pixel {}", i);
    }
}

#[test]
fn all_transparent_image() {
    let rgba = solid(12, 9, [0, 0, 0, 0]);
    let encoded = roundtrip(&rgba, 12, 9, &EncoderKnobs::default());
    assert!(encoded.bytes.len() < 120);
}

#[test]
fn non_tile_multiple_dimensions() {
    let mut seed = 0xfeed_f00d_dead_beefu64;
    for (w, h) in [(13u32, 7u32), (5, 17), (33, 3), (1, 40)] {
        let rgba: Vec<u8> = (0..w * h)
            .flat_map(|i| {
                let r = lcg_next(&mut seed);
                // Smooth-ish data with occasional jumps.
                [(i % 251) as u8, (i / 3 % 251) as u8, (r >> 60) as u8, 255]
            })
            .collect();
        roundtrip(&rgba, w, h, &EncoderKnobs::default());
    }
}

#[test]
fn bimodal_image_uses_multiple_chaos_levels() {
    // Top half flat, bottom half noisy: contexts should split.
    let mut seed = 0xaaaa_bbbb_cccc_ddddu64;
    let mut rgba = Vec::new();
    for y in 0..64u32 {
        for x in 0..64u32 {
            if y < 32 {
                // Two alternating flats, each under the mask threshold.
                let v = if x % 2 == 0 { 100 } else { 110 };
                rgba.extend_from_slice(&[v, v, v, 255]);
            } else {
                let r = lcg_next(&mut seed);
                rgba.extend_from_slice(&[(r >> 40) as u8, (r >> 48) as u8, (r >> 56) as u8, 255]);
            }
        }
    }
    // LZ off so the flat half feeds the context model instead of matches.
    let knobs = EncoderKnobs {
        lz_enabled: false,
        ..EncoderKnobs::default()
    };
    let encoded = roundtrip(&rgba, 64, 64, &knobs);
    assert!(
        encoded.stats.chaos_levels > 1,
        "bimodal input should pick more than one chaos bin, got {}",
        encoded.stats.chaos_levels
    );
}

#[test]
fn lz_disabled_still_roundtrips() {
    let row: Vec<u8> = (0..64u32).flat_map(|x| [x as u8, x as u8, 0, 255]).collect();
    let mut rgba = row.clone();
    for _ in 0..7 {
        rgba.extend_from_slice(&row);
    }
    let knobs = EncoderKnobs {
        lz_enabled: false,
        ..EncoderKnobs::default()
    };
    let encoded = roundtrip(&rgba, 64, 8, &knobs);
    assert_eq!(encoded.stats.lz_matches, 0);
}

#[test]
fn pixel_idempotence() {
    // decode(encode(decode(B))) equals decode(B); bits may differ.
    let mut seed = 0x1111_2222_3333_4444u64;
    let rgba: Vec<u8> = (0..24 * 24)
        .flat_map(|i| {
            let r = lcg_next(&mut seed);
            [(i % 17 * 15) as u8, (r >> 58) as u8, 128, 255]
        })
        .collect();
    let first = encode(&rgba, 24, 24, &EncoderKnobs::default()).expect("encode");
    let pixels = decode(&first.bytes, 24, 24).expect("decode");
    let second = encode(&pixels, 24, 24, &EncoderKnobs::default()).expect("re-encode");
    assert_eq!(decode(&second.bytes, 24, 24).expect("re-decode"), pixels);
}

#[test]
fn truncated_payload_is_an_error() {
    let rgba: Vec<u8> = (0..16 * 16)
        .flat_map(|i| [(i * 3) as u8, (i * 5) as u8, (i * 7) as u8, 255])
        .collect();
    let encoded = encode(&rgba, 16, 16, &EncoderKnobs::default()).expect("encode ok");
    for keep in [1usize, encoded.bytes.len() / 4, encoded.bytes.len() / 2] {
        let cut = &encoded.bytes[..keep.min(encoded.bytes.len().saturating_sub(1))];
        assert!(
            decode(cut, 16, 16).is_err(),
            "truncation to {} bytes must fail",
            keep
        );
    }
}

#[test]
fn invalid_parameters_rejected() {
    let px = [1u8, 2, 3, 4];
    assert!(encode(&px, 0, 1, &EncoderKnobs::default()).is_err());
    assert!(encode(&px, 1, 2, &EncoderKnobs::default()).is_err());

    let bad = EncoderKnobs {
        tile_bits: 9,
        ..EncoderKnobs::default()
    };
    assert!(encode(&px, 1, 1, &bad).is_err());
}

#[test]
fn sprite_like_image_beats_raw() {
    // Flat regions, sharp edges, one transparent corner: the target domain.
    let mut rgba = Vec::new();
    for y in 0..48u32 {
        for x in 0..48u32 {
            let px = if x < 12 && y < 12 {
                [0, 0, 0, 0]
            } else if (x / 8 + y / 8) % 2 == 0 {
                [200, 40, 40, 255]
            } else {
                [40, 40, 200, 255]
            };
            rgba.extend_from_slice(&px);
        }
    }
    let encoded = roundtrip(&rgba, 48, 48, &EncoderKnobs::default());
    assert!(
        encoded.bytes.len() * 4 < rgba.len(),
        "sprite should compress at least 4:1, got {} vs {}",
        encoded.bytes.len(),
        rgba.len()
    );
}
