// crates/gcif-core/src/stats.rs
//
// Encoder statistics side-channel. Filled from bit positions during the
// write pass; never consulted by the bitstream path.

#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeStats {
    pub tile_bits: u8,
    pub chaos_levels: u8,
    pub sf_filters: u8,
    pub cf_filters: u8,
    pub lz_matches: u32,
    pub lz_covered_pixels: u64,

    pub mask_bits: u64,
    pub sf_table_bits: u64,
    pub cf_table_bits: u64,
    pub alpha_table_bits: u64,
    pub chaos_table_bits: u64,
    pub pixel_bits: u64,
    pub total_bits: u64,
}
