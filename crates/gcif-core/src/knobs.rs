// crates/gcif-core/src/knobs.rs

use crate::error::{GcifError, Result};
use crate::filters::chaos::{MAX_CHAOS_LEVELS, MONO_MAX_CHAOS_LEVELS};

/// Encoder tuning. None of these are needed to decode: wire field widths
/// are fixed, so the decoder only reads what the header declares.
#[derive(Clone, Debug)]
pub struct EncoderKnobs {
    /// RGBA tile size exponent (2 = 4x4 tiles).
    pub tile_bits: u8,
    /// Monochrome sub-compressor tile size sweep range.
    pub mono_min_bits: u8,
    pub mono_max_bits: u8,
    /// Chaos level sweep caps.
    pub max_chaos_levels: u8,
    pub mono_max_chaos_levels: u8,
    /// Tile-coverage fraction a uniform value needs to become a palette
    /// filter.
    pub sympal_thresh: f32,
    /// Cumulative coverage fraction at which filter selection stops.
    pub filter_thresh: f32,
    /// Tile revisit budget across the later design passes.
    pub revisit_count: u32,
    pub lz_enabled: bool,
}

impl Default for EncoderKnobs {
    fn default() -> Self {
        EncoderKnobs {
            tile_bits: 2,
            mono_min_bits: 2,
            mono_max_bits: 4,
            max_chaos_levels: 8,
            mono_max_chaos_levels: 8,
            sympal_thresh: 0.1,
            filter_thresh: 0.6,
            revisit_count: 4096,
            lz_enabled: true,
        }
    }
}

impl EncoderKnobs {
    pub fn validate(&self) -> Result<()> {
        if self.tile_bits == 0 || self.tile_bits > 4 {
            return Err(GcifError::InvalidParam(format!(
                "tile_bits must be in 1..=4, got {}",
                self.tile_bits
            )));
        }
        if self.mono_min_bits == 0 || self.mono_max_bits > 8 || self.mono_min_bits > self.mono_max_bits
        {
            return Err(GcifError::InvalidParam(format!(
                "mono tile bits range {}..={} out of bounds",
                self.mono_min_bits, self.mono_max_bits
            )));
        }
        if self.max_chaos_levels == 0 || self.max_chaos_levels as usize > MAX_CHAOS_LEVELS {
            return Err(GcifError::InvalidParam(format!(
                "max_chaos_levels must be in 1..=32, got {}",
                self.max_chaos_levels
            )));
        }
        if self.mono_max_chaos_levels == 0
            || self.mono_max_chaos_levels as usize > MONO_MAX_CHAOS_LEVELS
        {
            return Err(GcifError::InvalidParam(format!(
                "mono_max_chaos_levels must be in 1..=16, got {}",
                self.mono_max_chaos_levels
            )));
        }
        if !(0.0..=1.0).contains(&self.sympal_thresh) || !(0.0..=1.0).contains(&self.filter_thresh)
        {
            return Err(GcifError::InvalidParam(
                "coverage thresholds must be fractions in 0..=1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EncoderKnobs::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_rejected() {
        let mut k = EncoderKnobs::default();
        k.tile_bits = 9;
        assert!(k.validate().is_err());

        let mut k = EncoderKnobs::default();
        k.mono_min_bits = 5;
        k.mono_max_bits = 3;
        assert!(k.validate().is_err());

        let mut k = EncoderKnobs::default();
        k.max_chaos_levels = 40;
        assert!(k.validate().is_err());

        let mut k = EncoderKnobs::default();
        k.filter_thresh = 1.5;
        assert!(k.validate().is_err());
    }
}
