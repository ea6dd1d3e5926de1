use anyhow::Context;
use clap::Args;
use gcif_core::EncoderKnobs;

use crate::io::container;

#[derive(Args)]
pub struct EncodeArgs {
    /// Input PNG path
    pub input: String,

    /// Output .gci path
    pub output: String,

    /// Tile size exponent (2 = 4x4 tiles)
    #[arg(long, default_value_t = 2)]
    pub tile_bits: u8,

    /// Cap on chaos context levels tried for the RGB channels
    #[arg(long, default_value_t = 8)]
    pub max_chaos: u8,

    /// Disable the LZ pixel-copy layer
    #[arg(long)]
    pub no_lz: bool,

    /// Tile revisit budget for the filter design passes
    #[arg(long, default_value_t = 4096)]
    pub revisit: u32,
}

pub fn run(args: EncodeArgs) -> anyhow::Result<()> {
    let img = image::open(&args.input)
        .with_context(|| format!("open {}", args.input))?
        .to_rgba8();
    let (xsize, ysize) = img.dimensions();
    let rgba = img.into_raw();

    let knobs = EncoderKnobs {
        tile_bits: args.tile_bits,
        max_chaos_levels: args.max_chaos,
        lz_enabled: !args.no_lz,
        revisit_count: args.revisit,
        ..EncoderKnobs::default()
    };

    let encoded = gcif_core::encode(&rgba, xsize, ysize, &knobs)?;
    container::write_gci(&args.output, xsize, ysize, encoded.bit_count, &encoded.bytes)?;

    let s = encoded.stats;
    let raw = rgba.len();
    let out_bytes = encoded.bytes.len();
    eprintln!(
        "encode ok: in={} out={} size={}x{} raw_bytes={} gci_bytes={} ratio={:.2} \
         tile_bits={} chaos_levels={} sf={} cf={} lz_matches={} lz_pixels={}",
        args.input,
        args.output,
        xsize,
        ysize,
        raw,
        out_bytes,
        raw as f64 / out_bytes.max(1) as f64,
        s.tile_bits,
        s.chaos_levels,
        s.sf_filters,
        s.cf_filters,
        s.lz_matches,
        s.lz_covered_pixels,
    );

    Ok(())
}
