use anyhow::Context;
use clap::Args;

use crate::io::container;

#[derive(Args)]
pub struct DecodeArgs {
    /// Input .gci path
    pub input: String,

    /// Output PNG path
    pub output: String,
}

pub fn run(args: DecodeArgs) -> anyhow::Result<()> {
    let (header, payload) = container::read_gci(&args.input)?;

    let rgba = gcif_core::decode(&payload, header.xsize, header.ysize)
        .with_context(|| format!("decode {}", args.input))?;

    let img = image::RgbaImage::from_raw(header.xsize, header.ysize, rgba)
        .context("decoded plane does not match declared dimensions")?;
    img.save(&args.output)
        .with_context(|| format!("write {}", args.output))?;

    eprintln!(
        "decode ok: in={} out={} size={}x{} payload_bits={}",
        args.input, args.output, header.xsize, header.ysize, header.bit_count
    );

    Ok(())
}
