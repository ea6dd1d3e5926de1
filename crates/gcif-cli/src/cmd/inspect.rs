use clap::Args;

use crate::io::container;

#[derive(Args)]
pub struct InspectArgs {
    /// Input .gci path
    pub input: String,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let (header, _payload) = container::read_gci(&args.input)?;

    println!("file: {}", args.input);
    println!("size: {}x{}", header.xsize, header.ysize);
    println!("payload_bits: {}", header.bit_count);
    println!("payload_bytes: {}", header.payload_len);
    println!("file_bytes: {}", header.file_len);
    let raw = header.xsize as u64 * header.ysize as u64 * 4;
    println!(
        "ratio_vs_raw: {:.2}",
        raw as f64 / header.file_len.max(1) as f64
    );

    Ok(())
}
