use clap::{Parser, Subcommand};

mod cmd;
mod io;

#[derive(Parser)]
#[command(name = "gcif")]
#[command(about = "GCIF lossless RGBA codec", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress a PNG into a .gci file
    Encode(cmd::encode::EncodeArgs),

    /// Decompress a .gci file back to PNG
    Decode(cmd::decode::DecodeArgs),

    /// Print .gci header fields without decoding pixels
    Inspect(cmd::inspect::InspectArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Encode(args) => cmd::encode::run(args),
        Commands::Decode(args) => cmd::decode::run(args),
        Commands::Inspect(args) => cmd::inspect::run(args),
    }
}
