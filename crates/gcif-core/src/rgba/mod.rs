// crates/gcif-core/src/rgba/mod.rs

pub mod reader;
pub mod writer;

pub use reader::RgbaReader;
pub use writer::RgbaWriter;

/// Y-channel literal alphabet: 256 byte values plus the LZ escape classes.
pub const NUM_Y_SYMS: usize = 256 + crate::lz::LZ_ESCAPE_SYMS;
pub const NUM_UV_SYMS: usize = 256;
