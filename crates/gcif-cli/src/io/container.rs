use anyhow::Context;

const MAGIC: &[u8; 4] = b"GCI1";
const VERSION: u8 = 1;

/// .gci layout (little-endian):
/// MAGIC[4]
/// version:u8
/// xsize:u16
/// ysize:u16
/// bit_count:u64          (exact payload bits; payload is zero-padded)
/// payload[ceil(bit_count/8)]
/// crc32:u32              (over everything before crc32)
pub fn write_gci(path: &str, xsize: u32, ysize: u32, bit_count: u64, payload: &[u8]) -> anyhow::Result<()> {
    let mut out = Vec::with_capacity(4 + 1 + 2 + 2 + 8 + payload.len() + 4);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(xsize as u16).to_le_bytes());
    out.extend_from_slice(&(ysize as u16).to_le_bytes());
    out.extend_from_slice(&bit_count.to_le_bytes());
    out.extend_from_slice(payload);

    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_le_bytes());

    std::fs::write(path, out)?;
    Ok(())
}

pub struct GciHeader {
    pub xsize: u32,
    pub ysize: u32,
    pub bit_count: u64,
    pub payload_len: usize,
    pub file_len: usize,
}

/// Read and validate a .gci file, returning (header, payload).
pub fn read_gci(path: &str) -> anyhow::Result<(GciHeader, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("read {path}"))?;
    if bytes.len() < 4 + 1 + 2 + 2 + 8 + 4 {
        anyhow::bail!("gci too small");
    }
    if &bytes[0..4] != MAGIC {
        anyhow::bail!("bad gci magic");
    }
    if bytes[4] != VERSION {
        anyhow::bail!("unsupported gci version {}", bytes[4]);
    }

    let crc_off = bytes.len() - 4;
    let crc_expected = u32::from_le_bytes(bytes[crc_off..].try_into().unwrap());
    let crc_actual = crc32(&bytes[..crc_off]);
    if crc_expected != crc_actual {
        anyhow::bail!("gci crc32 mismatch");
    }

    let xsize = u16::from_le_bytes(bytes[5..7].try_into().unwrap()) as u32;
    let ysize = u16::from_le_bytes(bytes[7..9].try_into().unwrap()) as u32;
    let bit_count = u64::from_le_bytes(bytes[9..17].try_into().unwrap());

    let payload_len = ((bit_count + 7) / 8) as usize;
    let payload_end = 17 + payload_len;
    if payload_end != crc_off {
        anyhow::bail!("gci payload length mismatch");
    }

    let header = GciHeader {
        xsize,
        ysize,
        bit_count,
        payload_len,
        file_len: bytes.len(),
    };
    Ok((header, bytes[17..payload_end].to_vec()))
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(bytes);
    h.finalize()
}
