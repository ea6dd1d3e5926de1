// crates/gcif-cli/tests/encode_decode_png.rs

use std::fs;
use std::path::Path;
use std::process::Command;

fn run_ok(cmd: &mut Command) {
    let out = cmd.output().expect("spawn command");
    assert!(
        out.status.success(),
        "command failed: status={:?}\nstdout:\n{}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn write_sprite_png(path: &Path) -> image::RgbaImage {
    let mut img = image::RgbaImage::new(40, 28);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = if x < 8 && y < 8 {
            image::Rgba([0, 0, 0, 0])
        } else if (x / 5 + y / 5) % 2 == 0 {
            image::Rgba([220, 30, 60, 255])
        } else {
            image::Rgba([30, 60, 220, (200 + (x % 3) * 10) as u8])
        };
    }
    img.save(path).expect("write png");
    img
}

#[test]
fn png_roundtrip_matches_pixels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let png_in = dir.path().join("in.png");
    let gci = dir.path().join("out.gci");
    let png_out = dir.path().join("back.png");

    let original = write_sprite_png(&png_in);

    let mut enc = Command::new(env!("CARGO_BIN_EXE_gcif"));
    enc.args([
        "encode",
        png_in.to_str().unwrap(),
        gci.to_str().unwrap(),
    ]);
    run_ok(&mut enc);

    let mut dec = Command::new(env!("CARGO_BIN_EXE_gcif"));
    dec.args([
        "decode",
        gci.to_str().unwrap(),
        png_out.to_str().unwrap(),
    ]);
    run_ok(&mut dec);

    let decoded = image::open(&png_out).expect("open decoded").to_rgba8();
    assert_eq!(decoded.dimensions(), original.dimensions());
    assert_eq!(decoded.into_raw(), original.into_raw(), "pixels differ");
}

#[test]
fn encode_is_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let png_in = dir.path().join("in.png");
    write_sprite_png(&png_in);

    let gci1 = dir.path().join("a.gci");
    let gci2 = dir.path().join("b.gci");
    for out in [&gci1, &gci2] {
        let mut enc = Command::new(env!("CARGO_BIN_EXE_gcif"));
        enc.args(["encode", png_in.to_str().unwrap(), out.to_str().unwrap()]);
        run_ok(&mut enc);
    }

    let a = fs::read(&gci1).expect("read a");
    let b = fs::read(&gci2).expect("read b");
    assert_eq!(a, b, "identical runs must produce identical .gci bytes");
}

#[test]
fn corrupt_container_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let png_in = dir.path().join("in.png");
    let gci = dir.path().join("out.gci");
    write_sprite_png(&png_in);

    let mut enc = Command::new(env!("CARGO_BIN_EXE_gcif"));
    enc.args(["encode", png_in.to_str().unwrap(), gci.to_str().unwrap()]);
    run_ok(&mut enc);

    // Flip one payload byte; the container crc must catch it.
    let mut bytes = fs::read(&gci).expect("read gci");
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x40;
    fs::write(&gci, &bytes).expect("rewrite gci");

    let out = Command::new(env!("CARGO_BIN_EXE_gcif"))
        .args(["inspect", gci.to_str().unwrap()])
        .output()
        .expect("spawn inspect");
    assert!(!out.status.success(), "inspect must reject a corrupt file");
}

#[test]
fn inspect_reports_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let png_in = dir.path().join("in.png");
    let gci = dir.path().join("out.gci");
    write_sprite_png(&png_in);

    let mut enc = Command::new(env!("CARGO_BIN_EXE_gcif"));
    enc.args(["encode", png_in.to_str().unwrap(), gci.to_str().unwrap()]);
    run_ok(&mut enc);

    let out = Command::new(env!("CARGO_BIN_EXE_gcif"))
        .args(["inspect", gci.to_str().unwrap()])
        .output()
        .expect("spawn inspect");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout).to_string();
    assert!(text.contains("size: 40x28"), "got:\n{}", text);
}
