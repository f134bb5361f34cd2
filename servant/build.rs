use std::{env, fs, io, path::PathBuf};

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=memory.x");
    if env::var_os("CARGO_FEATURE_BOARD").is_none() {
        return Ok(());
    }
    // Put the memory.x script somewhere the linker can find it
    let out = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR not set"))?;
    fs::write(out.join("memory.x"), include_bytes!("memory.x"))?;

    // Extend the linker search path
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rustc-link-arg-examples=-Tlink.x");
    Ok(())
}
