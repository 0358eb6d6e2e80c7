//! Generates `yt_engine.h` for C hosts into `OUT_DIR`.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        return;
    };

    let generated = cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("YT_ENGINE_H")
        .with_cpp_compat(true)
        .generate();

    match generated {
        Ok(bindings) => {
            bindings.write_to_file(PathBuf::from(out_dir).join("yt_engine.h"));
        }
        Err(err) => println!("cargo:warning=header generation skipped: {err}"),
    }
}
