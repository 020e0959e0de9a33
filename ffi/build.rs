//! Regenerates `include/dispatch.h` from the `extern "C"` surface.

fn main() {
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo");
    println!("cargo:rerun-if-changed=src");

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("DISPATCH_FFI_H")
        .with_documentation(true)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(format!("{crate_dir}/include/dispatch.h"));
        }
        Err(err) => println!("cargo:warning=cbindgen skipped header generation: {err}"),
    }
}
