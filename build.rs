fn main() {
    // Native round-trip tests locate a C compiler for the exact target triple.
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=ADGEN_TEST_TARGET={target}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
