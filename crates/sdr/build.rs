fn main() {
    #[cfg(feature = "bladerf")]
    {
        println!("cargo:rustc-link-lib=bladeRF");
    }
}
