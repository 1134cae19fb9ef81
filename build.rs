fn main() {
    // embuild wires the ESP-IDF sysroot into the link line for on-device
    // builds; host builds (no `espidf` feature) have nothing to link.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
