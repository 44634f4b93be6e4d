fn main() {
    // ESP-IDF link arguments are only needed for device builds; host
    // builds (simulator, tests) have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
