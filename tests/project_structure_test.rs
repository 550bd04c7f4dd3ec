/// Verify that all modules are accessible from the crate root.
/// Each `use` statement will cause a compile error if the module is missing.

#[allow(unused_imports)]
use shortlink_load_test::api;
#[allow(unused_imports)]
use shortlink_load_test::cli;
#[allow(unused_imports)]
use shortlink_load_test::config;
#[allow(unused_imports)]
use shortlink_load_test::error;
#[allow(unused_imports)]
use shortlink_load_test::fixture;
#[allow(unused_imports)]
use shortlink_load_test::orchestrator;
#[allow(unused_imports)]
use shortlink_load_test::reporter;
#[allow(unused_imports)]
use shortlink_load_test::stats;
#[allow(unused_imports)]
use shortlink_load_test::transport;
#[allow(unused_imports)]
use shortlink_load_test::verifier;
#[allow(unused_imports)]
use shortlink_load_test::vu;

#[test]
fn cargo_toml_defines_binary() {
    let cargo_toml = std::fs::read_to_string("Cargo.toml").expect("Failed to read Cargo.toml");
    assert!(
        cargo_toml.contains("name = \"shortlink-load-test\""),
        "Cargo.toml should define the shortlink-load-test binary"
    );
    assert!(
        cargo_toml.contains("path = \"src/main.rs\""),
        "Cargo.toml should specify path for the binary"
    );
}

#[test]
fn default_config_targets_local_service() {
    let config = config::Config::default();
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.vus, config.iterations);
    assert!(config.validate().is_ok());
}
