#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! These checks keep Cargo.toml aligned with the agreed conventions: the
//! panic-free clippy lints, the default transport feature, and the runtime
//! stack the client is built on.

use std::path::PathBuf;

use toml::Table;

fn manifest() -> Table {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&text).expect("Cargo.toml must be valid TOML")
}

fn table<'a>(root: &'a Table, key: &str) -> &'a Table {
    root.get(key)
        .and_then(|v| v.as_table())
        .unwrap_or_else(|| panic!("Cargo.toml is missing the [{key}] table"))
}

#[test]
fn panic_free_lints_are_denied() {
    let manifest = manifest();
    let clippy = table(table(&manifest, "lints"), "clippy");
    for lint in [
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ] {
        assert_eq!(
            clippy.get(lint).and_then(|v| v.as_str()),
            Some("deny"),
            "[lints.clippy] must deny `{lint}`"
        );
    }
}

#[test]
fn websocket_transport_is_a_default_feature() {
    let manifest = manifest();
    let features = table(&manifest, "features");
    let default = features["default"].as_array().unwrap();
    assert!(default.iter().any(|f| f.as_str() == Some("transport-websocket")));

    let transport = features["transport-websocket"].as_array().unwrap();
    assert!(transport.iter().any(|f| f.as_str() == Some("dep:tokio-tungstenite")));

    let deps = table(&manifest, "dependencies");
    let tungstenite = deps["tokio-tungstenite"].as_table().unwrap();
    assert_eq!(tungstenite.get("optional").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn runtime_stack_is_declared() {
    let manifest = manifest();
    let deps = table(&manifest, "dependencies");
    for name in [
        "tokio",
        "async-trait",
        "futures-util",
        "serde",
        "serde_json",
        "thiserror",
        "tracing",
        "uuid",
        "chrono",
    ] {
        assert!(deps.contains_key(name), "missing dependency `{name}`");
    }
}

#[test]
fn library_tokio_features_stay_minimal() {
    let manifest = manifest();
    let deps = table(&manifest, "dependencies");
    let features: Vec<&str> = deps["tokio"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(
        !features.contains(&"full"),
        "the library must not enable tokio/full; tests get it from dev-dependencies"
    );
    for needed in ["sync", "macros", "rt", "time"] {
        assert!(features.contains(&needed), "tokio feature `{needed}` is required");
    }
}

#[test]
fn demo_is_registered_outside_examples_dir() {
    let manifest = manifest();
    let demos = manifest["example"].as_array().unwrap();
    for demo in demos {
        let path = demo["path"].as_str().unwrap();
        assert!(path.starts_with("demos/"), "demo `{path}` must live under demos/");
        assert!(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(path).is_file(),
            "demo `{path}` does not exist"
        );
    }
}

#[test]
fn msrv_is_declared() {
    let manifest = manifest();
    let package = table(&manifest, "package");
    let msrv = package["rust-version"].as_str().unwrap();
    let parts: Vec<u32> = msrv.split('.').map(|p| p.parse().unwrap()).collect();
    // `Option::is_none_or` needs 1.82.
    assert!(parts[0] == 1 && parts[1] >= 82, "rust-version {msrv} is too old");
}
