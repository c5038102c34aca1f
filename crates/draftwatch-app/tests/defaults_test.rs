// Checks on the files shipped in defaults/ and data/.

use std::path::Path;

use draftwatch_football::rankings::load_seed;

/// Verify that defaults/watch.toml is valid TOML.
#[test]
fn watch_toml_is_valid() {
    let content = std::fs::read_to_string("defaults/watch.toml").expect("defaults/watch.toml should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(parsed.is_ok(), "defaults/watch.toml is not valid TOML: {:?}", parsed.err());
}

/// Verify that defaults/credentials.toml.example is valid TOML.
#[test]
fn credentials_example_is_valid_toml() {
    let content = std::fs::read_to_string("defaults/credentials.toml.example")
        .expect("defaults/credentials.toml.example should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(
        parsed.is_ok(),
        "defaults/credentials.toml.example is not valid TOML: {:?}",
        parsed.err()
    );
}

/// The seed file referenced by the default config loads and is ordered.
#[test]
fn rankings_seed_loads() {
    let players = load_seed(Path::new("data/rankings_seed.csv")).expect("seed should load");
    assert!(players.len() >= 30);
    assert_eq!(players[0].rank, 1);
    assert!(players.windows(2).all(|w| w[0].rank <= w[1].rank));
    assert!(players.iter().all(|p| !p.position.is_empty()));
}
