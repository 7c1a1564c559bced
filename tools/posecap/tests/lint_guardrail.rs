use std::path::PathBuf;

use toml::Value;

fn manifest(relative: &str) -> Value {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("failed to read manifest: {}", path.display()));
    toml::from_str(&text).expect("manifest should parse as TOML")
}

fn lint_level<'a>(manifest: &'a Value, table: &[&str], lint: &str) -> Option<&'a str> {
    table
        .iter()
        .try_fold(manifest, |value, key| value.get(*key))
        .and_then(|clippy| clippy.get(lint))
        .and_then(Value::as_str)
}

#[test]
fn workspace_denies_unwrap_used() {
    let workspace = manifest("../../Cargo.toml");
    assert_eq!(
        lint_level(&workspace, &["workspace", "lints", "clippy"], "unwrap_used"),
        Some("deny")
    );
    assert_eq!(
        lint_level(&workspace, &["workspace", "lints", "clippy"], "identity_op"),
        Some("deny")
    );
}

#[test]
fn package_warns_on_expect_used() {
    let package = manifest("Cargo.toml");
    assert_eq!(
        lint_level(&package, &["lints", "clippy"], "expect_used"),
        Some("warn")
    );
}

#[test]
fn library_sources_do_not_call_unwrap() {
    let src = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut stack = vec![src];
    let mut offenders = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("read src dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let text = std::fs::read_to_string(&path).expect("read source");
            // test modules sit at the bottom of each file
            let production = text.split("#[cfg(test)]").next().unwrap_or_default();
            if production.contains(".unwrap()") {
                offenders.push(path.display().to_string());
            }
        }
    }
    assert!(offenders.is_empty(), "unwrap() outside tests: {offenders:?}");
}
