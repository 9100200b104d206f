use std::process::Command;

fn short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let sha = short_sha();
    let label = match &sha {
        Some(sha) => format!("{}+{}", version, sha),
        None => version,
    };

    println!("cargo:rustc-env=CENTURY_GIT_SHA={}", sha.unwrap_or_default());
    println!("cargo:rustc-env=CENTURY_VERSION_LABEL={}", label);
}
