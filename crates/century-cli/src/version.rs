use serde::Serialize;

/// Package version, with `+<short sha>` appended when built from a git checkout.
pub const LABEL: &str = env!("CENTURY_VERSION_LABEL");
const GIT_SHA: &str = env!("CENTURY_GIT_SHA");

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub core: &'static str,
    pub git_sha: Option<&'static str>,
}

pub fn info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        core: century_core::version(),
        git_sha: (!GIT_SHA.is_empty()).then_some(GIT_SHA),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matches_reported_sha() {
        let info = info();
        assert!(LABEL.starts_with(info.version));
        assert_eq!(info.core, info.version);
        match info.git_sha {
            Some(sha) => assert_eq!(LABEL, format!("{}+{}", info.version, sha)),
            None => assert_eq!(LABEL, info.version),
        }
    }
}
