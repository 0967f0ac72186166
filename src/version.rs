//! Build metadata embedded by `build.rs`.

use std::fmt;

/// Crate version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Where and when this build of muninn came from.
///
/// Fields vergen could not fill (no git checkout, no build timestamp) read
/// `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: option_env!("VERGEN_GIT_BRANCH").unwrap_or(UNKNOWN),
            sha: option_env!("VERGEN_GIT_SHA").unwrap_or(UNKNOWN),
            dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
            built_at: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or(UNKNOWN),
        }
    }

    /// First seven characters of the commit.
    pub fn short_sha(&self) -> &'static str {
        self.sha.get(..7).unwrap_or(self.sha)
    }
}

/// `{version}+{branch}.{short-sha}`, with `.dirty` for modified trees.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}.{}", self.version, self.branch, self.short_sha())?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sha: &'static str, dirty: bool) -> BuildInfo {
        BuildInfo {
            version: "1.2.3",
            branch: "main",
            sha,
            dirty,
            built_at: UNKNOWN,
        }
    }

    #[test]
    fn display_shortens_sha() {
        assert_eq!(info("abcdef0123456789", false).to_string(), "1.2.3+main.abcdef0");
    }

    #[test]
    fn display_marks_dirty_tree() {
        assert_eq!(info("abcdef0123456789", true).to_string(), "1.2.3+main.abcdef0.dirty");
    }

    #[test]
    fn short_sha_keeps_short_values() {
        assert_eq!(info("abc", false).short_sha(), "abc");
        assert_eq!(info(UNKNOWN, false).short_sha(), UNKNOWN);
    }

    #[test]
    fn current_build_reports_crate_version() {
        assert!(BuildInfo::current().to_string().starts_with(PKG_VERSION));
    }
}
