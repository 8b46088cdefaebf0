//! Build identification, fixed at compile time.
//!
//! `BUILD_NUMBER` and `GIT_COMMIT` are read from the build environment;
//! unset values render as `unknown`.

use std::fmt;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const BUILD_NUMBER: &str = match option_env!("BUILD_NUMBER") {
    Some(number) => number,
    None => "unknown",
};

pub const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// The values served at the site root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_number: &'static str,
    pub git_commit: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            build_number: BUILD_NUMBER,
            git_commit: GIT_COMMIT,
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version:\t{}\nBuild Number:\t{}\nGit Commit:\t{}",
            self.version, self.build_number, self.git_commit
        )
    }
}
