//! Version information for the workstat binary.
//!
//! Release builds may set `WORKSTAT_GIT_REV` at compile time to stamp the
//! git revision into `--version`.

use std::sync::LazyLock;

/// The package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git revision baked in at build time (empty string if not set).
pub const GIT_REV: &str = match option_env!("WORKSTAT_GIT_REV") {
    Some(rev) => rev,
    None => "",
};

static FULL_VERSION: LazyLock<String> = LazyLock::new(|| {
    if GIT_REV.is_empty() {
        PKG_VERSION.to_string()
    } else {
        format!("{} ({})", PKG_VERSION, GIT_REV)
    }
});

/// `"X.Y.Z (rev)"` when a revision was provided, otherwise `"X.Y.Z"`.
pub fn full_version() -> &'static str {
    FULL_VERSION.as_str()
}
