//! # Driver Configuration
//!
//! The buffer size, device name and fill pattern are compiled in (see the
//! `kernel-info` crate). The only load-time choice is how strictly mapping
//! lengths are validated.

/// Which mapping lengths are accepted besides the capacity ceiling.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LengthPolicy {
    /// Only lengths above the capacity are refused. A zero-length request
    /// succeeds and installs nothing; sub-page lengths are mapped whole pages
    /// at a time by the platform.
    #[default]
    Permissive,
    /// Additionally refuse zero lengths and lengths that are not a multiple
    /// of the page size.
    Strict,
}

/// Load-time driver configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct KmapConfig {
    pub length_policy: LengthPolicy,
}

impl KmapConfig {
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            length_policy: LengthPolicy::Strict,
        }
    }
}
