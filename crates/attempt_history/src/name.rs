//! Job name encoding
//!
//! Orchestrator object names follow a restrictive grammar, so every job
//! display name is translated into an `EncodedKey` before lookup.
//! Platform-managed names (`owner~job`) are hashed; names of jobs submitted
//! straight to the orchestrator are stripped down to `[a-z0-9]`.

use md5::{Digest, Md5};
use std::fmt;

/// Prefix carried by jobs whose owner was never assigned
pub const UNASSIGNED_OWNER_MARKER: &str = "unknown";

/// Separates owner and job in platform-managed names
pub const NAME_SEPARATOR: char = '~';

/// Key used to address a job object in the orchestrator API
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedKey(String);

impl EncodedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Naming convention a display name follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobName<'a> {
    /// Submitted directly to the orchestrator, bypassing the platform
    Unmanaged(&'a str),
    /// Created through the platform as `owner~job`
    Managed(&'a str),
}

impl<'a> JobName<'a> {
    pub fn classify(name: &'a str) -> Self {
        if name.starts_with(UNASSIGNED_OWNER_MARKER) || !name.contains(NAME_SEPARATOR) {
            JobName::Unmanaged(name)
        } else {
            JobName::Managed(name)
        }
    }

    pub fn encode(&self) -> EncodedKey {
        match self {
            JobName::Unmanaged(name) => {
                let stripped = name.strip_prefix(UNASSIGNED_OWNER_MARKER).unwrap_or(name);
                let normalized = stripped
                    .chars()
                    .flat_map(char::to_lowercase)
                    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                    .collect();
                EncodedKey(normalized)
            }
            // 128-bit digest, 32 hex chars
            JobName::Managed(name) => EncodedKey(hex::encode(Md5::digest(name.as_bytes()))),
        }
    }
}

/// Encode a display name into its orchestrator lookup key
pub fn encode(name: &str) -> EncodedKey {
    JobName::classify(name).encode()
}
