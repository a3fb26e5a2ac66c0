//! Config types shared between the engine and the recorder binary.
//!
//! These are plain value types with no I/O of their own; the on-disk JSON shape and
//! defaults live in the `chzzk-recorder` binary crate, which is the only thing that
//! reads a config file.

use serde::{Deserialize, Serialize};

/// Rendition selection policy, applied by [`crate::playlist::select_variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Quality {
    Best,
    Prefer1080,
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Best
    }
}

/// Disposition for files already present in a channel's output directory when a new
/// recording starts there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OnStartPrevious {
    Archive,
    Delete,
    Keep,
}

impl Default for OnStartPrevious {
    fn default() -> Self {
        OnStartPrevious::Keep
    }
}
