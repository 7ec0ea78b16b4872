// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits instead of
// concrete loaders, so a different dataset layout only needs a
// new implementation:
//   - CityscapesLoader implements SampleSource
//   - a flat "images/ + masks/" folder could as well
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::sample::SamplePaths;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can enumerate the (image, label) pairs of a split.
pub trait SampleSource {
    /// List every usable sample pair, in a stable order.
    fn load_all(&self) -> Result<Vec<SamplePaths>>;
}
