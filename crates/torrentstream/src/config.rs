use torrentstream_core::{DEFAULT_HIGH_PRIORITY_COUNT, DEFAULT_LOOK_AHEAD_COUNT};

/// Tunables for how aggressively a stream biases the piece picker toward its current position.
///
/// Mirrors the options-struct-with-`Default`-impl pattern used for the rest of this engine's
/// session and torrent configuration: every field has a sensible default and callers override
/// only what they care about.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Number of pieces immediately ahead of the reader fetched with top priority, ahead of
    /// anything else the base picker would otherwise choose.
    pub high_priority_count: u32,

    /// Number of further pieces prefetched behind the urgent window, fetched only once the
    /// urgent band is fully in flight or unavailable from the connected peers.
    pub look_ahead_count: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            high_priority_count: DEFAULT_HIGH_PRIORITY_COUNT,
            look_ahead_count: DEFAULT_LOOK_AHEAD_COUNT,
        }
    }
}
