use mediator_core::Logging;

/// Server-level configuration for units, the engine, and the mediator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Engine diagnostic verbosity.
    pub logging: Logging,
    /// Upper bound on actions processed in one reaction chain. Guards against
    /// rules that keep triggering each other.
    pub max_reactions_per_flow: usize,
    /// Number of resolved/expired request ids remembered so late or duplicate
    /// resolutions are reported precisely rather than as unknown.
    pub request_tombstones: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            logging: Logging::Trace,
            max_reactions_per_flow: 10_000,
            request_tombstones: 16_384,
        }
    }
}
