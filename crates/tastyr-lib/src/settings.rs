//! Reader configuration.

/// Recognized options. No CLI, environment, or persisted state behind them.
#[derive(Clone, Copy, Debug, Default)]
pub struct Settings {
    /// Echo every major unpickler decision through the reporter.
    pub debug_tasty: bool,
    /// Drop all annotation thunks at modifier-read time.
    pub no_annotations: bool,
}
