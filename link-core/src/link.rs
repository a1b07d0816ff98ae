//! Link health tracking (the pure half of the connectivity monitor).
//!
//! The transport reports raw activation and reachability flags; this
//! module folds them into a single effective signal and detects edges.
//! Changes propagate immediately - no debouncing here. Consumers that
//! act on a rising edge apply the settle delay themselves, because a
//! transport may report reachable before it can actually carry a
//! transfer.

/// The tracked state of the underlying link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkHealth {
    /// The link completed activation.
    pub activated: bool,
    /// The raw reachability flag from the transport.
    pub reachable: bool,
    /// The last activation attempt reported an error.
    pub activation_error: bool,
}

impl LinkHealth {
    /// Create a monitor with the link down.
    pub fn new() -> Self {
        Self::default()
    }

    /// The single signal consumed by all other components.
    ///
    /// An activation error forces unreachable regardless of the raw
    /// reachable flag.
    pub fn effective_reachable(&self) -> bool {
        self.activated && self.reachable && !self.activation_error
    }

    /// Fold in a transport report and return the effective edge, if any.
    pub fn apply(
        &mut self,
        activated: bool,
        reachable: bool,
        activation_error: bool,
    ) -> Option<ReachabilityChange> {
        let before = self.effective_reachable();
        self.activated = activated;
        self.reachable = reachable;
        self.activation_error = activation_error;
        let after = self.effective_reachable();

        match (before, after) {
            (false, true) => Some(ReachabilityChange::CameUp),
            (true, false) => Some(ReachabilityChange::WentDown),
            _ => None,
        }
    }
}

/// An effective reachability edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityChange {
    /// The link became usable.
    CameUp,
    /// The link became unusable.
    WentDown,
}
