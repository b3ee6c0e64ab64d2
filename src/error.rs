//! Error kinds shared across the simulation core.
//!
//! Mirrors the error *kinds* called out by the design: configuration problems
//! fail fast at construction, invariant violations and unset preconditions are
//! fatal and propagate to the driver, and invalid arguments are fatal within
//! the simulator proper (callers above it are expected to have validated
//! already).

use std::fmt;

/// Errors surfaced by the simulation core.
///
/// These are kinds, not a type per failure site: callers match on the variant,
/// not on the message text.
#[derive(Debug, Clone)]
pub enum SimError {
    /// Invalid numerology, unknown flow type, `max_lat < 2`, empty users/slices
    /// where required, malformed configuration records.
    Config(String),
    /// A scheduler handed out more RBGs than the basestation owns, or the MILP
    /// `Optimal` policy declared infeasible.
    InvariantViolation(String),
    /// `transmit` called before spectral efficiency was set for a user that
    /// holds RBGs.
    UnsetPrecondition(String),
    /// A rolling-window argument was zero, or an unknown slice/user id was
    /// referenced.
    InvalidArgument(String),
    /// The learned-policy (SAC) inference step failed or returned a
    /// mis-shaped action vector.
    Model(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {}", msg),
            SimError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            SimError::UnsetPrecondition(msg) => write!(f, "unset precondition: {}", msg),
            SimError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            SimError::Model(msg) => write!(f, "model error: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_prefix() {
        let e = SimError::InvalidArgument("window must be >= 1".to_string());
        assert_eq!(e.to_string(), "invalid argument: window must be >= 1");
    }
}
