//! Domain settings injected into the services.
//!
//! The server binary builds these from its environment configuration; the
//! services never read the environment themselves.

/// Registration rules and commit behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FestSettings {
    /// Maximum active (`pending` + `paid`) registrations per participant
    pub max_events: usize,
    /// ISO currency code for orders
    pub currency: String,
    /// How many times a commit is re-attempted after a version conflict
    pub max_conflict_retries: usize,
}

impl Default for FestSettings {
    fn default() -> Self {
        Self {
            max_events: 4,
            currency: "INR".to_string(),
            max_conflict_retries: 5,
        }
    }
}
