//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Audit recording (tracing sink by default, external log in production)
//! - Clock (for testing)

mod audit;
mod testing;

pub use audit::{AuditEntry, AuditPort, DecisionKind};
pub use testing::ClockPort;

#[cfg(test)]
pub use audit::MockAuditPort;
#[cfg(test)]
pub use testing::MockClockPort;
