//! Observability helpers shared by token store operations.
//!
//! Every store operation runs inside a `bff_token_relay.flow` span carrying the `flow`
//! and `stage` fields. With the `metrics` feature enabled, each attempt and terminal
//! outcome also increments the `bff_token_relay_flow_total` counter, labeled by `flow`
//! and `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Token relay operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Cache lookup, including any refresh it triggers.
	Lookup,
	/// Upstream refresh exchange performed under the per-user lock.
	Refresh,
	/// Explicit write of a record.
	Store,
	/// Explicit removal of a record.
	Clear,
	/// Unauthorized-response handling.
	Intercept,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Lookup => "lookup",
			FlowKind::Refresh => "refresh",
			FlowKind::Store => "store",
			FlowKind::Clear => "clear",
			FlowKind::Intercept => "intercept",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// A usable token was returned or the write landed.
	Success,
	/// No usable token exists; the caller must re-authenticate.
	Miss,
	/// An error was propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Miss => "miss",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
