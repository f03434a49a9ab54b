//! Centralized domain separation tags and reserved monikers.
//!
//! All hash domains used by the engine must be defined here to avoid
//! accidental reuse and keep versioning in one place.

/// Domain for hashing facts and patterns (v0).
pub const DOMAIN_VALUE_V0: &[u8] = b"VALUE_V0";

/// Domain for hashing a single rule (v0).
pub const DOMAIN_RULE_V0: &[u8] = b"RULE_V0";

/// Domain for rule set fingerprints (v0).
pub const DOMAIN_RULE_SET_V0: &[u8] = b"RULE_SET_V0";

/// Domain for binding map fingerprints (v0).
pub const DOMAIN_BINDINGS_V0: &[u8] = b"BINDINGS_V0";

/// Domain for run trace fingerprints (v0).
pub const DOMAIN_RUN_TRACE_V0: &[u8] = b"RUN_TRACE_V0";

/// Prefix marking a text value as a variable reference.
pub const VARIABLE_SIGIL: char = '$';

/// Default moniker of the control fact that empties the active arc set.
pub const CLEAR_ARCS_MONIKER: &str = "clear-arcs";

/// Moniker of the built-in logging plugin.
pub const LOG_MONIKER: &str = "#log";

/// Moniker of the built-in context assignment plugin.
pub const SET_MONIKER: &str = "#set";

/// Moniker of the built-in fact emission plugin.
pub const EMIT_MONIKER: &str = "#emit";
