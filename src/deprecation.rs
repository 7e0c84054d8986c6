//! Deprecation notices.

/// Log target for deprecation notices, so hosts can route or silence them
pub const DEPRECATION_TARGET: &str = "lifeline::deprecation";

/// Emit a deprecation notice. Never fails; safe to call repeatedly.
pub fn warn_deprecated(message: &str) {
    log::warn!(target: DEPRECATION_TARGET, "DEPRECATION WARNING: {message}");
}
