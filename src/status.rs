//! Symbolic status names and their numeric codes.
//!
//! Resolution order: direct lookup in the table, then the alias table of
//! superseded names (with a deprecation notice), then nothing. An unresolved
//! name is a configuration defect; it is never defaulted to a guess.

use crate::deprecation::warn_deprecated;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static STANDARD_STATUSES: Lazy<HashMap<&'static str, u16>> = Lazy::new(|| {
    HashMap::from([
        ("continue", 100),
        ("switching_protocols", 101),
        ("processing", 102),
        ("early_hints", 103),
        ("ok", 200),
        ("created", 201),
        ("accepted", 202),
        ("non_authoritative_information", 203),
        ("no_content", 204),
        ("reset_content", 205),
        ("partial_content", 206),
        ("multi_status", 207),
        ("already_reported", 208),
        ("im_used", 226),
        ("multiple_choices", 300),
        ("moved_permanently", 301),
        ("found", 302),
        ("see_other", 303),
        ("not_modified", 304),
        ("use_proxy", 305),
        ("temporary_redirect", 307),
        ("permanent_redirect", 308),
        ("bad_request", 400),
        ("unauthorized", 401),
        ("payment_required", 402),
        ("forbidden", 403),
        ("not_found", 404),
        ("method_not_allowed", 405),
        ("not_acceptable", 406),
        ("proxy_authentication_required", 407),
        ("request_timeout", 408),
        ("conflict", 409),
        ("gone", 410),
        ("length_required", 411),
        ("precondition_failed", 412),
        ("content_too_large", 413),
        ("uri_too_long", 414),
        ("unsupported_media_type", 415),
        ("range_not_satisfiable", 416),
        ("expectation_failed", 417),
        ("misdirected_request", 421),
        ("unprocessable_content", 422),
        ("locked", 423),
        ("failed_dependency", 424),
        ("too_early", 425),
        ("upgrade_required", 426),
        ("precondition_required", 428),
        ("too_many_requests", 429),
        ("request_header_fields_too_large", 431),
        ("unavailable_for_legal_reasons", 451),
        ("internal_server_error", 500),
        ("not_implemented", 501),
        ("bad_gateway", 502),
        ("service_unavailable", 503),
        ("gateway_timeout", 504),
        ("http_version_not_supported", 505),
        ("variant_also_negotiates", 506),
        ("insufficient_storage", 507),
        ("loop_detected", 508),
        ("not_extended", 510),
        ("network_authentication_required", 511),
    ])
});

/// Superseded symbolic names and their current equivalents
pub const STATUS_ALIASES: &[(&str, &str)] = &[
    ("unprocessable_entity", "unprocessable_content"),
    ("request_entity_too_large", "content_too_large"),
    ("payload_too_large", "content_too_large"),
    ("request_uri_too_long", "uri_too_long"),
    ("requested_range_not_satisfiable", "range_not_satisfiable"),
];

/// Name -> numeric status table, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    codes: HashMap<String, u16>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl StatusTable {
    /// Current standard HTTP status names
    pub fn standard() -> Self {
        Self {
            codes: STANDARD_STATUSES
                .iter()
                .map(|(name, code)| ((*name).to_string(), *code))
                .collect(),
        }
    }

    /// Standard names plus `overrides`, which win on conflict
    pub fn with_overrides(overrides: &HashMap<String, u16>) -> Self {
        let mut table = Self::standard();
        table.codes.extend(overrides.iter().map(|(name, code)| (name.clone(), *code)));
        table
    }

    /// Direct lookup only; aliases are not consulted
    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.codes.get(name).copied()
    }

    /// Resolve `status` to its numeric code
    ///
    /// Numeric input (`"404"`) passes through. Otherwise the name is looked up
    /// directly, then through [`STATUS_ALIASES`]; alias hits log a
    /// deprecation notice.
    pub fn code(&self, status: &str) -> Option<u16> {
        if let Ok(numeric) = status.parse::<u16>() {
            return (100..=599).contains(&numeric).then_some(numeric);
        }
        if let Some(code) = self.lookup(status) {
            return Some(code);
        }
        let (_, current) = STATUS_ALIASES.iter().find(|(old, _)| *old == status)?;
        warn_deprecated(&format!("status `{status}` is deprecated, use `{current}` instead"));
        self.lookup(current)
    }

    /// Resolved numeric status as a string, the form errors and results carry
    pub fn resolve(&self, status: &str) -> Option<String> {
        self.code(status).map(|code| code.to_string())
    }
}
