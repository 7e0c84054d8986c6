//! Structured errors and warnings reported to clients.
//!
//! An [`ApiError`] stores its status as the resolved numeric string, never
//! the symbolic name, and its machine code either as given or, with
//! `use_text_errors`, as the code's text name. Both serialize with a fixed
//! field order and only the fields that are set.

use crate::config::Settings;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Machine codes
pub mod codes {
    pub const VALIDATION_ERROR: &str = "100";
    pub const INVALID_RESOURCE: &str = "101";
    pub const FILTER_NOT_ALLOWED: &str = "102";
    pub const INVALID_FIELD_VALUE: &str = "103";
    pub const INVALID_FIELD: &str = "104";
    pub const PARAM_NOT_ALLOWED: &str = "105";
    pub const PARAM_MISSING: &str = "106";
    pub const INVALID_FILTER_VALUE: &str = "107";
    pub const COUNT_MISMATCH: &str = "108";
    pub const KEY_ORDER_MISMATCH: &str = "109";
    pub const KEY_NOT_INCLUDED_IN_URL: &str = "110";
    pub const INVALID_INCLUDE: &str = "112";
    pub const RELATION_EXISTS: &str = "113";
    pub const INVALID_SORT_CRITERIA: &str = "114";
    pub const INVALID_LINKS_OBJECT: &str = "115";
    pub const TYPE_MISMATCH: &str = "116";
    pub const INVALID_PAGE_OBJECT: &str = "117";
    pub const INVALID_PAGE_VALUE: &str = "118";
    pub const INVALID_FIELD_FORMAT: &str = "119";
    pub const INVALID_FILTERS_SYNTAX: &str = "120";
    pub const SAVE_FAILED: &str = "121";
    pub const INVALID_DATA_FORMAT: &str = "122";
    pub const INVALID_RELATIONSHIP: &str = "123";
    pub const BAD_REQUEST: &str = "400";
    pub const FORBIDDEN: &str = "403";
    pub const RECORD_NOT_FOUND: &str = "404";
    pub const NOT_ACCEPTABLE: &str = "406";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "415";
    pub const LOCKED: &str = "423";
    pub const INTERNAL_SERVER_ERROR: &str = "500";
}

static TEXT_ERRORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    use codes::*;
    HashMap::from([
        (VALIDATION_ERROR, "VALIDATION_ERROR"),
        (INVALID_RESOURCE, "INVALID_RESOURCE"),
        (FILTER_NOT_ALLOWED, "FILTER_NOT_ALLOWED"),
        (INVALID_FIELD_VALUE, "INVALID_FIELD_VALUE"),
        (INVALID_FIELD, "INVALID_FIELD"),
        (PARAM_NOT_ALLOWED, "PARAM_NOT_ALLOWED"),
        (PARAM_MISSING, "PARAM_MISSING"),
        (INVALID_FILTER_VALUE, "INVALID_FILTER_VALUE"),
        (COUNT_MISMATCH, "COUNT_MISMATCH"),
        (KEY_ORDER_MISMATCH, "KEY_ORDER_MISMATCH"),
        (KEY_NOT_INCLUDED_IN_URL, "KEY_NOT_INCLUDED_IN_URL"),
        (INVALID_INCLUDE, "INVALID_INCLUDE"),
        (RELATION_EXISTS, "RELATION_EXISTS"),
        (INVALID_SORT_CRITERIA, "INVALID_SORT_CRITERIA"),
        (INVALID_LINKS_OBJECT, "INVALID_LINKS_OBJECT"),
        (TYPE_MISMATCH, "TYPE_MISMATCH"),
        (INVALID_PAGE_OBJECT, "INVALID_PAGE_OBJECT"),
        (INVALID_PAGE_VALUE, "INVALID_PAGE_VALUE"),
        (INVALID_FIELD_FORMAT, "INVALID_FIELD_FORMAT"),
        (INVALID_FILTERS_SYNTAX, "INVALID_FILTERS_SYNTAX"),
        (SAVE_FAILED, "SAVE_FAILED"),
        (INVALID_DATA_FORMAT, "INVALID_DATA_FORMAT"),
        (INVALID_RELATIONSHIP, "INVALID_RELATIONSHIP"),
        (BAD_REQUEST, "BAD_REQUEST"),
        (FORBIDDEN, "FORBIDDEN"),
        (RECORD_NOT_FOUND, "RECORD_NOT_FOUND"),
        (NOT_ACCEPTABLE, "NOT_ACCEPTABLE"),
        (UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE"),
        (LOCKED, "LOCKED"),
        (INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
    ])
});

/// Text name of a machine code
pub fn text_for(code: &str) -> Option<&'static str> {
    TEXT_ERRORS.get(code).copied()
}

/// Code as it should be reported under `settings`; unknown codes are kept as given
fn reported_code(settings: &Settings, code: String) -> String {
    if settings.config.use_text_errors {
        text_for(&code).map(str::to_string).unwrap_or(code)
    } else {
        code
    }
}

/// Raw error fields, with the status still symbolic (`"not_found"`)
///
/// Used both to construct an [`ApiError`] and as the patch for
/// [`ApiError::update_with_overrides`], where only the set fields apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorOptions {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub id: Option<String>,
    pub href: Option<String>,
    pub code: Option<String>,
    pub source: Option<Value>,
    pub links: Option<Map<String, Value>>,
    pub status: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

impl ErrorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    #[must_use]
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: Value) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn links(mut self, links: Map<String, Value>) -> Self {
        self.links = Some(links);
        self
    }

    /// Symbolic (`"unprocessable_content"`) or numeric (`"422"`) status
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// One client-facing problem object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,
    /// Resolved numeric status (`"404"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ApiError {
    /// Build from options, resolving the status and mapping the code
    ///
    /// An unresolvable status leaves `status` unset and is logged; it is a
    /// configuration defect, not something to guess around.
    pub fn new(settings: &Settings, options: ErrorOptions) -> Self {
        let mut error = Self::default();
        error.apply(settings, options);
        error
    }

    /// Replace exactly the fields set in `overrides`, leaving the rest untouched
    pub fn update_with_overrides(&mut self, settings: &Settings, overrides: ErrorOptions) {
        self.apply(settings, overrides);
    }

    fn apply(&mut self, settings: &Settings, options: ErrorOptions) {
        let ErrorOptions {
            title,
            detail,
            id,
            href,
            code,
            source,
            links,
            status,
            meta,
        } = options;

        if title.is_some() {
            self.title = title;
        }
        if detail.is_some() {
            self.detail = detail;
        }
        if id.is_some() {
            self.id = id;
        }
        if href.is_some() {
            self.href = href;
        }
        if let Some(code) = code {
            self.code = Some(reported_code(settings, code));
        }
        if source.is_some() {
            self.source = source;
        }
        if links.is_some() {
            self.links = links;
        }
        if let Some(status) = status {
            self.status = settings.statuses.resolve(&status);
            if self.status.is_none() {
                log::error!("Unresolvable error status {status:?}");
            }
        }
        if meta.is_some() {
            self.meta = meta;
        }
    }

    /// Key/value form with only the set fields, in declaration order
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Non-fatal notice attached to a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiWarning {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub code: String,
}

impl ApiWarning {
    pub fn new(settings: &Settings, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: None,
            code: reported_code(settings, code.into()),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
