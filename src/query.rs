//! Primary query description: filters, sort and pagination.
//!
//! These are plain values handed to the data store. The engine never
//! interprets filters itself; it only adds the select list and order
//! expressions it needs, quoted through the store's own dialect.

use crate::identity::{PrimaryKey, ResourceType};
use std::collections::BTreeMap;

/// Field filters; a JSON array value means "any of".
pub type Filters = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCriterion {
    pub field: String,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `"title"` / `"-created_at"` style sort parameters.
    pub fn parse_list(sort: &str) -> Vec<Self> {
        sort.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(field) => Self::desc(field),
                None => Self::asc(s),
            })
            .collect()
    }
}

/// Page window requested for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `page[offset]` / `page[limit]`
    Offset { offset: u64, limit: u64 },
    /// `page[number]` (1-based) / `page[size]`
    Paged { number: u64, size: u64 },
}

impl Pagination {
    pub fn limit(&self) -> u64 {
        match self {
            Pagination::Offset { limit, .. } => *limit,
            Pagination::Paged { size, .. } => *size,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Pagination::Offset { offset, .. } => *offset,
            Pagination::Paged { number, size } => number.saturating_sub(1).saturating_mul(*size),
        }
    }

    /// Clamp the window size to `maximum`, replacing a zero size with `default`.
    #[must_use]
    pub fn clamped(self, default: u64, maximum: u64) -> Self {
        let fix = |n: u64| if n == 0 { default.min(maximum) } else { n.min(maximum) };
        match self {
            Pagination::Offset { offset, limit } => Pagination::Offset {
                offset,
                limit: fix(limit),
            },
            Pagination::Paged { number, size } => Pagination::Paged {
                number: number.max(1),
                size: fix(size),
            },
        }
    }

    /// Number of pages needed for `record_count` records.
    pub fn page_count(&self, record_count: u64) -> u64 {
        let limit = self.limit();
        if limit == 0 {
            return 0;
        }
        record_count.div_ceil(limit)
    }

    /// `first` / `prev` / `next` / `last` windows relative to this one.
    ///
    /// `last` is only produced when the record count is known.
    pub fn link_params(&self, record_count: Option<u64>) -> BTreeMap<String, Pagination> {
        let mut links = BTreeMap::new();
        match *self {
            Pagination::Offset { offset, limit } => {
                links.insert("first".to_string(), Pagination::Offset { offset: 0, limit });
                if offset > 0 {
                    links.insert(
                        "prev".to_string(),
                        Pagination::Offset {
                            offset: offset.saturating_sub(limit),
                            limit,
                        },
                    );
                }
                // No next window past the end of the key space
                if let Some(next) = offset.checked_add(limit) {
                    if record_count.map_or(true, |count| next < count) {
                        let window = Pagination::Offset { offset: next, limit };
                        links.insert("next".to_string(), window);
                    }
                }
                if let Some(count) = record_count {
                    let last = count.saturating_sub(1) / limit.max(1) * limit;
                    links.insert("last".to_string(), Pagination::Offset { offset: last, limit });
                }
            }
            Pagination::Paged { number, size } => {
                links.insert("first".to_string(), Pagination::Paged { number: 1, size });
                if number > 1 {
                    let window = Pagination::Paged {
                        number: number - 1,
                        size,
                    };
                    links.insert("prev".to_string(), window);
                }
                let pages = record_count.map(|count| self.page_count(count));
                if let Some(next) = number.checked_add(1) {
                    if pages.map_or(true, |pages| number < pages) {
                        links.insert("next".to_string(), Pagination::Paged { number: next, size });
                    }
                }
                if let Some(pages) = pages {
                    let window = Pagination::Paged {
                        number: pages.max(1),
                        size,
                    };
                    links.insert("last".to_string(), window);
                }
            }
        }
        links
    }
}

/// Primary lookup over one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryQuery {
    pub resource_type: ResourceType,
    pub filters: Filters,
    pub sort: Vec<SortCriterion>,
    pub pagination: Option<Pagination>,
    /// Explicit primary keys; required by stores without filtered find
    pub keys: Option<Vec<PrimaryKey>>,
}

impl PrimaryQuery {
    pub fn new(resource_type: impl Into<ResourceType>) -> Self {
        Self {
            resource_type: resource_type.into(),
            filters: Filters::new(),
            sort: Vec::new(),
            pagination: None,
            keys: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, field: &str, value: serde_json::Value) -> Self {
        self.filters.insert(field.to_string(), value);
        self
    }

    #[must_use]
    pub fn sort(mut self, criterion: SortCriterion) -> Self {
        self.sort.push(criterion);
        self
    }

    #[must_use]
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    #[must_use]
    pub fn keys<K: Into<PrimaryKey>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}
