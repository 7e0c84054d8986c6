//! Include directive tree.
//!
//! Built once per request from flat relation paths such as
//! `"comments.author"`, validated against the [`Schema`], then read-only.
//! The root node has no relation name and stands for the primary type.

use crate::identity::ResourceType;
use crate::relation::Schema;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("segment pattern is a valid regex")
});

/// Why an include directive could not be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    /// Primary type is not registered in the schema
    UnknownResourceType(ResourceType),
    /// Empty or malformed path segment
    InvalidPath(String),
    /// Relation does not exist on the type reached so far
    UnknownRelation {
        resource_type: ResourceType,
        relation: String,
        path: String,
    },
    /// Relation targets a remote source and remote includes are disabled
    RemoteNotAllowed {
        resource_type: ResourceType,
        relation: String,
        path: String,
    },
    /// Path is nested deeper than the configured maximum
    TooDeep { path: String, max_depth: usize },
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveError::UnknownResourceType(t) => write!(f, "Unknown resource type: {t}"),
            DirectiveError::InvalidPath(path) => write!(f, "Invalid include path: {path:?}"),
            DirectiveError::UnknownRelation {
                resource_type,
                relation,
                path,
            } => write!(
                f,
                "{relation} is not a valid includable relationship of {resource_type} (in {path})"
            ),
            DirectiveError::RemoteNotAllowed {
                resource_type,
                relation,
                path,
            } => write!(
                f,
                "{relation} on {resource_type} is a remote relationship \
                 and remote includes are not allowed (in {path})"
            ),
            DirectiveError::TooDeep { path, max_depth } => {
                write!(f, "Include path {path} exceeds the maximum depth of {max_depth}")
            }
        }
    }
}

impl std::error::Error for DirectiveError {}

/// Build policy for [`IncludeDirective::build`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeOptions {
    pub allow_remote_includes: bool,
    pub max_depth: usize,
}

impl Default for IncludeOptions {
    fn default() -> Self {
        Self {
            allow_remote_includes: false,
            max_depth: 8,
        }
    }
}

/// One node of the include tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    relation: Option<String>,
    resource_types: Vec<ResourceType>,
    allow_remote: bool,
    children: BTreeMap<String, IncludeDirective>,
}

impl IncludeDirective {
    /// Tree with no includes for the given primary type
    pub fn root(primary: impl Into<ResourceType>) -> Self {
        Self::root_for(vec![primary.into()], false)
    }

    fn root_for(resource_types: Vec<ResourceType>, allow_remote: bool) -> Self {
        Self {
            relation: None,
            resource_types,
            allow_remote,
            children: BTreeMap::new(),
        }
    }

    /// Build and validate a tree from relation paths.
    ///
    /// Segments are separated by `.` or `/`. Every segment must name a
    /// relation on (one of) the type(s) reached so far; the first bad segment
    /// fails the whole build.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveError`] for malformed paths, unknown relations,
    /// remote relations when `allow_remote_includes` is off, or paths deeper
    /// than `max_depth`.
    pub fn build<P: AsRef<str>>(
        schema: &Schema,
        primary: &ResourceType,
        paths: &[P],
        options: IncludeOptions,
    ) -> Result<Self, DirectiveError> {
        Self::build_for(schema, std::slice::from_ref(primary), paths, options)
    }

    /// Like [`build`](Self::build) but rooted at several candidate types, as
    /// when the primary records come from a polymorphic relation.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_for<P: AsRef<str>>(
        schema: &Schema,
        roots: &[ResourceType],
        paths: &[P],
        options: IncludeOptions,
    ) -> Result<Self, DirectiveError> {
        for root in roots {
            if !schema.contains(root) {
                return Err(DirectiveError::UnknownResourceType(root.clone()));
            }
        }

        let mut tree = Self::root_for(roots.to_vec(), options.allow_remote_includes);
        for path in paths {
            let path = path.as_ref().trim();
            if path.is_empty() {
                continue;
            }
            tree.add_path(schema, path, options)?;
        }
        Ok(tree)
    }

    /// Build from a comma-separated include parameter (`"comments.author,tags"`).
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn parse(
        schema: &Schema,
        primary: &ResourceType,
        include: &str,
        options: IncludeOptions,
    ) -> Result<Self, DirectiveError> {
        let paths: Vec<&str> = include.split(',').collect();
        Self::build(schema, primary, &paths, options)
    }

    fn add_path(
        &mut self,
        schema: &Schema,
        path: &str,
        options: IncludeOptions,
    ) -> Result<(), DirectiveError> {
        let segments: Vec<&str> = path.split(['.', '/']).collect();
        if segments.len() > options.max_depth {
            return Err(DirectiveError::TooDeep {
                path: path.to_string(),
                max_depth: options.max_depth,
            });
        }

        let mut node = self;
        for segment in segments {
            if !SEGMENT.is_match(segment) {
                return Err(DirectiveError::InvalidPath(path.to_string()));
            }

            // Collect the relation across every type reachable at this node
            let mut targets: Vec<ResourceType> = Vec::new();
            let mut remote = false;
            for owner in &node.resource_types {
                if let Some(def) = schema.relation(owner, segment) {
                    remote |= def.remote;
                    for target in def.target.types() {
                        if !targets.contains(target) {
                            targets.push(target.clone());
                        }
                    }
                }
            }

            if targets.is_empty() {
                return Err(DirectiveError::UnknownRelation {
                    resource_type: node.describe_types(),
                    relation: segment.to_string(),
                    path: path.to_string(),
                });
            }
            if remote && !options.allow_remote_includes {
                return Err(DirectiveError::RemoteNotAllowed {
                    resource_type: node.describe_types(),
                    relation: segment.to_string(),
                    path: path.to_string(),
                });
            }

            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| IncludeDirective {
                    relation: Some(segment.to_string()),
                    resource_types: targets,
                    allow_remote: options.allow_remote_includes,
                    children: BTreeMap::new(),
                });
        }
        Ok(())
    }

    fn describe_types(&self) -> ResourceType {
        match self.resource_types.as_slice() {
            [single] => single.clone(),
            many => {
                let names: Vec<&str> = many.iter().map(ResourceType::as_str).collect();
                ResourceType::new(names.join("|"))
            }
        }
    }

    /// Relation name of this node; `None` for the root
    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }

    /// Types the records at this node may have
    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    /// Whether crossing into a remote source is permitted below this node
    pub fn allow_remote(&self) -> bool {
        self.allow_remote
    }

    /// Child directive for a relation loaded at this level
    pub fn children_for(&self, relation: &str) -> Option<&IncludeDirective> {
        self.children.get(relation)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &IncludeDirective)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Nesting depth below this node (0 for a leaf)
    pub fn depth(&self) -> usize {
        self.children.values().map(|c| c.depth() + 1).max().unwrap_or(0)
    }

    /// Flattened dot paths of every leaf, in tree order
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, child) in &self.children {
            if child.is_leaf() {
                out.push(name.clone());
            } else {
                out.extend(child.paths().into_iter().map(|p| format!("{name}.{p}")));
            }
        }
        out
    }
}
