//! Query IR types for ontology graph queries.
//!
//! Queries are built from triple patterns and bounded relation paths over
//! variables, then handed to a graph query port. The IR is backend-neutral;
//! [`GraphQuery::to_sparql`](crate::sparql) renders it for SPARQL stores.

use serde::{Deserialize, Serialize};

/// A position in a pattern: a variable or a constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Term {
    /// A variable, bound by the query engine.
    Var(String),
    /// A graph node identifier.
    Node(String),
    /// A literal value.
    Literal(String),
}

impl Term {
    /// Create a variable term.
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    /// Create a node term.
    pub fn node(id: impl Into<String>) -> Self {
        Term::Node(id.into())
    }

    /// Create a literal term.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    /// Variable name, if this term is a variable.
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }
}

/// A one-or-more-hops traversal over a set of relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationPath {
    /// Relations that may be followed at each hop.
    pub relations: Vec<String>,
    /// Minimum number of hops (at least 1).
    pub min_hops: usize,
    /// Maximum number of hops.
    pub max_hops: usize,
}

impl RelationPath {
    /// A path of 1..=max_hops over the given relations.
    pub fn bounded(relations: Vec<String>, max_hops: usize) -> Self {
        Self {
            relations,
            min_hops: 1,
            max_hops: max_hops.max(1),
        }
    }

    /// A single hop over any of the given relations.
    pub fn single_hop(relations: Vec<String>) -> Self {
        Self::bounded(relations, 1)
    }
}

/// A graph pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum Pattern {
    /// `subject predicate object`.
    Triple {
        subject: Term,
        predicate: Term,
        object: Term,
    },
    /// `subject path object`, optionally binding the traversed node sequence.
    Path {
        subject: Term,
        path: RelationPath,
        object: Term,
        /// Variable receiving the node sequence (endpoints included).
        path_var: Option<String>,
    },
}

impl Pattern {
    /// Create a triple pattern.
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Self {
        Pattern::Triple {
            subject,
            predicate,
            object,
        }
    }

    /// Create a path pattern without a path variable.
    pub fn path(subject: Term, path: RelationPath, object: Term) -> Self {
        Pattern::Path {
            subject,
            path,
            object,
            path_var: None,
        }
    }

    /// Create a path pattern that binds the traversed nodes to `path_var`.
    pub fn path_bound(
        subject: Term,
        path: RelationPath,
        object: Term,
        path_var: impl Into<String>,
    ) -> Self {
        Pattern::Path {
            subject,
            path,
            object,
            path_var: Some(path_var.into()),
        }
    }
}

/// Filters applied to candidate bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Two variables must be bound to different values.
    NotEqual { left: String, right: String },
    /// The variable's value must not start with `prefix`.
    NotPrefix { var: String, prefix: String },
    /// None of the patterns may match under the current binding.
    NotExists { patterns: Vec<Pattern> },
}

/// Grouped count aggregation (`GROUP BY group_var`, `COUNT(DISTINCT counted_var)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupCount {
    /// Variable to group by.
    pub group_var: String,
    /// Variable whose distinct values are counted.
    pub counted_var: String,
    /// Output variable holding the count.
    pub count_var: String,
}

/// A complete graph query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Variables to project. Empty projects every bound variable.
    pub select: Vec<String>,
    /// Patterns that must all match.
    pub patterns: Vec<Pattern>,
    /// Filters over the matched bindings.
    pub filters: Vec<QueryFilter>,
    /// Optional grouped count.
    pub aggregate: Option<GroupCount>,
    /// Remove duplicate result rows.
    pub distinct: bool,
    /// Variables to order by (ascending).
    pub order_by: Vec<String>,
    /// Maximum number of result rows.
    pub limit: Option<usize>,
}

impl GraphQuery {
    /// Create a query projecting the given variables.
    pub fn select<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: vars.into_iter().map(Into::into).collect(),
            patterns: vec![],
            filters: vec![],
            aggregate: None,
            distinct: false,
            order_by: vec![],
            limit: None,
        }
    }

    /// Add a pattern.
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Add a filter.
    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Set a grouped count aggregation.
    pub fn with_group_count(
        mut self,
        group_var: impl Into<String>,
        counted_var: impl Into<String>,
        count_var: impl Into<String>,
    ) -> Self {
        self.aggregate = Some(GroupCount {
            group_var: group_var.into(),
            counted_var: counted_var.into(),
            count_var: count_var.into(),
        });
        self
    }

    /// Remove duplicate rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Order results by a variable.
    pub fn order_by(mut self, var: impl Into<String>) -> Self {
        self.order_by.push(var.into());
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Variables mentioned anywhere in the patterns, in first-seen order.
    pub fn pattern_vars(&self) -> Vec<&str> {
        fn push<'a>(v: &'a str, vars: &mut Vec<&'a str>) {
            if !vars.contains(&v) {
                vars.push(v);
            }
        }

        let mut vars: Vec<&str> = Vec::new();
        for pattern in &self.patterns {
            match pattern {
                Pattern::Triple {
                    subject,
                    predicate,
                    object,
                } => {
                    for term in [subject, predicate, object] {
                        if let Some(v) = term.as_var() {
                            push(v, &mut vars);
                        }
                    }
                }
                Pattern::Path {
                    subject,
                    object,
                    path_var,
                    ..
                } => {
                    for term in [subject, object] {
                        if let Some(v) = term.as_var() {
                            push(v, &mut vars);
                        }
                    }
                    if let Some(v) = path_var {
                        push(v, &mut vars);
                    }
                }
            }
        }
        vars
    }
}
