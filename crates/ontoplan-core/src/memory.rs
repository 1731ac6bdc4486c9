//! In-process graph store implementing [`GraphQueryPort`].
//!
//! Holds a list of triples and evaluates the query IR directly: triple
//! patterns by scan, path patterns by depth-first search over simple paths.
//! Node and literal objects compare by their string value.

use crate::config::AnalyzerConfig;
use crate::error::{Error, QueryError};
use crate::port::GraphQueryPort;
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use ontoplan_proto::{
    Binding, BindingValue, DependencyEdge, GraphQuery, Pattern, QueryFilter, RelationPath, Term,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// An entity declared in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_level: Option<String>,
}

/// JSON form of an ontology graph.
///
/// `triples` carries anything else as `[subject, predicate, literal]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSnapshot {
    pub entities: Vec<EntityRecord>,
    pub edges: Vec<DependencyEdge>,
    pub triples: Vec<[String; 3]>,
}

impl GraphSnapshot {
    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone)]
struct Triple {
    subject: String,
    predicate: String,
    object: BindingValue,
}

impl Triple {
    fn object_str(&self) -> &str {
        self.object.as_str().unwrap_or_default()
    }
}

/// An in-memory ontology graph.
#[derive(Debug)]
pub struct MemoryGraph {
    triples: Vec<Triple>,
    type_predicate: String,
    entity_class: String,
    impact_level_predicate: String,
    queries: AtomicU64,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// Create an empty graph using the default vocabulary.
    pub fn new() -> Self {
        Self::with_vocabulary(&AnalyzerConfig::default())
    }

    /// Create an empty graph that declares entities with the configured vocabulary.
    pub fn with_vocabulary(config: &AnalyzerConfig) -> Self {
        Self {
            triples: Vec::new(),
            type_predicate: config.type_predicate.clone(),
            entity_class: config.entity_class.clone(),
            impact_level_predicate: config.impact_level_predicate.clone(),
            queries: AtomicU64::new(0),
        }
    }

    /// Build a graph from a snapshot.
    pub fn from_snapshot(snapshot: &GraphSnapshot, config: &AnalyzerConfig) -> Self {
        let mut graph = Self::with_vocabulary(config);
        for entity in &snapshot.entities {
            graph.add_entity(&entity.id);
            if let Some(level) = &entity.impact_level {
                graph.set_impact_level(&entity.id, level);
            }
        }
        for edge in &snapshot.edges {
            graph.add_edge(&edge.source, &edge.relation_kind, &edge.target);
        }
        for [s, p, o] in &snapshot.triples {
            graph.add_literal(s, p, o);
        }
        graph
    }

    /// Declare an entity.
    pub fn add_entity(&mut self, id: &str) -> &mut Self {
        let class = BindingValue::Node(self.entity_class.clone());
        let predicate = self.type_predicate.clone();
        self.push(id, &predicate, class)
    }

    /// Tag a node with an impact level.
    pub fn set_impact_level(&mut self, id: &str, level: &str) -> &mut Self {
        let predicate = self.impact_level_predicate.clone();
        self.push(id, &predicate, BindingValue::Literal(level.to_string()))
    }

    /// Add `source relation target`, meaning source depends on target.
    pub fn add_edge(&mut self, source: &str, relation: &str, target: &str) -> &mut Self {
        self.push(source, relation, BindingValue::Node(target.to_string()))
    }

    /// Add a triple with a literal object.
    pub fn add_literal(&mut self, subject: &str, predicate: &str, value: &str) -> &mut Self {
        self.push(subject, predicate, BindingValue::Literal(value.to_string()))
    }

    fn push(&mut self, subject: &str, predicate: &str, object: BindingValue) -> &mut Self {
        let duplicate = self
            .triples
            .iter()
            .any(|t| t.subject == subject && t.predicate == predicate && t.object == object);
        if !duplicate {
            self.triples.push(Triple {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                object,
            });
        }
        self
    }

    /// Number of stored triples.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the graph holds no triples.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Number of queries evaluated so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Evaluate a query synchronously.
    pub fn evaluate(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut rows = self.solve(&query.patterns, vec![Binding::new()])?;
        for filter in &query.filters {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if self.passes(filter, &row)? {
                    kept.push(row);
                }
            }
            rows = kept;
        }

        if let Some(group) = &query.aggregate {
            let mut groups: IndexMap<BindingValue, IndexSet<BindingValue>> = IndexMap::new();
            for row in &rows {
                let (Some(key), Some(counted)) = (row.get(&group.group_var), row.get(&group.counted_var))
                else {
                    continue;
                };
                groups.entry(key.clone()).or_default().insert(counted.clone());
            }
            rows = groups
                .into_iter()
                .map(|(key, counted)| {
                    let mut row = Binding::new();
                    row.insert(group.group_var.clone(), key);
                    row.insert(
                        group.count_var.clone(),
                        BindingValue::Literal(counted.len().to_string()),
                    );
                    row
                })
                .collect();
        }

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|var| compare_values(a.get(var), b.get(var)))
                    .find(|o| *o != CmpOrdering::Equal)
                    .unwrap_or(CmpOrdering::Equal)
            });
        }

        if !query.select.is_empty() {
            for row in &mut rows {
                row.retain(|var, _| query.select.iter().any(|s| s == var));
            }
        }

        if query.distinct {
            let mut seen = BTreeSet::new();
            rows.retain(|row| seen.insert(row.clone()));
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    fn solve(&self, patterns: &[Pattern], seeds: Vec<Binding>) -> Result<Vec<Binding>, QueryError> {
        let mut rows = seeds;
        for pattern in patterns {
            let mut next = Vec::new();
            for row in &rows {
                match pattern {
                    Pattern::Triple {
                        subject,
                        predicate,
                        object,
                    } => self.match_triple(row, subject, predicate, object, &mut next),
                    Pattern::Path {
                        subject,
                        path,
                        object,
                        path_var,
                    } => self.match_path(row, subject, path, object, path_var.as_deref(), &mut next)?,
                }
            }
            rows = next;
        }
        Ok(rows)
    }

    fn match_triple(
        &self,
        row: &Binding,
        subject: &Term,
        predicate: &Term,
        object: &Term,
        out: &mut Vec<Binding>,
    ) {
        for triple in &self.triples {
            let mut candidate = row.clone();
            let matched = bind(&mut candidate, subject, BindingValue::Node(triple.subject.clone()))
                && bind(&mut candidate, predicate, BindingValue::Node(triple.predicate.clone()))
                && bind(&mut candidate, object, triple.object.clone());
            if matched {
                out.push(candidate);
            }
        }
    }

    fn match_path(
        &self,
        row: &Binding,
        subject: &Term,
        path: &RelationPath,
        object: &Term,
        path_var: Option<&str>,
        out: &mut Vec<Binding>,
    ) -> Result<(), QueryError> {
        if path.relations.is_empty() {
            return Err(QueryError::Unsupported("path pattern without relations".into()));
        }
        if path.min_hops == 0 || path.min_hops > path.max_hops {
            return Err(QueryError::Unsupported(format!(
                "path hop range {{{},{}}}",
                path.min_hops, path.max_hops
            )));
        }

        let adjacency = self.adjacency(&path.relations);
        let starts: Vec<String> = match resolve(row, subject) {
            Some(start) => vec![start],
            None => adjacency.keys().cloned().collect(),
        };

        for start in starts {
            let mut found: Vec<Vec<String>> = Vec::new();
            let mut stack = vec![start.clone()];
            walk(&adjacency, path, &mut stack, &mut found);

            let mut endpoints = BTreeSet::new();
            for nodes in found {
                let end = nodes.last().cloned().unwrap_or_default();
                if path_var.is_none() && !endpoints.insert(end.clone()) {
                    continue;
                }
                let mut candidate = row.clone();
                let mut matched = bind(&mut candidate, subject, BindingValue::Node(start.clone()))
                    && bind(&mut candidate, object, BindingValue::Node(end));
                if let Some(var) = path_var {
                    matched = matched && bind(&mut candidate, &Term::var(var), BindingValue::Path(nodes));
                }
                if matched {
                    out.push(candidate);
                }
            }
        }
        Ok(())
    }

    fn adjacency(&self, relations: &[String]) -> IndexMap<String, Vec<String>> {
        let mut adjacency: IndexMap<String, Vec<String>> = IndexMap::new();
        for triple in &self.triples {
            if !relations.iter().any(|r| *r == triple.predicate) {
                continue;
            }
            let targets = adjacency.entry(triple.subject.clone()).or_default();
            let target = triple.object_str().to_string();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        adjacency
    }

    fn passes(&self, filter: &QueryFilter, row: &Binding) -> Result<bool, QueryError> {
        Ok(match filter {
            QueryFilter::NotEqual { left, right } => match (row.get(left), row.get(right)) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            },
            QueryFilter::NotPrefix { var, prefix } => row
                .get(var)
                .and_then(BindingValue::as_str)
                .is_some_and(|v| !v.starts_with(prefix.as_str())),
            QueryFilter::NotExists { patterns } => {
                self.solve(patterns, vec![row.clone()])?.is_empty()
            }
        })
    }
}

/// Collect simple paths from the node at the top of `stack`.
///
/// A path may close back onto its first node; it does not continue past it.
fn walk(
    adjacency: &IndexMap<String, Vec<String>>,
    path: &RelationPath,
    stack: &mut Vec<String>,
    found: &mut Vec<Vec<String>>,
) {
    let hops = stack.len() - 1;
    if hops >= path.max_hops {
        return;
    }
    let Some(current) = stack.last().cloned() else {
        return;
    };
    let Some(targets) = adjacency.get(&current) else {
        return;
    };
    for target in targets {
        let closes = stack.first() == Some(target);
        if stack.contains(target) && !closes {
            continue;
        }
        stack.push(target.clone());
        if hops + 1 >= path.min_hops {
            found.push(stack.clone());
        }
        if !closes {
            walk(adjacency, path, stack, found);
        }
        stack.pop();
    }
}

/// Constant value of a term under a binding.
fn resolve(row: &Binding, term: &Term) -> Option<String> {
    match term {
        Term::Var(name) => row.get(name).and_then(BindingValue::as_str).map(str::to_string),
        Term::Node(v) | Term::Literal(v) => Some(v.clone()),
    }
}

/// Unify a term with a value, extending the binding for fresh variables.
fn bind(row: &mut Binding, term: &Term, value: BindingValue) -> bool {
    match term {
        Term::Var(name) => match row.get(name) {
            Some(existing) => existing.as_str() == value.as_str() && existing.as_path() == value.as_path(),
            None => {
                row.insert(name.clone(), value);
                true
            }
        },
        Term::Node(v) | Term::Literal(v) => value.as_str() == Some(v.as_str()),
    }
}

fn compare_values(a: Option<&BindingValue>, b: Option<&BindingValue>) -> CmpOrdering {
    match (a.and_then(BindingValue::as_count), b.and_then(BindingValue::as_count)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(&b),
    }
}

#[async_trait]
impl GraphQueryPort for MemoryGraph {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        self.evaluate(query)
    }
}
