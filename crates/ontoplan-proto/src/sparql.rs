//! SPARQL rendering of the query IR.
//!
//! Path variables have no SPARQL equivalent; stores that can report traversed
//! nodes receive the IR directly, and the rendered text notes the variable in a
//! trailing comment.

use crate::query::{GraphQuery, Pattern, QueryFilter, RelationPath, Term};
use std::fmt::Write;

impl GraphQuery {
    /// Render this query as SPARQL text.
    pub fn to_sparql(&self) -> String {
        let mut out = String::new();

        out.push_str("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }
        match &self.aggregate {
            Some(agg) => {
                let _ = write!(
                    out,
                    "?{} (COUNT(DISTINCT ?{}) AS ?{})",
                    agg.group_var, agg.counted_var, agg.count_var
                );
            }
            None if self.select.is_empty() => out.push('*'),
            None => {
                let vars: Vec<String> = self.select.iter().map(|v| format!("?{}", v)).collect();
                out.push_str(&vars.join(" "));
            }
        }

        out.push_str(" WHERE {\n");
        for pattern in &self.patterns {
            let _ = writeln!(out, "  {} .", render_pattern(pattern));
        }
        for filter in &self.filters {
            let _ = writeln!(out, "  {}", render_filter(filter));
        }
        out.push('}');

        if let Some(agg) = &self.aggregate {
            let _ = write!(out, "\nGROUP BY ?{}", agg.group_var);
        }
        if !self.order_by.is_empty() {
            let vars: Vec<String> = self.order_by.iter().map(|v| format!("?{}", v)).collect();
            let _ = write!(out, "\nORDER BY {}", vars.join(" "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(out, "\nLIMIT {}", limit);
        }

        let path_vars: Vec<&str> = self
            .patterns
            .iter()
            .filter_map(|p| match p {
                Pattern::Path { path_var, .. } => path_var.as_deref(),
                _ => None,
            })
            .collect();
        if !path_vars.is_empty() {
            let _ = write!(out, "\n# path bindings: ?{}", path_vars.join(" ?"));
        }

        out
    }
}

fn render_term(term: &Term) -> String {
    match term {
        Term::Var(name) => format!("?{}", name),
        Term::Node(id) => format!("<{}>", id),
        Term::Literal(value) => format!("\"{}\"", escape_literal(value)),
    }
}

fn render_path(path: &RelationPath) -> String {
    let alternatives: Vec<String> = path.relations.iter().map(|r| format!("<{}>", r)).collect();
    let body = if alternatives.len() == 1 {
        alternatives[0].clone()
    } else {
        format!("({})", alternatives.join("|"))
    };

    if path.min_hops == 1 && path.max_hops == 1 {
        body
    } else {
        format!("{}{{{},{}}}", body, path.min_hops, path.max_hops)
    }
}

fn render_pattern(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Triple {
            subject,
            predicate,
            object,
        } => format!(
            "{} {} {}",
            render_term(subject),
            render_term(predicate),
            render_term(object)
        ),
        Pattern::Path {
            subject,
            path,
            object,
            ..
        } => format!(
            "{} {} {}",
            render_term(subject),
            render_path(path),
            render_term(object)
        ),
    }
}

fn render_filter(filter: &QueryFilter) -> String {
    match filter {
        QueryFilter::NotEqual { left, right } => format!("FILTER(?{} != ?{})", left, right),
        QueryFilter::NotPrefix { var, prefix } => format!(
            "FILTER(!STRSTARTS(STR(?{}), \"{}\"))",
            var,
            escape_literal(prefix)
        ),
        QueryFilter::NotExists { patterns } => {
            let inner: Vec<String> = patterns.iter().map(render_pattern).collect();
            format!("FILTER NOT EXISTS {{ {} }}", inner.join(" . "))
        }
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
