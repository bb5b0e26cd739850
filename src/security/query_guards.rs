//! Query Guards
//!
//! Static checks on model-written SQL before it reaches the warehouse:
//! statement extraction from the raw reply, read-only enforcement and the
//! referenced-table check against the selection.

use crate::config::WarehouseDialect;
use crate::error::{QaError, Result};
use crate::schema::catalog::SchemaEntry;
use regex::Regex;
use sqlparser::ast::{Expr, Query, SetExpr, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect, RedshiftSqlDialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::OnceLock;
use tracing::warn;

pub struct QueryGuard {
    dialect: WarehouseDialect,
}

impl QueryGuard {
    pub fn new(dialect: WarehouseDialect) -> Self {
        Self { dialect }
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self.dialect {
            WarehouseDialect::Redshift => Box::new(RedshiftSqlDialect {}),
            WarehouseDialect::Postgres => Box::new(PostgreSqlDialect {}),
            WarehouseDialect::Generic => Box::new(GenericDialect {}),
        }
    }

    fn parse(&self, sql: &str) -> Option<Vec<Statement>> {
        let dialect = self.parser_dialect();
        Parser::parse_sql(dialect.as_ref(), sql)
            .ok()
            .filter(|statements| !statements.is_empty())
    }

    /// Pull the first parseable statement out of a model reply.
    ///
    /// A fenced code block wins over surrounding prose. Every line starting
    /// with `SELECT`/`WITH`/`(` is tried in order as a start; for each, the
    /// longest prefix of the following lines that parses is kept. Further
    /// statements are discarded.
    pub fn extract_statement(&self, reply: &str) -> Result<String> {
        let body = fenced_block(reply).unwrap_or(reply);
        let lines: Vec<&str> = body.lines().collect();

        let mut starts = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| starts_statement(line))
            .map(|(i, _)| i)
            .peekable();
        if starts.peek().is_none() {
            return Err(QaError::Synthesis("No SQL statement found in model output".to_string()));
        }

        for start in starts {
            if let Some(sql) = self.longest_parseable(&lines[start..]) {
                return Ok(sql);
            }
        }

        Err(QaError::Synthesis("Model output is not a parseable SQL statement".to_string()))
    }

    fn longest_parseable(&self, lines: &[&str]) -> Option<String> {
        for end in (1..=lines.len()).rev() {
            let candidate = lines[..end].join("\n");
            let Some(statements) = self.parse(&candidate) else {
                continue;
            };

            if statements.len() == 1 {
                return Some(candidate.trim().trim_end_matches(';').trim_end().to_string());
            }
            warn!(
                "Model output contains {} statements, keeping the first",
                statements.len()
            );
            return Some(statements[0].to_string());
        }
        None
    }

    /// Reject anything but a single read-only query
    pub fn ensure_read_only(&self, sql: &str) -> Result<()> {
        let statements = self
            .parse(sql)
            .ok_or_else(|| QaError::Synthesis("Query does not parse".to_string()))?;
        if statements.len() != 1 {
            return Err(QaError::Synthesis(format!(
                "Expected exactly one statement, found {}",
                statements.len()
            )));
        }

        let mut check = ReadOnlyCheck;
        match statements[0].visit(&mut check) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(what) => Err(QaError::Synthesis(format!(
                "Only read-only queries are allowed, found {}",
                what
            ))),
        }
    }

    /// Normalized name parts of every table the query reads, depth first,
    /// without duplicates. A single-part name is dropped when a CTE of that
    /// name is in scope where it is read.
    pub fn referenced_tables(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let statements = self
            .parse(sql)
            .ok_or_else(|| QaError::Synthesis("Query does not parse".to_string()))?;

        let mut relations = Vec::new();
        for statement in &statements {
            if let Statement::Query(query) = statement {
                collect_query(query, &[], &mut relations);
            }
        }

        let mut seen = HashSet::new();
        Ok(relations.into_iter().filter(|parts| seen.insert(parts.clone())).collect())
    }

    /// Every referenced table must name one of the selected tables
    pub fn check_references(&self, sql: &str, selection: &[SchemaEntry]) -> Result<()> {
        let unknown: Vec<String> = self
            .referenced_tables(sql)?
            .into_iter()
            .filter(|parts| !selection.iter().any(|entry| entry.matches_reference(parts)))
            .map(|parts| parts.join("."))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(QaError::Synthesis(format!(
                "Query references tables outside the selection: {}",
                unknown.join(", ")
            )))
        }
    }
}

fn fenced_block(reply: &str) -> Option<&str> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()?;
    fence
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|body| !body.trim().is_empty())
}

fn starts_statement(line: &str) -> bool {
    let line = line.trim_start().to_ascii_uppercase();
    line.starts_with("SELECT") || line.starts_with("WITH") || line.starts_with('(')
}

fn query_selects_into(query: &Query) -> bool {
    let in_ctes = query
        .with
        .as_ref()
        .map_or(false, |with| with.cte_tables.iter().any(|cte| query_selects_into(&cte.query)));
    in_ctes || selects_into(&query.body)
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => query_selects_into(query),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

struct ReadOnlyCheck;

impl Visitor for ReadOnlyCheck {
    type Break = String;

    // Also fires for statements nested in a query body (INSERT/UPDATE in a CTE)
    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Query(query) if query_selects_into(query) => {
                ControlFlow::Break("SELECT INTO".to_string())
            }
            Statement::Query(_) => ControlFlow::Continue(()),
            other => {
                let text = other.to_string();
                let keyword = text.split_whitespace().next().unwrap_or("statement").to_uppercase();
                ControlFlow::Break(keyword)
            }
        }
    }
}

/// Collect the relations of one query with its own CTE names in scope.
///
/// CTE bodies see every name of their WITH clause (recursive CTEs refer to
/// themselves). Nested queries are walked after the current level.
fn collect_query(query: &Query, outer_ctes: &[String], relations: &mut Vec<Vec<String>>) {
    let mut scope = outer_ctes.to_vec();
    if let Some(ref with) = query.with {
        scope.extend(with.cte_tables.iter().map(|cte| cte.alias.name.value.to_lowercase()));
        for cte in &with.cte_tables {
            collect_query(&cte.query, &scope, relations);
        }
    }

    let mut level = LevelCollector::default();
    collect_set_expr(&query.body, &scope, &mut level, relations);
    let _ = query.order_by.visit(&mut level);
    let _ = query.limit.visit(&mut level);
    let _ = query.offset.visit(&mut level);
    finish_level(level, &scope, relations);
}

fn collect_set_expr(
    body: &SetExpr,
    scope: &[String],
    level: &mut LevelCollector,
    relations: &mut Vec<Vec<String>>,
) {
    match body {
        SetExpr::Query(query) => collect_query(query, scope, relations),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, scope, level, relations);
            collect_set_expr(right, scope, level, relations);
        }
        other => {
            let _ = other.visit(level);
        }
    }
}

fn finish_level(level: LevelCollector, scope: &[String], relations: &mut Vec<Vec<String>>) {
    relations.extend(
        level
            .relations
            .into_iter()
            .filter(|parts| !(parts.len() == 1 && scope.contains(&parts[0]))),
    );
    for nested in &level.nested {
        collect_query(nested, scope, relations);
    }
}

/// Relations read directly by one query level; subqueries (derived tables
/// and expression subqueries) are set aside for their own scope.
#[derive(Default)]
struct LevelCollector {
    depth: usize,
    relations: Vec<Vec<String>>,
    nested: Vec<Query>,
}

fn expr_subquery(expr: &Expr) -> Option<&Query> {
    match expr {
        Expr::Subquery(query) | Expr::ArraySubquery(query) => Some(&**query),
        Expr::InSubquery { subquery, .. } | Expr::Exists { subquery, .. } => Some(&**subquery),
        _ => None,
    }
}

impl Visitor for LevelCollector {
    type Break = ();

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            // Table functions (generate_series(...)) are not relations
            TableFactor::Table { name, args: None, .. } if self.depth == 0 => {
                self.relations
                    .push(name.0.iter().map(|ident| ident.value.to_lowercase()).collect());
            }
            TableFactor::Derived { subquery, .. } => {
                if self.depth == 0 {
                    self.nested.push((**subquery).clone());
                }
                self.depth += 1;
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn post_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if matches!(table_factor, TableFactor::Derived { .. }) {
            self.depth -= 1;
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Some(query) = expr_subquery(expr) {
            if self.depth == 0 {
                self.nested.push(query.clone());
            }
            self.depth += 1;
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if expr_subquery(expr).is_some() {
            self.depth -= 1;
        }
        ControlFlow::Continue(())
    }
}
