//! Collect the names a statement refers to and resolve them against the schema.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;

use query_engine_metadata::metadata::{SchemaSnapshot, TableInfo};
use sqlparser::ast::{
    Expr, Ident, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
    Visit, Visitor,
};

/// Everything in a statement that names something.
#[derive(Debug, Default)]
pub(crate) struct References {
    /// Tables and CTEs read from.
    pub relations: Vec<ObjectName>,
    pub cte_names: HashSet<String>,
    /// alias -> aliased table, or `None` for derived tables
    pub table_aliases: HashMap<String, Option<String>>,
    /// Output names introduced by the statement itself.
    pub column_aliases: HashSet<String>,
    pub columns: Vec<Vec<Ident>>,
    pub wildcard_qualifiers: Vec<ObjectName>,
    pub functions: Vec<String>,
    pub locking: bool,
    pub select_into: bool,
    /// Statements found inside the root statement.
    pub nested_statements: Vec<String>,
    statements_seen: usize,
}

impl References {
    pub(crate) fn collect(statement: &Statement) -> Self {
        let mut references = References::default();
        let _ = statement.visit(&mut references);
        references
    }

    fn visit_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    self.select_into = true;
                }
                for item in &select.projection {
                    match item {
                        SelectItem::ExprWithAlias { alias, .. } => {
                            self.column_aliases.insert(normalize(alias));
                        }
                        SelectItem::QualifiedWildcard(name, _) => {
                            self.wildcard_qualifiers.push(name.clone());
                        }
                        SelectItem::UnnamedExpr(_) | SelectItem::Wildcard(_) => {}
                    }
                }
                for table in &select.from {
                    self.visit_table_with_joins(table);
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            // nested queries are visited on their own
            _ => {}
        }
    }

    fn visit_table_with_joins(&mut self, table: &TableWithJoins) {
        self.visit_table_factor(&table.relation);
        for join in &table.joins {
            self.visit_table_factor(&join.relation);
        }
    }

    fn visit_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table {
                name,
                alias: Some(alias),
                ..
            } => {
                let table = name.0.last().map(normalize);
                self.table_aliases.insert(normalize(&alias.name), table);
                self.column_aliases
                    .extend(alias.columns.iter().map(normalize));
            }
            TableFactor::Derived {
                alias: Some(alias), ..
            } => {
                self.table_aliases.insert(normalize(&alias.name), None);
                self.column_aliases
                    .extend(alias.columns.iter().map(normalize));
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {}
        }
    }
}

impl Visitor for References {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_names.insert(normalize(&cte.alias.name));
                self.column_aliases
                    .extend(cte.alias.columns.iter().map(normalize));
            }
        }
        if !query.locks.is_empty() {
            self.locking = true;
        }
        self.visit_set_expr(&query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push(relation.clone());
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.columns.push(vec![ident.clone()]),
            Expr::CompoundIdentifier(idents) => self.columns.push(idents.clone()),
            Expr::Function(function) => {
                if let Some(name) = function.name.0.last() {
                    self.functions.push(normalize(name));
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        self.statements_seen += 1;
        if self.statements_seen > 1 && !matches!(statement, Statement::Query(_)) {
            self.nested_statements.push(statement_keyword(statement));
        }
        ControlFlow::Continue(())
    }
}

/// What a qualifier such as `r` in `r.rental_date` stands for.
enum Qualifier<'a> {
    Table(&'a TableInfo),
    /// A CTE or a derived table, whose columns are not in the schema.
    Opaque,
}

/// Resolve every table and column reference. Returns the names that could not
/// be resolved, without duplicates, in the order they first appear.
pub(crate) fn unknown_identifiers(
    references: &References,
    schema: &SchemaSnapshot,
) -> Vec<String> {
    let mut unknown = Vec::new();
    let mut seen = BTreeSet::new();
    let mut report = |name: String| {
        if seen.insert(name.clone()) {
            unknown.push(name);
        }
    };

    let mut tables: Vec<&TableInfo> = Vec::new();
    let mut qualifiers: HashMap<String, Qualifier<'_>> = HashMap::new();

    for cte in &references.cte_names {
        qualifiers.insert(cte.clone(), Qualifier::Opaque);
    }
    for relation in &references.relations {
        let Some(name) = relation.0.last().map(normalize) else {
            continue;
        };
        if references.cte_names.contains(&name) {
            continue;
        }
        let schema_part = relation
            .0
            .len()
            .checked_sub(2)
            .map(|index| normalize(&relation.0[index]));
        match schema.table(&name) {
            Some(table)
                if schema_part
                    .as_ref()
                    .map_or(true, |part| *part == normalize_str(&table.schema_name)) =>
            {
                tables.push(table);
                qualifiers.insert(name, Qualifier::Table(table));
            }
            _ => report(format!("table `{relation}`")),
        }
    }
    for (alias, table) in &references.table_aliases {
        let qualifier = match table.as_deref().and_then(|table| schema.table(table)) {
            Some(table) if !references.cte_names.contains(&normalize_str(&table.table_name)) => {
                Qualifier::Table(table)
            }
            _ => Qualifier::Opaque,
        };
        qualifiers.insert(alias.clone(), qualifier);
    }

    let known_anywhere = |column: &str| {
        references.column_aliases.contains(column)
            || tables.iter().any(|table| table.column(column).is_some())
    };

    for path in &references.columns {
        let Some(column) = path.last() else {
            continue;
        };
        let column_name = normalize(column);
        if path.len() == 1 {
            if !known_anywhere(&column_name) {
                report(format!("column `{column}`"));
            }
            continue;
        }

        let qualifier = &path[path.len() - 2];
        match qualifiers.get(&normalize(qualifier)) {
            Some(Qualifier::Table(table)) => {
                if table.column(&column_name).is_none() {
                    report(format!("column `{qualifier}.{column}`"));
                }
            }
            Some(Qualifier::Opaque) => {
                if !known_anywhere(&column_name) {
                    report(format!("column `{qualifier}.{column}`"));
                }
            }
            None => report(format!("table or alias `{qualifier}`")),
        }
    }

    for wildcard in &references.wildcard_qualifiers {
        if let Some(qualifier) = wildcard.0.last() {
            if !qualifiers.contains_key(&normalize(qualifier)) {
                report(format!("table or alias `{qualifier}`"));
            }
        }
    }

    unknown
}

/// The leading keyword of a statement, used to name it in rejections.
pub(crate) fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn normalize(ident: &Ident) -> String {
    normalize_str(&ident.value)
}

fn normalize_str(name: &str) -> String {
    name.to_lowercase()
}
