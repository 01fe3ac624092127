use super::Dialect;
use crate::clause::{Clause, ClauseKind, ClauseList};
use crate::metadata::{ColumnMetadata, TableMetadata};
use crate::value::Value;

/// Clause tokens folded into the pieces a statement is assembled from.
#[derive(Debug, Default)]
pub(crate) struct Parts<'a> {
    pub raw: Option<&'a Clause>,
    pub limit: Option<(u64, u64)>,
    pub top: Option<u64>,
    pub cols: Option<Vec<String>>,
    pub omit: Vec<String>,
    pub table: Option<&'a str>,
    pub nolock: bool,
    pub order_by: Vec<&'a str>,
    pub filters: Vec<&'a Clause>,
}

impl<'a> Parts<'a> {
    pub fn collect(clauses: &'a ClauseList) -> Self {
        let mut parts = Parts::default();
        for clause in clauses.sorted() {
            match clause.kind {
                ClauseKind::RawQuery => {
                    if parts.raw.is_none() {
                        parts.raw = Some(clause);
                    }
                }
                ClauseKind::Limit => {
                    let skip = clause.args.first().and_then(Value::as_u64).unwrap_or(0);
                    let size = clause.args.get(1).and_then(Value::as_u64).unwrap_or(0);
                    parts.limit = Some((skip, size));
                }
                ClauseKind::Top => {
                    if parts.top.is_none() {
                        parts.top = clause.args.first().and_then(Value::as_u64);
                    }
                }
                // A later column list replaces an earlier one.
                ClauseKind::Cols => parts.cols = Some(clause.names()),
                ClauseKind::Omit => parts.omit.extend(clause.names()),
                ClauseKind::Table => parts.table = Some(clause.fragment.trim()),
                ClauseKind::UnlockTable => parts.nolock = true,
                ClauseKind::OrderBy => {
                    let order = clause.fragment.trim();
                    if !order.is_empty() {
                        parts.order_by.push(order);
                    }
                }
                _ => parts.filters.push(clause),
            }
        }
        parts
    }

    pub fn order_by(&self) -> Option<String> {
        if self.order_by.is_empty() {
            None
        } else {
            Some(self.order_by.join(","))
        }
    }
}

pub(crate) fn table_name<E>(dialect: Dialect, table: &TableMetadata<E>, parts: &Parts<'_>) -> String {
    dialect.quote(parts.table.unwrap_or(table.name()))
}

/// Select list: an explicit `cols` list in its own order, otherwise every
/// readable column minus `omit`. Names unknown to the table pass through
/// unquoted so expressions like `count(*)` survive.
pub(crate) fn projection<E>(dialect: Dialect, table: &TableMetadata<E>, parts: &Parts<'_>) -> String {
    let names: Vec<String> = match &parts.cols {
        Some(cols) => cols
            .iter()
            .map(|name| match table.column(name) {
                Some(column) => dialect.quote(&column.name),
                None => name.clone(),
            })
            .collect(),
        None => table
            .columns()
            .iter()
            .filter(|c| c.access.readable() && !parts.omit.contains(&c.key()))
            .map(|c| dialect.quote(&c.name))
            .collect(),
    };
    if names.is_empty() {
        "*".to_string()
    } else {
        names.join(",")
    }
}

/// Columns an insert or update writes: writable, not auto-generated, then
/// narrowed by `cols` or `omit`.
pub(crate) fn write_columns<'t, E>(
    table: &'t TableMetadata<E>,
    parts: &Parts<'_>,
) -> Vec<&'t ColumnMetadata<E>> {
    table
        .columns()
        .iter()
        .filter(|c| c.access.writable() && !c.auto_increment)
        .filter(|c| match &parts.cols {
            Some(cols) => cols.contains(&c.key()),
            None => !parts.omit.contains(&c.key()),
        })
        .collect()
}

/// Where-clause text (with a leading space) and its arguments.
pub(crate) fn render_where<E>(
    dialect: Dialect,
    table: &TableMetadata<E>,
    filters: &[&Clause],
) -> (String, Vec<Value>) {
    let mut writer = WhereWriter::default();
    let pk = table
        .primary_key()
        .map(|c| dialect.quote(&c.name))
        .unwrap_or_default();

    for clause in filters {
        match clause.kind {
            ClauseKind::Id => writer.conjunct(&format!("{}=?", pk), &clause.args),
            ClauseKind::Where | ClauseKind::And => writer.conjunct(&clause.fragment, &clause.args),
            ClauseKind::Or => writer.disjunct(&clause.fragment, &clause.args),
            ClauseKind::In => {
                if !clause.args.is_empty() {
                    let text = format!("{} in ({})", clause.fragment, in_list(&clause.args));
                    writer.conjunct(&text, &[]);
                }
            }
            ClauseKind::OrIn => {
                if !clause.args.is_empty() {
                    let text = format!("{} in ({})", clause.fragment, in_list(&clause.args));
                    writer.disjunct(&text, &[]);
                }
            }
            ClauseKind::Between => {
                writer.conjunct(&format!("{} between ? and ?", clause.fragment), &clause.args)
            }
            ClauseKind::OrBetween => {
                writer.disjunct(&format!("{} between ? and ?", clause.fragment), &clause.args)
            }
            _ => {}
        }
    }
    (writer.sql, writer.args)
}

fn in_list(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_literal)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
struct WhereWriter {
    sql: String,
    args: Vec<Value>,
    opened: bool,
}

impl WhereWriter {
    fn open(&mut self) -> bool {
        let first = !self.opened;
        self.opened = true;
        first
    }

    fn conjunct(&mut self, text: &str, args: &[Value]) {
        let keyword = if self.open() { "where" } else { "and" };
        self.sql.push_str(&format!(" {} {}", keyword, text));
        self.args.extend_from_slice(args);
    }

    fn disjunct(&mut self, text: &str, args: &[Value]) {
        let keyword = if self.open() { "where" } else { "or" };
        self.sql.push_str(&format!(" {} ({})", keyword, text));
        self.args.extend_from_slice(args);
    }
}
