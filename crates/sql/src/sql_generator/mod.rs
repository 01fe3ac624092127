//! Statement generation.
//!
//! Generators are pure: `(table metadata, clause tokens)` in, `(sql, args)`
//! out, with `?` placeholders. Rendering differences between databases are
//! variants of [`Dialect`] rather than separate generator types. Only the
//! select shape differs enough to live in its own module per dialect.
//!
//! A raw-query token short-circuits select, count, update and delete: its
//! text and arguments are returned verbatim.

mod generic;
mod mssql;
mod render;

use crate::clause::ClauseList;
use crate::metadata::TableMetadata;
use crate::value::Value;
use render::Parts;
use shardline_error::Result;
use std::fmt;

/// Rendered SQL with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// True when the text carries a `where` or `limit`, i.e. it is not a
    /// plain table scan.
    pub fn is_bounded(&self) -> bool {
        let sql = self.sql.to_lowercase();
        sql.contains(" where ") || sql.contains(" limit ")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// SQL flavour a cluster speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Unquoted identifiers, `limit skip,size` paging.
    Generic,
    /// Bracket-quoted identifiers, `top n` projection, row-number paging and
    /// the `with(nolock)` hint.
    Mssql,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::Mssql => "mssql",
        }
    }

    /// Quote an identifier. Dotted names are quoted part by part and parts
    /// that are already bracketed are left alone.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Generic => ident.to_string(),
            Dialect::Mssql => ident
                .split('.')
                .map(|part| {
                    let part = part.trim();
                    if part.starts_with('[') && part.ends_with(']') {
                        part.to_string()
                    } else {
                        format!("[{}]", part)
                    }
                })
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    pub fn select<E>(&self, table: &TableMetadata<E>, clauses: &ClauseList) -> Statement {
        let parts = Parts::collect(clauses);
        let statement = match parts.raw {
            Some(raw) => Statement::new(raw.fragment.clone(), raw.args.clone()),
            None => match self {
                Dialect::Generic => generic::select(table, &parts),
                Dialect::Mssql => mssql::select(table, &parts),
            },
        };
        self.rendered("select", statement)
    }

    pub fn count<E>(&self, table: &TableMetadata<E>, clauses: &ClauseList) -> Statement {
        let parts = Parts::collect(clauses);
        let statement = match parts.raw {
            Some(raw) => Statement::new(raw.fragment.clone(), raw.args.clone()),
            None => {
                let (filter, args) = render::render_where(*self, table, &parts.filters);
                let sql = format!(
                    "select count(1) from {}{}{}",
                    render::table_name(*self, table, &parts),
                    self.hint(&parts),
                    filter
                );
                Statement::new(sql, args)
            }
        };
        self.rendered("count", statement)
    }

    /// Insert of one entity. Raw-query tokens do not apply.
    pub fn insert<E>(
        &self,
        table: &TableMetadata<E>,
        entity: &E,
        clauses: &ClauseList,
    ) -> Result<Statement> {
        let parts = Parts::collect(clauses);
        let columns = render::write_columns(table, &parts);
        let mut names = Vec::with_capacity(columns.len());
        let mut args = Vec::with_capacity(columns.len());
        for column in columns {
            names.push(self.quote(&column.name));
            args.push(table.read(column, entity)?);
        }

        let target = render::table_name(*self, table, &parts);
        let sql = match (self, names.is_empty()) {
            (Dialect::Mssql, true) => format!("insert into {} default values", target),
            _ => format!(
                "insert into {} ({}) values ({})",
                target,
                names.join(","),
                vec!["?"; names.len()].join(",")
            ),
        };
        Ok(self.rendered("insert", Statement::new(sql, args)))
    }

    /// Update of the writable columns. Where arguments follow the
    /// assignment arguments.
    pub fn update<E>(
        &self,
        table: &TableMetadata<E>,
        entity: &E,
        clauses: &ClauseList,
    ) -> Result<Statement> {
        let parts = Parts::collect(clauses);
        if let Some(raw) = parts.raw {
            let statement = Statement::new(raw.fragment.clone(), raw.args.clone());
            return Ok(self.rendered("update", statement));
        }

        let columns = render::write_columns(table, &parts);
        let mut assignments = Vec::with_capacity(columns.len());
        let mut args = Vec::with_capacity(columns.len());
        for column in columns {
            assignments.push(format!("{}=?", self.quote(&column.name)));
            args.push(table.read(column, entity)?);
        }

        let (filter, filter_args) = render::render_where(*self, table, &parts.filters);
        args.extend(filter_args);
        let sql = format!(
            "update {} set {}{}",
            render::table_name(*self, table, &parts),
            assignments.join(","),
            filter
        );
        Ok(self.rendered("update", Statement::new(sql, args)))
    }

    pub fn delete<E>(&self, table: &TableMetadata<E>, clauses: &ClauseList) -> Statement {
        let parts = Parts::collect(clauses);
        let statement = match parts.raw {
            Some(raw) => Statement::new(raw.fragment.clone(), raw.args.clone()),
            None => {
                let (filter, args) = render::render_where(*self, table, &parts.filters);
                let sql = format!(
                    "delete from {}{}",
                    render::table_name(*self, table, &parts),
                    filter
                );
                Statement::new(sql, args)
            }
        };
        self.rendered("delete", statement)
    }

    fn hint(&self, parts: &Parts<'_>) -> &'static str {
        match self {
            Dialect::Mssql if parts.nolock => " with(nolock)",
            _ => "",
        }
    }

    fn rendered(&self, kind: &'static str, statement: Statement) -> Statement {
        tracing::debug!(
            target: "shardline::sql",
            dialect = self.name(),
            kind,
            sql = %statement.sql,
            args = ?statement.args,
            "Rendered statement"
        );
        statement
    }
}
