//! Clause tokens.
//!
//! Fluent calls append [`Clause`]s in call order. Generators render them in
//! [`ClauseKind`] order: a stable sort puts the table override before
//! filters and filters before ordering, while same-kind tokens keep their
//! call order.

use crate::value::Value;

/// Operation kind of a clause token. Declaration order is rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    RawQuery,
    Limit,
    Top,
    Cols,
    Omit,
    Table,
    UnlockTable,
    Id,
    Where,
    And,
    Or,
    In,
    OrIn,
    Between,
    OrBetween,
    OrderBy,
}

impl ClauseKind {
    /// Kinds that contribute to the where clause.
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            ClauseKind::Id
                | ClauseKind::Where
                | ClauseKind::And
                | ClauseKind::Or
                | ClauseKind::In
                | ClauseKind::OrIn
                | ClauseKind::Between
                | ClauseKind::OrBetween
        )
    }
}

/// One accumulated query fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub fragment: String,
    pub args: Vec<Value>,
}

impl Clause {
    pub fn new(kind: ClauseKind, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind,
            fragment: fragment.into(),
            args,
        }
    }

    /// Lowercased, trimmed names of a `cols`/`omit` fragment.
    pub fn names(&self) -> Vec<String> {
        self.fragment
            .split(',')
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Whether this token contributes text to the where clause.
    pub fn renders_filter(&self) -> bool {
        match self.kind {
            ClauseKind::In | ClauseKind::OrIn => !self.args.is_empty(),
            kind => kind.is_filter(),
        }
    }
}

/// Ordered list of clause tokens. Also usable on its own as a reusable
/// filter that is later attached to a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseList {
    clauses: Vec<Clause>,
}

impl ClauseList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clear(&mut self) {
        self.clauses.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Clause> {
        self.clauses.iter()
    }

    /// Tokens in rendering order.
    pub fn sorted(&self) -> Vec<&Clause> {
        let mut sorted: Vec<&Clause> = self.clauses.iter().collect();
        sorted.sort_by_key(|c| c.kind);
        sorted
    }

    pub fn append(&mut self, other: &ClauseList) {
        self.clauses.extend(other.clauses.iter().cloned());
    }

    pub fn has(&self, kind: ClauseKind) -> bool {
        self.clauses.iter().any(|c| c.kind == kind)
    }

    pub fn first(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.kind == kind)
    }

    pub fn last(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().rev().find(|c| c.kind == kind)
    }

    /// True when some token renders into the where clause. An `in` token
    /// with an empty list renders nothing and does not count.
    pub fn has_filter(&self) -> bool {
        self.clauses.iter().any(Clause::renders_filter)
    }

    pub fn is_paged(&self) -> bool {
        self.has(ClauseKind::Limit)
    }
}

impl From<Vec<Clause>> for ClauseList {
    fn from(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }
}

impl<'a> IntoIterator for &'a ClauseList {
    type Item = &'a Clause;
    type IntoIter = std::slice::Iter<'a, Clause>;

    fn into_iter(self) -> Self::IntoIter {
        self.clauses.iter()
    }
}

/// Fluent clause accumulation shared by sessions, transactions and
/// free-standing [`ClauseList`]s.
pub trait ClauseBuilder {
    fn push_clause(&mut self, clause: Clause) -> &mut Self;

    /// `where <clause>`, or `and <clause>` after the first filter.
    fn where_clause(&mut self, clause: &str, args: Vec<Value>) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Where, clause, args))
    }

    /// `and <clause>`
    fn and(&mut self, clause: &str, args: Vec<Value>) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::And, clause, args))
    }

    /// `or (<clause>)`
    fn or(&mut self, clause: &str, args: Vec<Value>) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Or, clause, args))
    }

    /// `and <column> in (<literals>)`; an empty list renders nothing.
    fn in_values<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let args = values.into_iter().map(Into::into).collect();
        self.push_clause(Clause::new(ClauseKind::In, column, args))
    }

    /// `or (<column> in (<literals>))`
    fn or_in_values<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let args = values.into_iter().map(Into::into).collect();
        self.push_clause(Clause::new(ClauseKind::OrIn, column, args))
    }

    /// `and <column> between ? and ?`
    fn between(&mut self, column: &str, from: impl Into<Value>, to: impl Into<Value>) -> &mut Self {
        self.push_clause(Clause::new(
            ClauseKind::Between,
            column,
            vec![from.into(), to.into()],
        ))
    }

    /// `or (<column> between ? and ?)`
    fn or_between(&mut self, column: &str, from: impl Into<Value>, to: impl Into<Value>) -> &mut Self {
        self.push_clause(Clause::new(
            ClauseKind::OrBetween,
            column,
            vec![from.into(), to.into()],
        ))
    }

    /// Page of `size` rows after skipping `skip`.
    fn limit(&mut self, skip: u64, size: u64) -> &mut Self {
        self.push_clause(Clause::new(
            ClauseKind::Limit,
            "",
            vec![Value::UInt(skip), Value::UInt(size)],
        ))
    }

    /// Comma-separated ordering, e.g. `"created desc, id"`.
    fn order_by(&mut self, order: &str) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::OrderBy, order, Vec::new()))
    }

    /// Restrict the selected or written columns.
    fn cols(&mut self, cols: &str) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Cols, cols, Vec::new()))
    }

    /// Exclude columns from the selected or written set.
    fn omit(&mut self, cols: &str) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Omit, cols, Vec::new()))
    }

    /// Filter on the primary key.
    fn id(&mut self, id: impl Into<Value>) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Id, "", vec![id.into()]))
    }

    /// Override the table name.
    fn table(&mut self, name: &str) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::Table, name, Vec::new()))
    }

    /// Raw statement returned verbatim by the generators.
    fn query(&mut self, sql: &str, args: Vec<Value>) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::RawQuery, sql, args))
    }

    /// `with(nolock)` table hint (MSSQL only).
    fn unlock_table(&mut self) -> &mut Self {
        self.push_clause(Clause::new(ClauseKind::UnlockTable, "", Vec::new()))
    }

    /// Append every token of a prepared list.
    fn extend_clauses(&mut self, list: &ClauseList) -> &mut Self {
        for clause in list {
            self.push_clause(clause.clone());
        }
        self
    }
}

impl ClauseBuilder for ClauseList {
    fn push_clause(&mut self, clause: Clause) -> &mut Self {
        self.push(clause);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_sorted_is_stable_within_kind() {
        let mut list = ClauseList::new();
        list.and("b=?", args![2])
            .order_by("id")
            .and("c=?", args![3])
            .id(5)
            .table("users_2024");

        let kinds: Vec<ClauseKind> = list.sorted().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ClauseKind::Table,
                ClauseKind::Id,
                ClauseKind::And,
                ClauseKind::And,
                ClauseKind::OrderBy
            ]
        );
        let ands: Vec<&str> = list
            .sorted()
            .into_iter()
            .filter(|c| c.kind == ClauseKind::And)
            .map(|c| c.fragment.as_str())
            .collect();
        assert_eq!(ands, vec!["b=?", "c=?"]);
    }

    #[test]
    fn test_names_are_normalized() {
        let clause = Clause::new(ClauseKind::Cols, " Id, NAME ,", Vec::new());
        assert_eq!(clause.names(), vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_filter_detection() {
        let mut list = ClauseList::new();
        list.cols("id").limit(0, 10);
        assert!(!list.has_filter());
        assert!(list.is_paged());
        list.in_values("id", vec![1, 2]);
        assert!(list.has_filter());
    }

    #[test]
    fn test_empty_in_list_is_not_a_filter() {
        let mut list = ClauseList::new();
        list.in_values("id", Vec::<i64>::new())
            .or_in_values("name", Vec::<String>::new());
        assert!(!list.has_filter());
        list.between("age", 1, 9);
        assert!(list.has_filter());
    }
}
