use super::render::{self, Parts};
use super::{Dialect, Statement};
use crate::metadata::TableMetadata;

const DIALECT: Dialect = Dialect::Generic;

/// `select <cols> from <table> <where> [order by ..] [limit skip,size | limit n]`
pub(super) fn select<E>(table: &TableMetadata<E>, parts: &Parts<'_>) -> Statement {
    let (filter, args) = render::render_where(DIALECT, table, &parts.filters);
    let mut sql = format!(
        "select {} from {}{}",
        render::projection(DIALECT, table, parts),
        render::table_name(DIALECT, table, parts),
        filter
    );

    if let Some(order) = parts.order_by() {
        sql.push_str(&format!(" order by {}", order));
    }
    match (parts.limit, parts.top) {
        (Some((skip, size)), _) => sql.push_str(&format!(" limit {},{}", skip, size)),
        (None, Some(top)) => sql.push_str(&format!(" limit {}", top)),
        (None, None) => {}
    }
    Statement::new(sql, args)
}

#[cfg(test)]
mod tests {
    use crate::args;
    use crate::clause::{Clause, ClauseBuilder, ClauseKind, ClauseList};
    use crate::sql_generator::tests::person_table;
    use crate::sql_generator::Dialect;
    use crate::value::Value;

    #[test]
    fn test_top_renders_limit_one() {
        let table = person_table();
        let mut clauses = ClauseList::new();
        clauses.id(3).push_clause(Clause::new(
            ClauseKind::Top,
            "",
            vec![Value::UInt(1)],
        ));
        let stmt = Dialect::Generic.select(&table, &clauses);
        assert_eq!(
            stmt.sql,
            "select id,name,age,city from person where id=? limit 1"
        );
        assert_eq!(stmt.args, args![3]);
    }

    #[test]
    fn test_paging_wins_over_top() {
        let table = person_table();
        let mut clauses = ClauseList::new();
        clauses
            .push_clause(Clause::new(ClauseKind::Top, "", vec![Value::UInt(1)]))
            .limit(0, 5)
            .limit(5, 5)
            .unlock_table();
        let stmt = Dialect::Generic.select(&table, &clauses);
        assert_eq!(stmt.sql, "select id,name,age,city from person limit 5,5");
    }

    #[test]
    fn test_order_by_tokens_join() {
        let table = person_table();
        let mut clauses = ClauseList::new();
        clauses.order_by("age desc").order_by("id").omit("city,age");
        let stmt = Dialect::Generic.select(&table, &clauses);
        assert_eq!(stmt.sql, "select id,name from person order by age desc,id");
    }
}
