use super::render::{self, Parts};
use super::{Dialect, Statement};
use crate::metadata::TableMetadata;

const DIALECT: Dialect = Dialect::Mssql;

/// Plain: `select [top n ]<cols> from [t][ with(nolock)] <where> [order by ..]`.
///
/// Paged: the select is wrapped in a `ROW_NUMBER()` window ordered by the
/// order-by tokens, falling back to the primary key, and filtered to the
/// rows after `skip`.
pub(super) fn select<E>(table: &TableMetadata<E>, parts: &Parts<'_>) -> Statement {
    let (filter, args) = render::render_where(DIALECT, table, &parts.filters);
    let projection = render::projection(DIALECT, table, parts);
    let source = format!(
        "{}{}{}",
        render::table_name(DIALECT, table, parts),
        DIALECT.hint(parts),
        filter
    );

    let sql = match parts.limit {
        Some((skip, size)) => {
            let order = parts
                .order_by()
                .or_else(|| table.primary_key().map(|pk| DIALECT.quote(&pk.name)))
                .unwrap_or_else(|| "(select null)".to_string());
            format!(
                "select top {} * from (select ROW_NUMBER() OVER (order by {}) as row,{} from {}) t where t.row > {}",
                size, order, projection, source, skip
            )
        }
        None => {
            let top = parts
                .top
                .map(|n| format!("top {} ", n))
                .unwrap_or_default();
            let mut sql = format!("select {}{} from {}", top, projection, source);
            if let Some(order) = parts.order_by() {
                sql.push_str(&format!(" order by {}", order));
            }
            sql
        }
    };
    Statement::new(sql, args)
}
