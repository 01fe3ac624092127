use crate::fixtures::ann;
use anyhow::Result;
use shardline_sql::{args, ClauseBuilder, ClauseList, Dialect, Value};

#[test]
fn test_insert_flattens_embedded_columns() -> Result<()> {
    with_dialect!("mysql", |dialect, table| {
        let stmt = dialect.insert(&table, &ann(), &ClauseList::new())?;
        assert_eq!(
            stmt.sql,
            "insert into crm.customers (region,name,prefs,created_by) values (?,?,?,?)"
        );
        assert_eq!(
            stmt.args,
            vec![
                Value::Int(3),
                Value::from("ann"),
                Value::from(r#"{"theme":"dark"}"#),
                Value::from("ops"),
            ]
        );
    });
    Ok(())
}

#[test]
fn test_mssql_quotes_dotted_table_and_pages() -> Result<()> {
    with_dialect!("sqlserver", |dialect, table| {
        assert_eq!(dialect, Dialect::Mssql);
        let mut clauses = ClauseList::new();
        clauses.where_clause("region=?", args![3]).limit(0, 10);
        let stmt = dialect.select(&table, &clauses);
        assert_eq!(
            stmt.sql,
            "select top 10 * from (select ROW_NUMBER() OVER (order by [id]) as row,[id],[region],[name],[prefs],[created_by] from [crm].[customers] where region=?) t where t.row > 0"
        );
        assert_eq!(stmt.args, args![3]);
    });
    Ok(())
}

#[test]
fn test_update_by_id_with_column_subset() -> Result<()> {
    with_dialect!("sqlite", |dialect, table| {
        let mut clauses = ClauseList::new();
        clauses.cols("name").id(12);
        let stmt = dialect.update(&table, &ann(), &clauses)?;
        assert_eq!(stmt.sql, "update crm.customers set name=? where id=?");
        assert_eq!(stmt.args, args!["ann", 12]);

        let mssql = Dialect::Mssql.update(&table, &ann(), &clauses)?;
        assert_eq!(mssql.sql, "update [crm].[customers] set [name]=? where [id]=?");
    });
    Ok(())
}

#[test]
fn test_count_and_delete_render_filters_by_kind() -> Result<()> {
    with_dialect!("postgres", |dialect, table| {
        let mut clauses = ClauseList::new();
        clauses
            .in_values("region", vec![1, 2])
            .or("name like ?", args!["a%"]);
        let count = dialect.count(&table, &clauses);
        let delete = dialect.delete(&table, &clauses);
        assert_eq!(
            count.sql,
            "select count(1) from crm.customers where (name like ?) and region in (1,2)"
        );
        assert_eq!(
            delete.sql,
            "delete from crm.customers where (name like ?) and region in (1,2)"
        );
        assert_eq!(count.args, delete.args);
    });
    Ok(())
}

#[test]
fn test_unknown_driver_is_rejected() {
    let err = shardline_sql::route_dialect("db2").unwrap_err();
    assert!(err.message.contains("db2"));
    assert!(err.hint.is_some());
}
