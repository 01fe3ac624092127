use crate::fixtures::{ann, Customer};
use anyhow::Result;
use shardline_sql::{args, metadata_of, ResultSet, RowMapper, Value};

#[test]
fn test_rows_map_back_into_embedded_fields() -> Result<()> {
    let table = metadata_of::<Customer>()?;
    let rows = ResultSet::new(
        vec![
            "ID".into(),
            "region".into(),
            "name".into(),
            "prefs".into(),
            "created_by".into(),
            "row".into(),
        ],
        vec![args![0, 3, "ann", r#"{"theme":"dark"}"#, "ops", 1]],
    );
    let mapper = RowMapper::new(&table, &rows.columns);
    assert_eq!(mapper.mapped_columns(), 5);

    let customers = mapper.map_all(rows.rows)?;
    assert_eq!(customers, vec![ann()]);
    Ok(())
}

#[test]
fn test_bad_json_cell_fails_the_row() -> Result<()> {
    let table = metadata_of::<Customer>()?;
    let mapper = RowMapper::new(&table, &["prefs".to_string()]);
    let mut target = Customer::default();
    assert!(mapper.assign(&mut target, vec![Value::from("{not json")]).is_err());
    Ok(())
}

#[test]
fn test_merged_result_sets_keep_first_header() {
    let mut first = ResultSet::new(vec!["count(1)".into()], vec![args![2]]);
    first.merge(ResultSet::new(vec!["count(1)".into()], vec![args![5]]));
    assert_eq!(first.len(), 2);
    assert_eq!(first.scalar().and_then(Value::as_i64), Some(2));
}
