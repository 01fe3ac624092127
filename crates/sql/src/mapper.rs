//! Row mapping.
//!
//! Drivers buffer a whole result into a [`ResultSet`]. A [`RowMapper`]
//! resolves result columns to entity columns once per query, then assigns
//! every row. Result columns with no matching entity column are skipped.

use crate::metadata::TableMetadata;
use crate::value::Value;
use shardline_error::Result;

/// Fully buffered query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First cell of the first row, for `count(1)` and scalar queries.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Concatenate rows from another result with the same shape.
    pub fn merge(&mut self, other: ResultSet) {
        if self.columns.is_empty() {
            self.columns = other.columns;
        }
        self.rows.extend(other.rows);
    }
}

pub struct RowMapper<'a, E> {
    table: &'a TableMetadata<E>,
    /// Entity column index per result column.
    positions: Vec<Option<usize>>,
}

impl<'a, E> RowMapper<'a, E> {
    pub fn new(table: &'a TableMetadata<E>, result_columns: &[String]) -> Self {
        let positions = result_columns
            .iter()
            .map(|name| {
                let key = name.to_lowercase();
                table.columns().iter().position(|c| c.key() == key)
            })
            .collect();
        Self { table, positions }
    }

    pub fn mapped_columns(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }

    /// Assign one row into an existing instance.
    pub fn assign(&self, target: &mut E, row: Vec<Value>) -> Result<()> {
        for (value, position) in row.into_iter().zip(&self.positions) {
            if let Some(i) = position {
                let column = &self.table.columns()[*i];
                self.table.write(column, target, value)?;
            }
        }
        Ok(())
    }
}

impl<'a, E: Default> RowMapper<'a, E> {
    pub fn map_row(&self, row: Vec<Value>) -> Result<E> {
        let mut entity = E::default();
        self.assign(&mut entity, row)?;
        Ok(entity)
    }

    pub fn map_all(&self, rows: Vec<Vec<Value>>) -> Result<Vec<E>> {
        rows.into_iter().map(|row| self.map_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Entity, EntityDescriptor, Json};
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct User {
        id: i64,
        name: String,
        age: Option<i32>,
        joined: NaiveDateTime,
        prefs: Json<Prefs>,
        avatar: Box<String>,
    }

    impl Entity for User {
        fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
            d.table("users")
                .column("id,pk,auto", |u| &u.id, |u| &mut u.id)
                .column("name,notnull", |u| &u.name, |u| &mut u.name)
                .column("age", |u| &u.age, |u| &mut u.age)
                .column("joined", |u| &u.joined, |u| &mut u.joined)
                .column("prefs", |u| &u.prefs, |u| &mut u.prefs)
                .column("avatar", |u| &u.avatar, |u| &mut u.avatar)
        }
    }

    fn joined() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 7, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_map_rows_by_lowercase_name() {
        let table = TableMetadata::<User>::build().unwrap();
        let columns = vec![
            "ID".to_string(),
            "Name".to_string(),
            "extra".to_string(),
            "age".to_string(),
            "joined".to_string(),
            "prefs".to_string(),
            "avatar".to_string(),
        ];
        let mapper = RowMapper::new(&table, &columns);
        assert_eq!(mapper.mapped_columns(), 6);

        let users = mapper
            .map_all(vec![
                vec![
                    Value::Int(1),
                    Value::Text("ann".into()),
                    Value::Text("ignored".into()),
                    Value::Int(31),
                    Value::Text("2023-07-01 08:00:00".into()),
                    Value::Text(r#"{"theme":"dark"}"#.into()),
                    Value::Text("a.png".into()),
                ],
                vec![
                    Value::Int(2),
                    Value::Text("bob".into()),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
            ])
            .unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, 1);
        assert_eq!(users[0].age, Some(31));
        assert_eq!(users[0].joined, joined());
        assert_eq!(users[0].prefs.theme, "dark");
        assert_eq!(*users[0].avatar, "a.png");

        assert_eq!(users[1].age, None);
        assert_eq!(users[1].joined, NaiveDateTime::default());
        assert_eq!(users[1].prefs, Json(Prefs::default()));
        assert_eq!(*users[1].avatar, "");
    }

    #[test]
    fn test_timestamp_null_leaves_field() {
        let table = TableMetadata::<User>::build().unwrap();
        let columns = vec!["joined".to_string()];
        let mapper = RowMapper::new(&table, &columns);
        let mut user = User {
            joined: joined(),
            ..Default::default()
        };
        mapper.assign(&mut user, vec![Value::Null]).unwrap();
        assert_eq!(user.joined, joined());
    }

    #[test]
    fn test_bad_json_is_reported() {
        let table = TableMetadata::<User>::build().unwrap();
        let columns = vec!["prefs".to_string()];
        let mapper = RowMapper::new(&table, &columns);
        let err = mapper
            .map_row(vec![Value::Text("{not json".into())])
            .unwrap_err();
        assert!(err.is_mapping());
        assert!(err.message.contains("users.prefs"));
    }

    #[test]
    fn test_merge_result_sets() {
        let mut a = ResultSet::new(vec!["c".into()], vec![vec![Value::Int(3)]]);
        a.merge(ResultSet::new(vec!["c".into()], vec![vec![Value::Int(4)]]));
        assert_eq!(a.len(), 2);
        assert_eq!(a.scalar(), Some(&Value::Int(3)));
    }
}
