/// Bind the dialect for `$driver` and the `Customer` table, then run `$body`.
macro_rules! with_dialect {
    ($driver:expr, |$dialect:ident, $table:ident| $body:block) => {{
        let $dialect = shardline_sql::route_dialect($driver)?;
        let $table = shardline_sql::metadata_of::<$crate::fixtures::Customer>()?;
        $body
    }};
}
