//! Command compiler.
//!
//! Renders table descriptors, COPY option sets and credentials into the SQL
//! text the orchestrator executes. Every function here is pure: the same
//! inputs always produce byte-identical output.

use crate::copy_option::{quote_literal, CopyOptionSet};
use crate::credentials::Credentials;
use crate::error::CompileError;
use crate::table_desc::TableDesc;
use crate::values::Record;
use std::collections::HashSet;
use std::fmt;

/// A rendered COPY command.
///
/// The SQL text embeds the resolved credentials; `Display` and `Debug` show a
/// redacted copy so the command can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct CopyCommand {
    sql: String,
    redacted: String,
}

impl CopyCommand {
    /// The executable statement, including credentials.
    pub fn as_sql(&self) -> &str {
        &self.sql
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl fmt::Display for CopyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for CopyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CopyCommand").field(&self.redacted).finish()
    }
}

/// Quote an identifier, doubling embedded quotes. Schema-qualified names
/// (`schema.table`) have each part quoted.
pub fn quote_ident(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.trim().replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn column_list(desc: &TableDesc) -> String {
    desc.columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check the parts every statement needs and return the table name.
///
/// Fails when the name or columns are missing, a column repeats, or a
/// distribution/sort key names a column that does not exist.
pub fn validate(desc: &TableDesc) -> Result<&str, CompileError> {
    let name = desc
        .table_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(CompileError::MissingTableName)?;

    if desc.columns.is_empty() {
        return Err(CompileError::MissingColumns(name.to_string()));
    }

    let mut seen = HashSet::with_capacity(desc.columns.len());
    for column in &desc.columns {
        if !seen.insert(column.as_str()) {
            return Err(CompileError::DuplicateColumn {
                table: name.to_string(),
                column: column.clone(),
            });
        }
    }

    if let Some(key) = &desc.distribution_key {
        if !seen.contains(key.as_str()) {
            return Err(CompileError::UnknownKeyColumn {
                table: name.to_string(),
                kind: "distribution key",
                key: key.clone(),
            });
        }
    }
    for key in &desc.sort_keys {
        if !seen.contains(key.as_str()) {
            return Err(CompileError::UnknownKeyColumn {
                table: name.to_string(),
                kind: "sort key",
                key: key.clone(),
            });
        }
    }

    Ok(name)
}

/// Render the COPY command loading `staged_location` into the descriptor's
/// table. Options are appended in canonical order.
pub fn compile(
    desc: &TableDesc,
    copy_options: &CopyOptionSet,
    staged_location: &str,
    credentials: &Credentials,
) -> Result<CopyCommand, CompileError> {
    let name = validate(desc)?;
    compile_into(name, desc, copy_options, staged_location, credentials)
}

/// Like [`compile`], but loading into `target` (an intermediate table with
/// the descriptor's columns).
pub fn compile_into(
    target: &str,
    desc: &TableDesc,
    copy_options: &CopyOptionSet,
    staged_location: &str,
    credentials: &Credentials,
) -> Result<CopyCommand, CompileError> {
    validate(desc)?;

    let head = format!(
        "COPY {} ({}) FROM '{}'",
        quote_ident(target),
        column_list(desc),
        quote_literal(staged_location)
    );
    let options = copy_options.render();

    let render = |auth: String| {
        let mut sql = format!("{head} {auth}");
        if !options.trim().is_empty() {
            sql.push(' ');
            sql.push_str(options.trim_end());
        }
        sql
    };

    Ok(CopyCommand {
        sql: render(credentials.authorization_clause()),
        redacted: render(credentials.redacted_clause()),
    })
}

/// Render `CREATE TABLE` with distribution and sort keys. Every column needs
/// a declared type.
pub fn compile_create_table(desc: &TableDesc) -> Result<String, CompileError> {
    let name = validate(desc)?;

    let mut column_defs = Vec::with_capacity(desc.columns.len());
    for (i, column) in desc.columns.iter().enumerate() {
        let ddl_type = desc
            .column_type(i)
            .ok_or_else(|| CompileError::MissingColumnType {
                table: name.to_string(),
                column: column.clone(),
            })?;
        column_defs.push(format!("{} {}", quote_ident(column), ddl_type.trim()));
    }

    let mut sql = format!(
        "CREATE TABLE {} ({})",
        quote_ident(name),
        column_defs.join(", ")
    );
    if let Some(key) = &desc.distribution_key {
        sql.push_str(&format!(" DISTKEY({})", quote_ident(key)));
    }
    if !desc.sort_keys.is_empty() {
        let keys: Vec<String> = desc.sort_keys.iter().map(|k| quote_ident(k)).collect();
        sql.push_str(&format!(" SORTKEY({})", keys.join(", ")));
    }
    Ok(sql)
}

pub fn compile_drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote_ident(table))
}

pub fn compile_drop_table_if_exists(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

/// Intermediate table with the same shape as `target`.
pub fn compile_create_like(intermediate: &str, target: &str) -> String {
    format!(
        "CREATE TABLE {} (LIKE {})",
        quote_ident(intermediate),
        quote_ident(target)
    )
}

/// Statements merging `intermediate` into the descriptor's table on its
/// distribution key: delete the matching rows, then insert everything.
pub fn compile_merge(desc: &TableDesc, intermediate: &str) -> Result<Vec<String>, CompileError> {
    let name = validate(desc)?;
    let key = desc
        .distribution_key
        .as_deref()
        .ok_or_else(|| CompileError::MissingMergeKey(name.to_string()))?;

    let target = quote_ident(name);
    let source = quote_ident(intermediate);
    let key = quote_ident(key);
    let columns = column_list(desc);

    Ok(vec![
        format!("DELETE FROM {target} USING {source} WHERE {target}.{key} = {source}.{key}"),
        format!("INSERT INTO {target} ({columns}) SELECT {columns} FROM {source}"),
    ])
}

/// One multi-row `INSERT ... VALUES` statement for `records`.
///
/// Records shorter than the column list are padded with NULL; longer ones
/// are truncated.
pub fn compile_insert(
    desc: &TableDesc,
    target: &str,
    records: &[Record],
) -> Result<Option<String>, CompileError> {
    validate(desc)?;
    if records.is_empty() {
        return Ok(None);
    }

    let width = desc.columns.len();
    let rows: Vec<String> = records
        .iter()
        .map(|record| {
            let values: Vec<String> = (0..width)
                .map(|i| {
                    record
                        .values
                        .get(i)
                        .map(|v| v.to_sql_literal())
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    Ok(Some(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(target),
        column_list(desc),
        rows.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy_option::CopyOption;
    use crate::credentials::CredentialSource;
    use crate::values::FieldValue;

    fn users() -> TableDesc {
        TableDesc::new("users")
            .with_column("id", Some("INTEGER"))
            .with_column("name", Some("VARCHAR(256)"))
    }

    #[test]
    fn test_compile_copy_with_ambient_credentials() {
        let options = CopyOptionSet::new()
            .with(CopyOption::GZIP, None)
            .with(CopyOption::DELIMITER, Some("|"));
        let cmd = compile(
            &users(),
            &options,
            "s3://bucket/stage/users/",
            &Credentials::RuntimeDetermined,
        )
        .unwrap();

        assert_eq!(
            cmd.as_sql(),
            "COPY \"users\" (\"id\", \"name\") FROM 's3://bucket/stage/users/' IAM_ROLE default DELIMITER '|' GZIP"
        );
    }

    #[test]
    fn test_compile_is_deterministic_and_redacted() {
        let creds = Credentials::explicit("AKIA", "s3cr3t", CredentialSource::Configuration);
        let a = CopyOptionSet::new()
            .with(CopyOption::MAXERROR, Some("3"))
            .with(CopyOption::CSV, Some("\""));
        let b = CopyOptionSet::new()
            .with(CopyOption::CSV, Some("\""))
            .with(CopyOption::MAXERROR, Some("3"));

        let first = compile(&users(), &a, "s3://b/p/", &creds).unwrap();
        let second = compile(&users(), &b, "s3://b/p/", &creds).unwrap();
        assert_eq!(first.as_sql(), second.as_sql());
        assert!(first.as_sql().contains("aws_secret_access_key=s3cr3t"));
        assert!(!first.to_string().contains("s3cr3t"));
        assert!(!format!("{first:?}").contains("s3cr3t"));
        assert!(first.as_sql().find("CSV QUOTE").unwrap() < first.as_sql().find("MAXERROR").unwrap());
    }

    #[test]
    fn test_compile_requires_name_and_columns() {
        let mut no_name = users();
        no_name.name = None;
        assert_eq!(
            compile(&no_name, &CopyOptionSet::new(), "s3://b/", &Credentials::RuntimeDetermined)
                .unwrap_err(),
            CompileError::MissingTableName
        );

        assert_eq!(
            compile(
                &TableDesc::new("users"),
                &CopyOptionSet::new(),
                "s3://b/",
                &Credentials::RuntimeDetermined
            )
            .unwrap_err(),
            CompileError::MissingColumns("users".to_string())
        );
    }

    #[test]
    fn test_unknown_key_columns_fail() {
        let desc = users().with_distribution_key("email");
        assert!(matches!(
            validate(&desc),
            Err(CompileError::UnknownKeyColumn { kind: "distribution key", .. })
        ));

        let desc = users().with_sort_keys(["id", "created_at"]);
        assert!(matches!(
            validate(&desc),
            Err(CompileError::UnknownKeyColumn { kind: "sort key", .. })
        ));
    }

    #[test]
    fn test_duplicate_columns_fail() {
        let desc = users().with_column("id", Some("BIGINT"));
        assert!(matches!(
            validate(&desc),
            Err(CompileError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_create_table() {
        let desc = users().with_distribution_key("id").with_sort_keys(["id", "name"]);
        assert_eq!(
            compile_create_table(&desc).unwrap(),
            "CREATE TABLE \"users\" (\"id\" INTEGER, \"name\" VARCHAR(256)) DISTKEY(\"id\") SORTKEY(\"id\", \"name\")"
        );

        let untyped = TableDesc::new("users").with_column("id", None);
        assert!(matches!(
            compile_create_table(&untyped),
            Err(CompileError::MissingColumnType { .. })
        ));
    }

    #[test]
    fn test_schema_qualified_identifiers() {
        assert_eq!(quote_ident("public.users"), "\"public\".\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(compile_drop_table("public.users"), "DROP TABLE \"public\".\"users\"");
    }

    #[test]
    fn test_merge_requires_distribution_key() {
        assert_eq!(
            compile_merge(&users(), "users_stage").unwrap_err(),
            CompileError::MissingMergeKey("users".to_string())
        );

        let statements = compile_merge(&users().with_distribution_key("id"), "users_stage").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "DELETE FROM \"users\" USING \"users_stage\" WHERE \"users\".\"id\" = \"users_stage\".\"id\""
        );
        assert!(statements[1].starts_with("INSERT INTO \"users\" (\"id\", \"name\") SELECT"));
    }

    #[test]
    fn test_insert_pads_short_records() {
        let records = vec![
            Record::new(vec![FieldValue::Int(1), FieldValue::text("Ann")]),
            Record::new(vec![FieldValue::Int(2)]),
        ];
        let sql = compile_insert(&users(), "users", &records).unwrap().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (1, 'Ann'), (2, NULL)"
        );
        assert_eq!(compile_insert(&users(), "users", &[]).unwrap(), None);
    }
}
