//! Table definitions for the dimension tables and checks that an existing
//! store still matches them.
use dka_core::{AdministrationType, Dimension, Treatment};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, ValueRef};

use crate::StorageError;

/// Dimension with a `CREATE TABLE IF NOT EXISTS` statement on disk.
pub trait TableDdl: Dimension {
    const CREATE: &'static str;
}

impl TableDdl for Treatment {
    const CREATE: &'static str = include_str!("../schema/dim_treatment.sql");
}

impl TableDdl for AdministrationType {
    const CREATE: &'static str = include_str!("../schema/dim_administration_type.sql");
}

/// Creates the table for `D` when it does not exist yet.
pub(crate) async fn ensure_table<D: TableDdl>(
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(D::CREATE).execute(&mut *conn).await?;
    Ok(())
}

struct ColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    has_default: bool,
    pk: i64,
}

/// Compares the live table layout with the columns `D` relies on.
///
/// Extra columns are accepted as long as a two-column insert can still
/// succeed, i.e. they are nullable or carry a default.
pub(crate) async fn verify_table<D: Dimension>(
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", D::TABLE))
        .fetch_all(&mut *conn)
        .await?;

    if rows.is_empty() {
        return Err(conflict::<D>("table does not exist"));
    }

    let columns = rows
        .iter()
        .map(column_info)
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let id = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(D::ID_COLUMN))
        .ok_or_else(|| conflict::<D>(&format!("missing column {}", D::ID_COLUMN)))?;
    if !id.declared_type.eq_ignore_ascii_case("INTEGER") {
        return Err(conflict::<D>(&format!(
            "column {} is declared {} instead of INTEGER",
            D::ID_COLUMN,
            id.declared_type
        )));
    }
    if id.pk != 1 {
        return Err(conflict::<D>(&format!(
            "column {} is not the primary key",
            D::ID_COLUMN
        )));
    }

    let name = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(D::NAME_COLUMN))
        .ok_or_else(|| conflict::<D>(&format!("missing column {}", D::NAME_COLUMN)))?;
    if !name.declared_type.eq_ignore_ascii_case("TEXT") {
        return Err(conflict::<D>(&format!(
            "column {} is declared {} instead of TEXT",
            D::NAME_COLUMN,
            name.declared_type
        )));
    }
    if !name.not_null {
        return Err(conflict::<D>(&format!(
            "column {} must be NOT NULL",
            D::NAME_COLUMN
        )));
    }

    for column in &columns {
        if column.name.eq_ignore_ascii_case(D::ID_COLUMN)
            || column.name.eq_ignore_ascii_case(D::NAME_COLUMN)
        {
            continue;
        }
        if column.pk != 0 {
            return Err(conflict::<D>(&format!(
                "column {} is part of the primary key",
                column.name
            )));
        }
        if column.not_null && !column.has_default {
            return Err(conflict::<D>(&format!(
                "column {} is NOT NULL without a default",
                column.name
            )));
        }
    }

    Ok(())
}

fn column_info(row: &SqliteRow) -> Result<ColumnInfo, sqlx::Error> {
    Ok(ColumnInfo {
        name: row.try_get("name")?,
        declared_type: row.try_get("type")?,
        not_null: row.try_get::<i64, _>("notnull")? != 0,
        has_default: !row.try_get_raw("dflt_value")?.is_null(),
        pk: row.try_get("pk")?,
    })
}

fn conflict<D: Dimension>(detail: &str) -> StorageError {
    StorageError::SchemaConflict {
        table: D::TABLE,
        detail: detail.to_string(),
    }
}
