use std::marker::PhantomData;

use dka_core::Dimension;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::StorageError;

/// Read-only access to one dimension table.
///
/// Resolves identifiers used elsewhere in the application to their
/// human-readable labels.
pub struct DimensionRepository<D> {
    pool: SqlitePool,
    _dimension: PhantomData<fn() -> D>,
}

impl<D> Clone for DimensionRepository<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _dimension: PhantomData,
        }
    }
}

impl<D: Dimension> DimensionRepository<D> {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _dimension: PhantomData,
        }
    }

    /// Loads the row with the provided primary key, if any.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<D>, StorageError> {
        let sql = format!(
            "SELECT {id_col}, {name_col} FROM {table} WHERE {id_col} = ?",
            id_col = D::ID_COLUMN,
            name_col = D::NAME_COLUMN,
            table = D::TABLE,
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode::<D>(&row)).transpose()
    }

    /// Lists every row ordered by primary key.
    pub async fn list_all(&self) -> Result<Vec<D>, StorageError> {
        let sql = format!(
            "SELECT {id_col}, {name_col} FROM {table} ORDER BY {id_col}",
            id_col = D::ID_COLUMN,
            name_col = D::NAME_COLUMN,
            table = D::TABLE,
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(decode::<D>).collect()
    }

    /// Counts the rows currently stored.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", D::TABLE);
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

fn decode<D: Dimension>(row: &SqliteRow) -> Result<D, StorageError> {
    let id: i64 = row.try_get(0)?;
    let name: String = row.try_get(1)?;
    D::from_parts(id, name).map_err(|source| StorageError::InvalidRow {
        table: D::TABLE,
        source,
    })
}
