use dka_core::{AdministrationType, Dimension, Treatment};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::{
    schema::{ensure_table, verify_table},
    StorageError,
};

/// Creates the dimension tables and guarantees their fixed rows.
///
/// Every step is idempotent: on an initialized store [`run`](Self::run)
/// inserts nothing and changes nothing. A seed id that is already stored
/// under a different name aborts the run and nothing is written.
#[derive(Clone)]
pub struct DimensionInitializer {
    pool: SqlitePool,
}

/// Outcome of seeding a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: &'static str,
    pub inserted: u64,
    pub already_present: u64,
    pub total_rows: u64,
}

/// Per-table outcome of a full initializer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub treatments: TableReport,
    pub administration_types: TableReport,
}

impl InitReport {
    /// Returns `true` when the run found every seed row already in place.
    pub fn was_noop(&self) -> bool {
        self.treatments.inserted == 0 && self.administration_types.inserted == 0
    }
}

impl DimensionInitializer {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures schema, verifies it and seeds both tables in one transaction.
    pub async fn run(&self) -> Result<InitReport, StorageError> {
        let mut tx = self.pool.begin().await?;

        ensure_schema_on(&mut tx).await?;
        verify_schema_on(&mut tx).await?;
        let report = seed_on(&mut tx).await?;

        tx.commit().await?;

        info!(
            stage = "storage",
            treatments_inserted = report.treatments.inserted,
            administration_types_inserted = report.administration_types.inserted,
            noop = report.was_noop(),
            "dimension tables initialized"
        );
        Ok(report)
    }

    /// Creates both tables when they are absent. Existing tables are left as they are.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        ensure_schema_on(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fails with [`StorageError::SchemaConflict`] when a table layout is unusable.
    pub async fn verify_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        verify_schema_on(&mut conn).await
    }

    /// Inserts any missing seed rows. The tables must already exist.
    pub async fn seed(&self) -> Result<InitReport, StorageError> {
        let mut tx = self.pool.begin().await?;
        let report = seed_on(&mut tx).await?;
        tx.commit().await?;
        Ok(report)
    }
}

async fn ensure_schema_on(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    ensure_table::<Treatment>(conn).await?;
    ensure_table::<AdministrationType>(conn).await?;
    Ok(())
}

async fn verify_schema_on(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    verify_table::<Treatment>(conn).await?;
    verify_table::<AdministrationType>(conn).await?;
    Ok(())
}

async fn seed_on(conn: &mut SqliteConnection) -> Result<InitReport, StorageError> {
    Ok(InitReport {
        treatments: seed_table::<Treatment>(conn).await?,
        administration_types: seed_table::<AdministrationType>(conn).await?,
    })
}

async fn seed_table<D: Dimension>(
    conn: &mut SqliteConnection,
) -> Result<TableReport, StorageError> {
    let insert_sql = format!(
        "INSERT INTO {table} ({id_col}, {name_col}) VALUES (?, ?) \
         ON CONFLICT({id_col}) DO NOTHING",
        table = D::TABLE,
        id_col = D::ID_COLUMN,
        name_col = D::NAME_COLUMN,
    );
    let existing_sql = format!(
        "SELECT {name_col} FROM {table} WHERE {id_col} = ?",
        table = D::TABLE,
        id_col = D::ID_COLUMN,
        name_col = D::NAME_COLUMN,
    );

    let mut inserted = 0u64;
    let mut already_present = 0u64;

    for row in D::SEED {
        let result = sqlx::query(&insert_sql)
            .bind(row.id)
            .bind(row.name)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
            debug!(
                stage = "storage",
                table = D::TABLE,
                id = row.id,
                name = row.name,
                "seed row inserted"
            );
            continue;
        }

        let (existing,): (String,) = sqlx::query_as(&existing_sql)
            .bind(row.id)
            .fetch_one(&mut *conn)
            .await?;
        if existing != row.name {
            return Err(StorageError::ConstraintViolation {
                table: D::TABLE,
                id: row.id,
                existing,
                expected: row.name.to_string(),
            });
        }
        already_present += 1;
    }

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", D::TABLE))
        .fetch_one(&mut *conn)
        .await?;
    let total_rows = total as u64;

    let extra = total_rows.saturating_sub(D::SEED.len() as u64);
    if extra > 0 {
        warn!(
            stage = "storage",
            table = D::TABLE,
            extra_rows = extra,
            "dimension table holds rows outside the reference set; leaving them untouched"
        );
    }

    Ok(TableReport {
        table: D::TABLE,
        inserted,
        already_present,
        total_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::TableDdl, Database};
    use tempfile::{tempdir, TempDir};

    async fn fresh_db() -> (TempDir, Database) {
        let dir = tempdir().expect("tempdir");
        let db = Database::open(dir.path().join("dka.db"))
            .await
            .expect("open");
        (dir, db)
    }

    async fn scalar_name(db: &Database, sql: &str) -> Option<String> {
        sqlx::query_as::<_, (String,)>(sql)
            .fetch_optional(db.pool())
            .await
            .expect("query")
            .map(|(name,)| name)
    }

    async fn table_count(db: &Database, table: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .expect("count");
        count
    }

    #[tokio::test]
    async fn fresh_store_is_fully_seeded() {
        let (_dir, db) = fresh_db().await;

        let report = db.initializer().run().await.expect("run");

        assert_eq!(
            report.treatments,
            TableReport {
                table: "dim_treatment",
                inserted: 3,
                already_present: 0,
                total_rows: 3,
            }
        );
        assert_eq!(report.administration_types.inserted, 4);
        assert_eq!(report.administration_types.total_rows, 4);
        assert!(!report.was_noop());
    }

    #[tokio::test]
    async fn fluid_replacement_is_treatment_two() {
        let (_dir, db) = fresh_db().await;
        db.initializer().run().await.expect("run");

        let name = scalar_name(
            &db,
            "SELECT treatment_name FROM dim_treatment WHERE treatment_id=2",
        )
        .await;
        assert_eq!(name.as_deref(), Some("Fluid Replacement"));
    }

    #[tokio::test]
    async fn iv_4_is_administration_type_four() {
        let (_dir, db) = fresh_db().await;
        db.initializer().run().await.expect("run");

        let name = scalar_name(
            &db,
            "SELECT administration_type_name FROM dim_administration_type WHERE administration_type_id=4",
        )
        .await;
        assert_eq!(name.as_deref(), Some("IV_4"));
    }

    #[tokio::test]
    async fn missing_key_yields_no_row() {
        let (_dir, db) = fresh_db().await;
        db.initializer().run().await.expect("run");

        let name = scalar_name(
            &db,
            "SELECT treatment_name FROM dim_treatment WHERE treatment_id=99",
        )
        .await;
        assert!(name.is_none());
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let (_dir, db) = fresh_db().await;
        let initializer = db.initializer();
        initializer.run().await.expect("first run");

        let report = initializer.run().await.expect("second run");

        assert!(report.was_noop());
        assert_eq!(report.treatments.already_present, 3);
        assert_eq!(report.administration_types.already_present, 4);
        assert_eq!(table_count(&db, "dim_treatment").await, 3);
        assert_eq!(table_count(&db, "dim_administration_type").await, 4);

        let names: Vec<String> = db
            .treatments()
            .list_all()
            .await
            .expect("list")
            .into_iter()
            .map(|t| t.treatment_name)
            .collect();
        assert_eq!(
            names,
            vec!["Insulin Therapy", "Fluid Replacement", "Electrolyte Replacement"]
        );
    }

    #[tokio::test]
    async fn reopened_store_is_not_reseeded() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dka.db");

        let db = Database::open(&path).await.expect("open");
        db.initializer().run().await.expect("first run");
        db.close().await;

        let db = Database::open(&path).await.expect("reopen");
        let report = db.initializer().run().await.expect("second run");
        assert!(report.was_noop());
        assert_eq!(report.treatments.total_rows, 3);
        assert_eq!(report.administration_types.total_rows, 4);
    }

    #[tokio::test]
    async fn conflicting_row_aborts_without_writing() {
        let (_dir, db) = fresh_db().await;
        sqlx::query(Treatment::CREATE)
            .execute(db.pool())
            .await
            .expect("create");
        sqlx::query("INSERT INTO dim_treatment VALUES (1, 'Old Name')")
            .execute(db.pool())
            .await
            .expect("insert");

        let err = db.initializer().run().await.unwrap_err();
        match err {
            StorageError::ConstraintViolation {
                table,
                id,
                existing,
                expected,
            } => {
                assert_eq!(table, "dim_treatment");
                assert_eq!(id, 1);
                assert_eq!(existing, "Old Name");
                assert_eq!(expected, "Insulin Therapy");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(table_count(&db, "dim_treatment").await, 1);
        let name = scalar_name(
            &db,
            "SELECT treatment_name FROM dim_treatment WHERE treatment_id=1",
        )
        .await;
        assert_eq!(name.as_deref(), Some("Old Name"));

        let admin_table: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'dim_administration_type'",
        )
        .fetch_optional(db.pool())
        .await
        .expect("sqlite_master");
        assert!(admin_table.is_none(), "failed run must not leave new tables behind");
    }

    #[tokio::test]
    async fn late_conflict_rolls_back_earlier_inserts() {
        let (_dir, db) = fresh_db().await;
        db.initializer().ensure_schema().await.expect("schema");
        sqlx::query("INSERT INTO dim_administration_type VALUES (3, 'IV_C')")
            .execute(db.pool())
            .await
            .expect("insert");

        let err = db.initializer().run().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::ConstraintViolation { table: "dim_administration_type", id: 3, .. }
        ));

        assert_eq!(table_count(&db, "dim_treatment").await, 0);
        assert_eq!(table_count(&db, "dim_administration_type").await, 1);
        let name = scalar_name(
            &db,
            "SELECT administration_type_name FROM dim_administration_type \
             WHERE administration_type_id=3",
        )
        .await;
        assert_eq!(name.as_deref(), Some("IV_C"));
    }

    #[tokio::test]
    async fn incompatible_table_is_a_schema_conflict() {
        let (_dir, db) = fresh_db().await;
        sqlx::query("CREATE TABLE dim_treatment (treatment_id TEXT PRIMARY KEY, treatment_name TEXT NOT NULL)")
            .execute(db.pool())
            .await
            .expect("create");

        let err = db.initializer().run().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::SchemaConflict { table: "dim_treatment", .. }
        ));
    }

    #[tokio::test]
    async fn missing_name_column_is_a_schema_conflict() {
        let (_dir, db) = fresh_db().await;
        sqlx::query("CREATE TABLE dim_administration_type (administration_type_id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .execute(db.pool())
            .await
            .expect("create");

        let err = db.initializer().run().await.unwrap_err();
        match err {
            StorageError::SchemaConflict { table, detail } => {
                assert_eq!(table, "dim_administration_type");
                assert!(detail.contains("administration_type_name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn legacy_layout_with_descriptions_is_accepted() {
        let (_dir, db) = fresh_db().await;
        sqlx::query(
            "CREATE TABLE dim_treatment (\
                treatment_id INTEGER PRIMARY KEY, \
                treatment_name TEXT NOT NULL, \
                treatment_description TEXT, \
                rec_create_time BIGINT, \
                rec_modified_time BIGINT)",
        )
        .execute(db.pool())
        .await
        .expect("create");
        sqlx::query(
            "INSERT INTO dim_treatment VALUES (1, 'Insulin Therapy', 'Administering insulin', 0, 0)",
        )
        .execute(db.pool())
        .await
        .expect("insert");

        let report = db.initializer().run().await.expect("run");
        assert_eq!(report.treatments.already_present, 1);
        assert_eq!(report.treatments.inserted, 2);
        assert_eq!(report.treatments.total_rows, 3);
    }

    #[tokio::test]
    async fn rows_outside_the_reference_set_are_kept() {
        let (_dir, db) = fresh_db().await;
        let initializer = db.initializer();
        initializer.ensure_schema().await.expect("schema");
        sqlx::query("INSERT INTO dim_administration_type VALUES (5, 'IV_5')")
            .execute(db.pool())
            .await
            .expect("insert");

        let report = initializer.run().await.expect("run");
        assert_eq!(report.administration_types.inserted, 4);
        assert_eq!(report.administration_types.total_rows, 5);

        let extra = db
            .administration_types()
            .get_by_id(5)
            .await
            .expect("query")
            .expect("row kept");
        assert_eq!(extra.administration_type_name, "IV_5");
    }

    #[tokio::test]
    async fn steps_can_run_individually() {
        let (_dir, db) = fresh_db().await;
        let initializer = db.initializer();

        assert!(initializer.verify_schema().await.is_err());
        initializer.ensure_schema().await.expect("schema");
        initializer.ensure_schema().await.expect("schema again");
        initializer.verify_schema().await.expect("verify");

        let report = initializer.seed().await.expect("seed");
        assert_eq!(report.treatments.inserted, 3);
        assert_eq!(report.administration_types.inserted, 4);
    }

    #[tokio::test]
    async fn seeding_without_tables_fails() {
        let (_dir, db) = fresh_db().await;
        let err = db.initializer().seed().await.unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
    }
}
