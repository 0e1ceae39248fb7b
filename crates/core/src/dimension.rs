use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed `(id, name)` pair guaranteed to exist in a dimension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRow {
    pub id: i64,
    pub name: &'static str,
}

impl SeedRow {
    const fn new(id: i64, name: &'static str) -> Self {
        Self { id, name }
    }
}

pub const TREATMENT_SEED: &[SeedRow] = &[
    SeedRow::new(1, "Insulin Therapy"),
    SeedRow::new(2, "Fluid Replacement"),
    SeedRow::new(3, "Electrolyte Replacement"),
];

pub const ADMINISTRATION_TYPE_SEED: &[SeedRow] = &[
    SeedRow::new(1, "IV_1"),
    SeedRow::new(2, "IV_2"),
    SeedRow::new(3, "IV_3"),
    SeedRow::new(4, "IV_4"),
];

/// Reference data stored in a two-column lookup table keyed by an integer id.
///
/// Implementors describe where their rows live and which rows must always
/// be present; the storage layer drives table creation, seeding, and lookup
/// from these descriptors.
pub trait Dimension: Sized + Send + Unpin + 'static {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    const NAME_COLUMN: &'static str;
    const SEED: &'static [SeedRow];

    /// Builds a row, enforcing the non-empty name invariant.
    fn from_parts(id: i64, name: String) -> Result<Self, DimensionError>;

    fn id(&self) -> i64;

    fn name(&self) -> &str;
}

/// Named category of clinical intervention, e.g. insulin therapy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub treatment_id: i64,
    pub treatment_name: String,
}

impl Treatment {
    pub fn new(
        treatment_id: i64,
        treatment_name: impl Into<String>,
    ) -> Result<Self, DimensionError> {
        let treatment_name = non_empty(Self::TABLE, treatment_id, treatment_name.into())?;
        Ok(Self {
            treatment_id,
            treatment_name,
        })
    }
}

impl Dimension for Treatment {
    const TABLE: &'static str = "dim_treatment";
    const ID_COLUMN: &'static str = "treatment_id";
    const NAME_COLUMN: &'static str = "treatment_name";
    const SEED: &'static [SeedRow] = TREATMENT_SEED;

    fn from_parts(id: i64, name: String) -> Result<Self, DimensionError> {
        Self::new(id, name)
    }

    fn id(&self) -> i64 {
        self.treatment_id
    }

    fn name(&self) -> &str {
        &self.treatment_name
    }
}

/// Route or channel through which a treatment is delivered, e.g. an IV line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrationType {
    pub administration_type_id: i64,
    pub administration_type_name: String,
}

impl AdministrationType {
    pub fn new(
        administration_type_id: i64,
        administration_type_name: impl Into<String>,
    ) -> Result<Self, DimensionError> {
        let administration_type_name = non_empty(
            Self::TABLE,
            administration_type_id,
            administration_type_name.into(),
        )?;
        Ok(Self {
            administration_type_id,
            administration_type_name,
        })
    }
}

impl Dimension for AdministrationType {
    const TABLE: &'static str = "dim_administration_type";
    const ID_COLUMN: &'static str = "administration_type_id";
    const NAME_COLUMN: &'static str = "administration_type_name";
    const SEED: &'static [SeedRow] = ADMINISTRATION_TYPE_SEED;

    fn from_parts(id: i64, name: String) -> Result<Self, DimensionError> {
        Self::new(id, name)
    }

    fn id(&self) -> i64 {
        self.administration_type_id
    }

    fn name(&self) -> &str {
        &self.administration_type_name
    }
}

/// Errors raised when a dimension row breaks its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimensionError {
    #[error("{table} row {id} has an empty name")]
    EmptyName { table: &'static str, id: i64 },
    #[error("{table} declares id {id} more than once")]
    DuplicateId { table: &'static str, id: i64 },
}

/// Checks that a seed set has unique ids and non-empty names.
pub fn validate_seed(table: &'static str, rows: &[SeedRow]) -> Result<(), DimensionError> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if row.name.trim().is_empty() {
            return Err(DimensionError::EmptyName { table, id: row.id });
        }
        if !seen.insert(row.id) {
            return Err(DimensionError::DuplicateId { table, id: row.id });
        }
    }
    Ok(())
}

fn non_empty(table: &'static str, id: i64, name: String) -> Result<String, DimensionError> {
    if name.trim().is_empty() {
        return Err(DimensionError::EmptyName { table, id });
    }
    Ok(name)
}
