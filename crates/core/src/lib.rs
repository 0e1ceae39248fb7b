//! Domain layer for the DKA reference data.
//!
//! Hosts the lookup entities shared by the storage layer and the bootstrap
//! binary, together with the fixed rows every store must carry.
pub mod dimension;

pub use dimension::{
    validate_seed, AdministrationType, Dimension, DimensionError, SeedRow, Treatment,
    ADMINISTRATION_TYPE_SEED, TREATMENT_SEED,
};
