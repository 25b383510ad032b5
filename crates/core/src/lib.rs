//! Keeps a strategy scaling table, a directory of transformation documents and
//! the strategy registry in step with each other.

mod builder;
mod document;
mod error;
mod mapping;
mod region;
mod registry;
mod scaling;
mod table;

pub use builder::{build_code, NewStrategy, StrategyChange, StrategyRegistryBuilder};
pub use document::{DocumentStore, MagnitudeSlot, TransformationDocument};
pub use error::{Result, SyncError};
pub use mapping::{GroupMapping, IdRange};
pub use region::{RegionConfig, NOT_FOUND};
pub use registry::{StrategyRegistry, StrategyRow, REGISTRY_HEADER};
pub use scaling::{
    derived_document_name, derived_transformation_name, MissingMagnitudePolicy, PairFailure,
    PairResult, ScaleOutcome, ScalingEngine, ScalingReport,
};
pub use table::{
    add_missing_columns, compare_columns, derived_transformation_code, ColumnDiff, RawTable,
    ScalarCell, ScalingRow, ScalingTable, DEFAULT_SHEET,
};
