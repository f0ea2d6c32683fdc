//! # scd-pattern
//!
//! Generates the SQL and table mapping that keep a slowly changing dimension
//! history of a source table.
//!
//! - **SCD2** versions rows with validity intervals (`start_date`, `end_date`, `actual`).
//! - **SCD4** appends a full snapshot of the source on every run.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use scd_pattern::prelude::*;
//!
//! let config = ComponentConfig::load("config.json".as_ref())?;
//! let catalog = JsonCatalog::open("storage.json")?;
//!
//! let result = generate(&config, &catalog)?;
//! for statement in result.statements() {
//!     println!("{}", statement);
//! }
//! ```
//!
//! ## Pipeline
//!
//! | Step | Module |
//! |------|--------|
//! | find the source table, read its schema | [`resolver`] |
//! | validate and build parameters | [`resolver`], [`parameters`] |
//! | compute template variables | [`pattern`] |
//! | render SQL | [`template`] |
//! | name the snapshot table | [`table_id`] |
//! | assemble mapping | [`mapping`] |
//! | split into statements | [`blocks`] |

pub mod backend;
pub mod blocks;
pub mod columns;
pub mod config;
pub mod error;
pub mod generator;
pub mod mapping;
pub mod parameters;
pub mod pattern;
pub mod resolver;
pub mod storage;
pub mod table_id;
pub mod template;

pub mod prelude {
    pub use crate::backend::{Backend, Quoting};
    pub use crate::blocks::{generate_blocks, split_statements, Block, Code};
    pub use crate::columns::{ColumnDefinition, ColumnType};
    pub use crate::config::{ComponentConfig, RuntimeConfig, ScdConfig};
    pub use crate::error::*;
    pub use crate::generator::{
        generate, generate_with_snapshot, resolve, GenerationResult, ResolvedPattern,
    };
    pub use crate::mapping::TableDescriptor;
    pub use crate::parameters::{FlagValues, Parameters};
    pub use crate::pattern::{SnapshotSchema, Variant};
    pub use crate::storage::{
        JsonCatalog, SchemaLookup, StorageError, StorageResult, TableDetail, TableLifecycle,
    };
    pub use crate::table_id::{TableId, TableIdGenerator};
}

pub use generator::generate;
