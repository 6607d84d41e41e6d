//! Query-result grid subsystem of a desktop database client: tabular payload
//! model, grid controller, result diffing, export, query caching, request
//! deduplication and backend error normalization. Rendering and transport are
//! the embedding application's business.

pub mod grid;
pub mod logging;
pub mod services;

pub use grid::{GridController, GridSession};
pub use services::database::{CellValue, ColumnMetadata, QueryResult};
