//! Device column views to Arrow host arrays.
//!
//! A conversion walks a [`TableView`] column by column. Each column is routed
//! by its [`TypeId`] to one of four strategies (fixed-width, string,
//! dictionary, list); nested children re-enter the same dispatcher.
//!
//! # Transfer contract
//!
//! Every device-to-host copy is issued asynchronously on the stream held by
//! the [`ExportContext`]. Converters return a [`PendingTable`] describing the
//! Arrow layout; its arrays only become observable through
//! [`PendingTable::wait`], which synchronizes the stream exactly once.
//!
//! ```text
//! TableView ──convert_table──▶ PendingTable ──wait──▶ RecordBatch
//! ```
//!
//! Views with a non-zero offset, or whose children disagree with their size,
//! are first materialized into a zero-offset device copy. That copy is kept
//! alive by the stream until its transfers complete.

pub mod bitmask;
pub mod column_view;
pub mod config;
pub mod context;
mod converters;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod pending;
pub mod schema_utils;
pub mod table;

pub use column_view::{ColumnView, ColumnViewBuilder, OwnedColumn, TableView, TypeId};
pub use config::ExportConfig;
pub use context::ExportContext;
pub use dispatch::{convert, Category};
pub use error::{InteropError, Result};
pub use normalize::{normalize, Normalized};
pub use pending::{PendingArray, PendingTable};
pub use table::{convert_table, export_column, export_table, export_table_with};
