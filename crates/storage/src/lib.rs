//! Storage layer for revstore
//!
//! This crate implements the relational backend the revision logs sit on:
//! - Table: append-only, revision-ordered rows behind a RwLock
//! - Transaction: per-transaction staging, validated and applied atomically
//! - Sequence: locked allocation rows that restore themselves on rollback
//! - RowCursor: paged newest-first scans with a commit snapshot
//!
//! Tables expose insert, exact lookup and predicate scans only. Nothing is
//! ever updated or deleted in place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod database;
pub mod sequence;
pub mod table;
pub mod transaction;

pub use cursor::RowCursor;
pub use database::Database;
pub use sequence::Sequence;
pub use table::{RowKey, Table, DEFAULT_PAGE_SIZE};
pub use transaction::{ReadView, Transaction, TransactionStatus, TxnId};
