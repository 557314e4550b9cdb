//! Queue task handlers.

pub mod deduct_stock;

pub use deduct_stock::DeductStockWorker;
