//! Invoice/Payout ledger: domain records, persistence, and the
//! reconciliation engine.

pub mod engine;
pub mod model;
pub mod store;

#[cfg(feature = "database")]
pub mod sea_orm_store;

pub use engine::ReconciliationEngine;
pub use model::{Invoice, InvoiceStatus, Payout, PayoutStatus, ProcessedEvent, Reconciliation};
pub use store::{
    InvoiceUpsert, LedgerStore, MemoryLedgerStore, PayoutUpsert, ReconciliationUpsert,
};

#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmLedgerStore;
