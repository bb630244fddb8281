//! bankfeed-service: bank statement ingestion and transaction reconciliation.
//!
//! Imported statement lines are linked to business entities (customers,
//! vendors) and open documents (invoices, bills) by a priority-ordered rule
//! engine with a heuristic name/amount scorer behind it, while a guarded
//! state machine keeps each transaction's match status and reconciliation
//! flag consistent under concurrent callers.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod matching;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
