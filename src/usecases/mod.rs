//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the paper trader's workflows.
//!
//! Use cases:
//! - `LedgerStore`: durable active/history bet tables
//! - `PortfolioManager`: paper balance, exposure and reconciliation
//! - `SettlementEngine`: resolution tiers and the single commit path
//! - `PositionManager`: take-profit / stop-loss evaluation
//! - `RiskManager`: stake sizing and opening limits
//! - `MonitorScheduler`: the periodic tick loop
//! - `TraderService`: facade for presentation layers

pub mod ledger_store;
pub mod portfolio_manager;
pub mod position_manager;
pub mod risk_manager;
pub mod scheduler;
pub mod settlement;
pub mod trader;

pub use ledger_store::LedgerStore;
pub use portfolio_manager::PortfolioManager;
pub use position_manager::{PositionAction, PositionManager};
pub use risk_manager::RiskManager;
pub use scheduler::{
  Collaborators, MonitorScheduler, PlacementError, SchedulerHandle, SchedulerState, StartOutcome, TickReport,
};
pub use settlement::{SettleOutcome, SettlementEngine};
pub use trader::{ServiceStatus, TraderService};
