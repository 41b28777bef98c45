//! # Granary
//!
//! A deterministic KPI computation engine for supply-chain analytics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Facts (immutable inputs)                │
//! │  (inventory, orders, shipments, POs, costs, settlements) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [registry staging]
//! ┌─────────────────────────────────────────────────────────┐
//! │        MetricRegistry (declarative metric catalog)       │
//! │        + dependency stages via topological sort          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [evaluation]
//! ┌─────────────────────────────────────────────────────────┐
//! │    Metric tables (partition key -> coverage-flagged      │
//! │    value), as-of joins, window ranking, dual aggregates  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [materialization]
//! ┌─────────────────────────────────────────────────────────┐
//! │        SQLite mart (idempotent partition rewrite)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod eval;
pub mod facts;
pub mod mart;
pub mod registry;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::engine::aggregate::{dual_sum, dual_sum_by, DualSum};
    pub use crate::engine::asof::{AsOf, CostTimeline, ResolvedCost};
    pub use crate::engine::coverage::{Covered, CoverageFlag};
    pub use crate::engine::rank::{canonical_ordering, fefo_ordering, rank_partitions};
    pub use crate::engine::{Engine, EngineError, RunReport};
    pub use crate::eval::{evaluate, EvalOutput, GrainViolation, MetricTable};
    pub use crate::facts::{
        CostComponent, CostComponentKind, FactRecord, FactSet, FactsError, Granularity,
        InventorySnapshot, Order, PartitionKey, Period, PoStatus, PurchaseOrder, Receipt,
        Settlement, Shipment,
    };
    pub use crate::mart::{MartDb, MartError, MartRow};
    pub use crate::registry::{
        ExceptionPolicy, FormulaRef, InputKind, MetricRegistry, MetricSpec, RegistryError,
    };
}

pub use engine::{Engine, RunReport};
pub use facts::{FactSet, PartitionKey, Period};
pub use registry::MetricRegistry;
