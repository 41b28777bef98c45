//! Built-in metric catalog.
//!
//! The fixed set of inventory, fulfillment, procurement, and P&L metrics
//! the engine knows how to compute. A registry TOML file can select a
//! subset or retarget mart tables, but formulas always resolve to one of
//! these entries.

use once_cell::sync::Lazy;

use super::{ExceptionPolicy, FormulaRef, InputKind, MetricRegistry, MetricSpec, RegistryError};
use crate::facts::Granularity;

/// Default base reporting currency.
pub const DEFAULT_BASE_CURRENCY: &str = "KRW";

/// Ratio ceiling applied when a demand denominator is zero.
pub const RATIO_CEILING: f64 = 999.0;

fn spec(
    name: &str,
    dims: &[&str],
    inputs: &[InputKind],
    depends_on: &[&str],
    formula: FormulaRef,
    policy: ExceptionPolicy,
    mart_table: &str,
    rollup: Option<&[&str]>,
) -> MetricSpec {
    MetricSpec {
        name: name.to_string(),
        granularity: Granularity::new(dims.iter().copied()),
        required_inputs: inputs.to_vec(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        formula,
        policy,
        mart_table: mart_table.to_string(),
        rollup: rollup.map(|dims| dims.iter().map(|s| s.to_string()).collect()),
    }
}

static BUILTIN: Lazy<Vec<MetricSpec>> = Lazy::new(|| {
    use ExceptionPolicy as P;
    use FormulaRef as F;
    use InputKind as I;

    vec![
        spec(
            "on_hand_qty",
            &["item", "warehouse", "date"],
            &[I::InventorySnapshots],
            &[],
            F::OnHandQty,
            P::None,
            "mart_inventory_onhand",
            None,
        ),
        spec(
            "expired_qty",
            &["item", "warehouse", "date"],
            &[I::InventorySnapshots],
            &[],
            F::ExpiredQty,
            P::None,
            "mart_inventory_onhand",
            None,
        ),
        spec(
            "sellable_qty",
            &["item", "warehouse", "lot", "date"],
            &[I::InventorySnapshots],
            &[],
            F::SellableQty,
            P::None,
            "mart_inventory_lots",
            None,
        ),
        spec(
            "fefo_rank",
            &["item", "warehouse", "lot", "date"],
            &[I::InventorySnapshots],
            &[],
            F::FefoRank,
            P::None,
            "mart_inventory_lots",
            None,
        ),
        spec(
            "expiry_risk_value",
            &["item", "warehouse", "date"],
            &[I::InventorySnapshots, I::CostComponents],
            &[],
            F::ExpiryRiskValue,
            P::None,
            "mart_expiry_risk",
            Some(&["item"]),
        ),
        spec(
            "avg_daily_shipped",
            &["item", "warehouse"],
            &[I::Shipments],
            &[],
            F::AvgDailyShipped,
            P::SalesOnly,
            "mart_inventory_health",
            None,
        ),
        spec(
            "days_on_hand",
            &["item", "warehouse"],
            &[I::InventorySnapshots, I::Shipments],
            &["sellable_qty", "avg_daily_shipped"],
            F::DaysOnHand,
            P::ClampRatio { ceiling: RATIO_CEILING },
            "mart_inventory_health",
            None,
        ),
        spec(
            "inventory_turnover",
            &["item", "warehouse"],
            &[I::InventorySnapshots, I::Shipments],
            &["on_hand_qty"],
            F::InventoryTurnover,
            P::SalesOnly,
            "mart_inventory_health",
            None,
        ),
        spec(
            "open_po_qty",
            &["vendor", "item"],
            &[I::PurchaseOrders],
            &[],
            F::OpenPoQty,
            P::None,
            "mart_open_po",
            None,
        ),
        spec(
            "po_delay_days",
            &["vendor", "item"],
            &[I::PurchaseOrders],
            &[],
            F::PoDelayDays,
            P::None,
            "mart_open_po",
            None,
        ),
        spec(
            "po_lead_days",
            &["vendor", "item"],
            &[I::PurchaseOrders, I::Receipts],
            &[],
            F::PoLeadDays,
            P::None,
            "mart_open_po",
            None,
        ),
        spec(
            "fulfillment_rate",
            &["period", "item", "channel"],
            &[I::Orders, I::Shipments],
            &[],
            F::FulfillmentRate,
            P::None,
            "mart_fulfillment",
            None,
        ),
        spec(
            "on_time_ship_rate",
            &["period", "channel"],
            &[I::Orders, I::Shipments],
            &[],
            F::OnTimeShipRate,
            P::None,
            "mart_service_level",
            None,
        ),
        spec(
            "landed_unit_cost",
            &["item"],
            &[I::CostComponents],
            &[],
            F::LandedUnitCost,
            P::AdditiveRollup,
            "mart_landed_cost",
            None,
        ),
        spec(
            "cogs",
            &["period", "item", "channel"],
            &[I::Shipments, I::CostComponents],
            &[],
            F::Cogs,
            P::SalesOnly,
            "mart_pnl_cogs",
            Some(&["period"]),
        ),
        spec(
            "gross_sales",
            &["period", "item", "channel", "country"],
            &[I::Settlements],
            &[],
            F::GrossSales,
            P::None,
            "mart_pnl_revenue",
            Some(&["period"]),
        ),
        spec(
            "net_revenue",
            &["period", "item", "channel", "country"],
            &[I::Settlements],
            &[],
            F::NetRevenue,
            P::None,
            "mart_pnl_revenue",
            Some(&["period"]),
        ),
        spec(
            "refund_rate",
            &["period", "item", "channel", "country"],
            &[I::Settlements],
            &[],
            F::RefundRate,
            P::None,
            "mart_pnl_revenue",
            None,
        ),
        spec(
            "gross_margin",
            &["period", "item", "channel"],
            &[],
            &["net_revenue", "cogs"],
            F::GrossMargin,
            P::None,
            "mart_pnl_margin",
            Some(&["period"]),
        ),
        spec(
            "contribution_share",
            &["period", "channel", "item"],
            &[],
            &["net_revenue"],
            F::ContributionShare,
            P::SharedSnapshot,
            "mart_contribution",
            None,
        ),
    ]
});

/// The built-in metric specifications.
pub fn builtin_specs() -> Vec<MetricSpec> {
    BUILTIN.clone()
}

/// Registry over the full built-in catalog with the default base currency.
pub fn builtin_registry() -> Result<MetricRegistry, RegistryError> {
    MetricRegistry::new(builtin_specs(), DEFAULT_BASE_CURRENCY)
}
