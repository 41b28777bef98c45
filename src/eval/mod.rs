//! Metric evaluation.
//!
//! Walks the registry's topologically sorted stages and evaluates each
//! metric's formula as a pure function over resolved inputs: fact views,
//! the as-of cost timeline, the window ranker, and metric tables produced
//! by earlier stages. Every intermediate result is a [`Covered`] value, so
//! coverage flags propagate by construction.
//!
//! After each formula runs, output keys are checked against the declared
//! granularity: a duplicate key is a grain violation, the offending
//! partition is excluded from this run's output, and the rest of the run
//! continues.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::engine::asof::CostTimeline;
use crate::engine::coverage::{fx_rate_for, Covered};
use crate::engine::rank::{fefo_ordering, rank_partitions};
use crate::facts::{FactSet, PartitionKey, Period, Shipment};
use crate::registry::{ExceptionPolicy, FormulaRef, MetricRegistry, MetricSpec};

/// Trailing demand window, in days, for shipment-velocity metrics.
pub const DEMAND_WINDOW_DAYS: i64 = 30;

/// One metric's evaluated rows, keyed by partition.
pub type MetricTable = BTreeMap<PartitionKey, Covered<f64>>;

/// More than one row resolved to the same granularity key. Fatal for that
/// partition only; it is excluded from the run and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Grain violation: metric '{metric}' produced duplicate rows for key '{key}'")]
pub struct GrainViolation {
    pub metric: String,
    pub key: PartitionKey,
}

/// Result of evaluating the full registry against one fact set.
#[derive(Debug, Default)]
pub struct EvalOutput {
    /// Metric name -> evaluated table, in registry order.
    pub metrics: BTreeMap<String, MetricTable>,
    pub violations: Vec<GrainViolation>,
}

struct Ctx<'a> {
    facts: &'a FactSet,
    costs: CostTimeline,
    as_of: NaiveDate,
    base_currency: &'a str,
    prior: BTreeMap<String, MetricTable>,
}

impl<'a> Ctx<'a> {
    fn sales_shipments(&self) -> impl Iterator<Item = &Shipment> {
        self.facts
            .shipments
            .iter()
            .filter(|s| s.channel_order_id.is_some())
    }

    fn prior_table(&self, name: &str) -> &MetricTable {
        static EMPTY: once_cell::sync::Lazy<MetricTable> =
            once_cell::sync::Lazy::new(BTreeMap::new);
        self.prior.get(name).unwrap_or(&EMPTY)
    }
}

/// Evaluate every registry metric in stage order.
pub fn evaluate(facts: &FactSet, registry: &MetricRegistry, as_of: NaiveDate) -> EvalOutput {
    let mut ctx = Ctx {
        facts,
        costs: CostTimeline::from_components(&facts.cost_components),
        as_of,
        base_currency: registry.base_currency(),
        prior: BTreeMap::new(),
    };
    let mut output = EvalOutput::default();

    for stage in registry.stages() {
        for spec in stage {
            let rows = formula_rows(&ctx, spec);
            let (table, mut violations) = enforce_grain(spec, rows);
            output.violations.append(&mut violations);
            ctx.prior.insert(spec.name.clone(), table.clone());
            output.metrics.insert(spec.name.clone(), table);
        }
    }
    output
}

/// Collapse formula rows into a keyed table, excluding any key that more
/// than one row resolved to (fail-whole for that partition).
fn enforce_grain(
    spec: &MetricSpec,
    rows: Vec<(PartitionKey, Covered<f64>)>,
) -> (MetricTable, Vec<GrainViolation>) {
    let mut counts: BTreeMap<PartitionKey, usize> = BTreeMap::new();
    for (key, _) in &rows {
        *counts.entry(key.clone()).or_insert(0) += 1;
    }
    let violations: Vec<GrainViolation> = counts
        .iter()
        .filter(|(_, &n)| n > 1)
        .map(|(key, _)| GrainViolation {
            metric: spec.name.clone(),
            key: key.clone(),
        })
        .collect();

    let mut table = MetricTable::new();
    for (key, value) in rows {
        if counts.get(&key).copied().unwrap_or(0) == 1 {
            table.insert(key, value);
        }
    }
    (table, violations)
}

fn formula_rows(ctx: &Ctx<'_>, spec: &MetricSpec) -> Vec<(PartitionKey, Covered<f64>)> {
    match spec.formula {
        FormulaRef::OnHandQty => snapshot_sum(ctx, |r| r.on_hand_qty),
        FormulaRef::ExpiredQty => snapshot_sum(ctx, |r| r.expired_qty),
        FormulaRef::SellableQty => sellable_qty(ctx),
        FormulaRef::FefoRank => fefo_rank(ctx),
        FormulaRef::ExpiryRiskValue => expiry_risk_value(ctx),
        FormulaRef::AvgDailyShipped => avg_daily_shipped(ctx),
        FormulaRef::DaysOnHand => days_on_hand(ctx, spec),
        FormulaRef::InventoryTurnover => inventory_turnover(ctx, spec),
        FormulaRef::OpenPoQty => open_po_qty(ctx),
        FormulaRef::PoDelayDays => po_delay_days(ctx),
        FormulaRef::PoLeadDays => po_lead_days(ctx),
        FormulaRef::FulfillmentRate => fulfillment_rate(ctx),
        FormulaRef::OnTimeShipRate => on_time_ship_rate(ctx),
        FormulaRef::LandedUnitCost => landed_unit_cost(ctx),
        FormulaRef::Cogs => cogs(ctx),
        FormulaRef::GrossSales => settlement_amount(ctx, |s| s.gross_sales),
        FormulaRef::NetRevenue => {
            settlement_amount(ctx, |s| s.gross_sales - s.discounts - s.refunds)
        }
        FormulaRef::RefundRate => refund_rate(ctx),
        FormulaRef::GrossMargin => gross_margin(ctx, spec),
        FormulaRef::ContributionShare => contribution_share(ctx, spec),
    }
}

/// Ratio with the demand-normalized exception: a zero denominator clamps to
/// the declared ceiling instead of going undefined or unbounded.
fn clamp_ratio(numerator: f64, denominator: f64, ceiling: f64) -> f64 {
    if denominator == 0.0 {
        ceiling
    } else {
        numerator / denominator
    }
}

fn ratio_ceiling(policy: &ExceptionPolicy) -> f64 {
    match policy {
        ExceptionPolicy::ClampRatio { ceiling } => *ceiling,
        _ => crate::registry::catalog::RATIO_CEILING,
    }
}

// ---------------------------------------------------------------------------
// Inventory formulas
// ---------------------------------------------------------------------------

fn snapshot_sum(
    ctx: &Ctx<'_>,
    qty: impl Fn(&crate::facts::InventorySnapshot) -> f64,
) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for r in &ctx.facts.inventory {
        let key = PartitionKey::new([r.item.clone(), r.warehouse.clone(), r.date.to_string()]);
        *groups.entry(key).or_insert(0.0) += qty(r);
    }
    groups
        .into_iter()
        .map(|(k, v)| (k, Covered::actual(v)))
        .collect()
}

fn sellable_qty(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    ctx.facts
        .inventory
        .iter()
        .map(|r| {
            let sellable =
                (r.on_hand_qty - r.reserved_qty - r.damaged_qty - r.expired_qty).max(0.0);
            let key = PartitionKey::new([
                r.item.clone(),
                r.warehouse.clone(),
                r.lot_id.clone(),
                r.date.to_string(),
            ]);
            (key, Covered::actual(sellable))
        })
        .collect()
}

fn fefo_rank(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let rows = &ctx.facts.inventory;
    let ranks = rank_partitions(
        rows,
        |r| format!("{}|{}|{}", r.item, r.warehouse, r.date),
        |a, b| fefo_ordering(a.expiry_date, &a.lot_id, b.expiry_date, &b.lot_id),
    );
    rows.iter()
        .zip(ranks)
        .map(|(r, rank)| {
            let key = PartitionKey::new([
                r.item.clone(),
                r.warehouse.clone(),
                r.lot_id.clone(),
                r.date.to_string(),
            ]);
            (key, Covered::actual(rank as f64))
        })
        .collect()
}

fn expiry_risk_value(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, (String, NaiveDate, f64)> = BTreeMap::new();
    for r in &ctx.facts.inventory {
        let key = PartitionKey::new([r.item.clone(), r.warehouse.clone(), r.date.to_string()]);
        let entry = groups
            .entry(key)
            .or_insert_with(|| (r.item.clone(), r.date, 0.0));
        entry.2 += r.on_hand_qty;
    }
    groups
        .into_iter()
        .map(|(key, (item, date, on_hand))| {
            // Missing cost stays missing; risk value is never zero-filled.
            let cost = Covered::from_option(
                ctx.costs.resolve(&item, date).map(|c| c.unit_cost),
            );
            (key, cost.map(|c| c * on_hand))
        })
        .collect()
}

fn avg_daily_shipped(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let window_start = ctx.as_of - Duration::days(DEMAND_WINDOW_DAYS - 1);
    let mut groups: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    // Every inventoried group gets a row: zero observed demand is a
    // value, not a coverage gap.
    for r in &ctx.facts.inventory {
        groups
            .entry(PartitionKey::new([r.item.clone(), r.warehouse.clone()]))
            .or_insert(0.0);
    }
    for s in ctx.sales_shipments() {
        if s.date < window_start || s.date > ctx.as_of {
            continue;
        }
        let key = PartitionKey::new([s.item.clone(), s.warehouse.clone()]);
        *groups.entry(key).or_insert(0.0) += s.shipped_qty;
    }
    groups
        .into_iter()
        .map(|(k, total)| (k, Covered::actual(total / DEMAND_WINDOW_DAYS as f64)))
        .collect()
}

fn days_on_hand(ctx: &Ctx<'_>, spec: &MetricSpec) -> Vec<(PartitionKey, Covered<f64>)> {
    let ceiling = ratio_ceiling(&spec.policy);
    // Prior tables resolve through depends_on, so renamed registry
    // entries feed the right tables. Arity is validated at load.
    let sellable = ctx.prior_table(&spec.depends_on[0]);
    let avg_shipped = ctx.prior_table(&spec.depends_on[1]);

    // Latest snapshot date per (item, warehouse); sellable keys are
    // (item, warehouse, lot, date) with ISO dates, so max string = max date.
    let mut latest: BTreeMap<PartitionKey, String> = BTreeMap::new();
    for key in sellable.keys() {
        let group = key.prefix(2);
        let date = key.values()[3].clone();
        let entry = latest.entry(group).or_default();
        if date > *entry {
            *entry = date;
        }
    }

    let mut rows = Vec::new();
    for (group, date) in latest {
        let mut total = Covered::actual(0.0);
        for (key, value) in sellable {
            if key.prefix(2) == group && key.values()[3] == date {
                total = total.zip_with(*value, |a, b| a + b);
            }
        }
        // No shipment group means zero observed demand, not missing data.
        let avg = avg_shipped
            .get(&group)
            .copied()
            .unwrap_or_else(|| Covered::actual(0.0));
        let doh = total.zip_with(avg, |qty, daily| clamp_ratio(qty, daily, ceiling));
        rows.push((group, doh));
    }
    rows
}

fn inventory_turnover(ctx: &Ctx<'_>, spec: &MetricSpec) -> Vec<(PartitionKey, Covered<f64>)> {
    let window_start = ctx.as_of - Duration::days(DEMAND_WINDOW_DAYS - 1);
    let mut shipped: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for s in ctx.sales_shipments() {
        if s.date < window_start || s.date > ctx.as_of {
            continue;
        }
        let key = PartitionKey::new([s.item.clone(), s.warehouse.clone()]);
        *shipped.entry(key).or_insert(0.0) += s.shipped_qty;
    }

    // Mean on-hand over the snapshot dates each group was observed.
    let on_hand = ctx.prior_table(&spec.depends_on[0]);
    let mut sums: BTreeMap<PartitionKey, (f64, usize)> = BTreeMap::new();
    for (key, value) in on_hand {
        let group = key.prefix(2);
        let entry = sums.entry(group).or_insert((0.0, 0));
        entry.0 += value.value.unwrap_or(0.0);
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(group, (total, n))| {
            let mean_on_hand = total / n as f64;
            let qty = shipped.get(&group).copied().unwrap_or(0.0);
            let turns = clamp_ratio(qty, mean_on_hand, crate::registry::catalog::RATIO_CEILING);
            (group, Covered::actual(turns))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Procurement formulas
// ---------------------------------------------------------------------------

fn open_po_qty(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for po in &ctx.facts.purchase_orders {
        if !po.status.is_open() {
            continue;
        }
        let key = PartitionKey::new([po.vendor.clone(), po.item.clone()]);
        *groups.entry(key).or_insert(0.0) += po.pending_qty;
    }
    groups
        .into_iter()
        .map(|(k, v)| (k, Covered::actual(v)))
        .collect()
}

fn po_delay_days(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for po in &ctx.facts.purchase_orders {
        if !po.status.is_open() {
            continue;
        }
        let delay = match po.expected_delivery_date {
            Some(eta) if eta < ctx.as_of => (ctx.as_of - eta).num_days() as f64,
            _ => 0.0,
        };
        let key = PartitionKey::new([po.vendor.clone(), po.item.clone()]);
        let entry = groups.entry(key).or_insert(0.0);
        *entry = entry.max(delay);
    }
    groups
        .into_iter()
        .map(|(k, v)| (k, Covered::actual(v)))
        .collect()
}

fn po_lead_days(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    // First receipt date per PO.
    let mut first_receipt: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for r in &ctx.facts.receipts {
        let entry = first_receipt.entry(r.po_id.as_str()).or_insert(r.receipt_date);
        if r.receipt_date < *entry {
            *entry = r.receipt_date;
        }
    }

    // Mean realized lead time over the POs that have received anything;
    // a group with no receipts yet has no lead time, which is a coverage
    // signal rather than zero.
    let mut groups: BTreeMap<PartitionKey, (f64, usize, usize)> = BTreeMap::new();
    for po in &ctx.facts.purchase_orders {
        let key = PartitionKey::new([po.vendor.clone(), po.item.clone()]);
        let entry = groups.entry(key).or_insert((0.0, 0, 0));
        entry.2 += 1;
        if let Some(receipt_date) = first_receipt.get(po.po_id.as_str()) {
            entry.0 += (*receipt_date - po.order_date).num_days() as f64;
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .map(|(key, (total, received, _))| {
            let value = if received == 0 {
                Covered::missing()
            } else {
                Covered::actual(total / received as f64)
            };
            (key, value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fulfillment formulas
// ---------------------------------------------------------------------------

fn fulfillment_rate(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut ordered: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for o in &ctx.facts.orders {
        let key = PartitionKey::new([
            Period::from_date(o.date).to_string(),
            o.item.clone(),
            o.channel.clone(),
        ]);
        *ordered.entry(key).or_insert(0.0) += o.ordered_qty;
    }

    let mut shipped: BTreeMap<PartitionKey, f64> = BTreeMap::new();
    for s in &ctx.facts.shipments {
        let Some(channel) = &s.channel else { continue };
        let key = PartitionKey::new([
            Period::from_date(s.date).to_string(),
            s.item.clone(),
            channel.clone(),
        ]);
        *shipped.entry(key).or_insert(0.0) += s.shipped_qty;
    }

    // Keyed by the demand side: a shipment with no matching order is
    // invisible here (it surfaces in reconciliation, not fulfillment).
    ordered
        .into_iter()
        .map(|(key, qty_ordered)| {
            let qty_shipped = shipped.get(&key).copied().unwrap_or(0.0);
            let value = if qty_ordered == 0.0 {
                Covered::missing()
            } else {
                Covered::actual(qty_shipped / qty_ordered)
            };
            (key, value)
        })
        .collect()
}

fn on_time_ship_rate(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    // Earliest actual ship date per channel order.
    let mut earliest: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for s in ctx.sales_shipments() {
        let Some(id) = &s.channel_order_id else { continue };
        let entry = earliest.entry(id.as_str()).or_insert(s.actual_ship_date);
        if s.actual_ship_date < *entry {
            *entry = s.actual_ship_date;
        }
    }

    let mut groups: BTreeMap<PartitionKey, (usize, usize)> = BTreeMap::new();
    for o in &ctx.facts.orders {
        let (Some(order_id), Some(promised)) = (&o.channel_order_id, o.promised_ship_date)
        else {
            continue;
        };
        let key = PartitionKey::new([Period::from_date(o.date).to_string(), o.channel.clone()]);
        let entry = groups.entry(key).or_insert((0, 0));
        entry.1 += 1;
        // An order never shipped is late, not unknown.
        if earliest
            .get(order_id.as_str())
            .is_some_and(|ship| *ship <= promised)
        {
            entry.0 += 1;
        }
    }

    groups
        .into_iter()
        .map(|(key, (on_time, total))| {
            let value = if total == 0 {
                Covered::missing()
            } else {
                Covered::actual(on_time as f64 / total as f64)
            };
            (key, value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cost & P&L formulas
// ---------------------------------------------------------------------------

fn landed_unit_cost(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let items = crate::facts::distinct(&ctx.facts.cost_components, |c| c.item.as_str());
    items
        .into_iter()
        .map(|item| {
            let value = match ctx.costs.resolve(&item, ctx.as_of) {
                // Additive rollup: the sum carries whatever components
                // exist, but the flag is only Actual when all expected
                // kinds are present.
                Some(cost) if cost.complete() => Covered::actual(cost.unit_cost),
                Some(cost) => Covered::partial(cost.unit_cost),
                None => Covered::missing(),
            };
            (PartitionKey::new([item]), value)
        })
        .collect()
}

fn cogs(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, (String, Period, f64)> = BTreeMap::new();
    for s in ctx.sales_shipments() {
        let period = Period::from_date(s.date);
        let channel = s.channel.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        let key = PartitionKey::new([period.to_string(), s.item.clone(), channel]);
        let entry = groups
            .entry(key)
            .or_insert_with(|| (s.item.clone(), period, 0.0));
        entry.2 += s.shipped_qty;
    }

    groups
        .into_iter()
        .map(|(key, (item, period, qty))| {
            let cost = Covered::from_option(
                ctx.costs
                    .resolve(&item, period.last_day())
                    .map(|c| c.unit_cost),
            );
            (key, cost.map(|c| c * qty))
        })
        .collect()
}

fn settlement_amount(
    ctx: &Ctx<'_>,
    amount: impl Fn(&crate::facts::Settlement) -> f64,
) -> Vec<(PartitionKey, Covered<f64>)> {
    let mut groups: BTreeMap<PartitionKey, Covered<f64>> = BTreeMap::new();
    for s in &ctx.facts.settlements {
        let rate = fx_rate_for(&s.currency, ctx.base_currency, s.fx_rate);
        let converted = rate.map(|r| amount(s) * r);
        let key = PartitionKey::new([
            s.period.to_string(),
            s.item.clone(),
            s.channel.clone(),
            s.country.clone(),
        ]);
        let entry = groups.entry(key).or_insert_with(|| Covered::actual(0.0));
        *entry = entry.zip_with(converted, |a, b| a + b);
    }
    groups.into_iter().collect()
}

fn refund_rate(ctx: &Ctx<'_>) -> Vec<(PartitionKey, Covered<f64>)> {
    // Local-currency ratio: both sides share the denomination, so no FX
    // input is required.
    let mut groups: BTreeMap<PartitionKey, (f64, f64)> = BTreeMap::new();
    for s in &ctx.facts.settlements {
        let key = PartitionKey::new([
            s.period.to_string(),
            s.item.clone(),
            s.channel.clone(),
            s.country.clone(),
        ]);
        let entry = groups.entry(key).or_insert((0.0, 0.0));
        entry.0 += s.refunds;
        entry.1 += s.gross_sales;
    }
    groups
        .into_iter()
        .map(|(key, (refunds, gross))| {
            let value = if gross == 0.0 {
                Covered::missing()
            } else {
                Covered::actual(refunds / gross)
            };
            (key, value)
        })
        .collect()
}

fn gross_margin(ctx: &Ctx<'_>, spec: &MetricSpec) -> Vec<(PartitionKey, Covered<f64>)> {
    // Collapse the revenue side's country dimension onto the margin grain.
    let net_revenue = ctx.prior_table(&spec.depends_on[0]);
    let mut revenue: BTreeMap<PartitionKey, Covered<f64>> = BTreeMap::new();
    for (key, value) in net_revenue {
        let group = key.prefix(3);
        let entry = revenue.entry(group).or_insert_with(|| Covered::actual(0.0));
        *entry = entry.zip_with(*value, |a, b| a + b);
    }

    let cogs = ctx.prior_table(&spec.depends_on[1]);
    let mut keys: Vec<&PartitionKey> = revenue.keys().chain(cogs.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .map(|key| {
            // A side absent at this key is a missing input for the margin
            // formula itself: the value stays missing, never zero-filled.
            let r = revenue.get(key).copied().unwrap_or_else(Covered::missing);
            let c = cogs.get(key).copied().unwrap_or_else(Covered::missing);
            (key.clone(), r.zip_with(c, |rev, cost| rev - cost))
        })
        .collect()
}

fn contribution_share(ctx: &Ctx<'_>, spec: &MetricSpec) -> Vec<(PartitionKey, Covered<f64>)> {
    debug_assert_eq!(spec.policy, ExceptionPolicy::SharedSnapshot);

    // Re-key revenue rows (period, item, channel, country) to the share
    // grain (period, channel, item), collapsing country.
    let net_revenue = ctx.prior_table(&spec.depends_on[0]);
    let mut items: BTreeMap<PartitionKey, Covered<f64>> = BTreeMap::new();
    for (key, value) in net_revenue {
        let v = key.values();
        let group = PartitionKey::new([v[0].clone(), v[2].clone(), v[1].clone()]);
        let entry = items.entry(group).or_insert_with(|| Covered::actual(0.0));
        *entry = entry.zip_with(*value, |a, b| a + b);
    }

    // Numerator and denominator come from the same snapshot of the
    // partition: the denominator is the sum over exactly the item rows
    // being divided, so shares per (period, channel) sum to 1 whenever the
    // partition is fully covered.
    let mut totals: BTreeMap<PartitionKey, Covered<f64>> = BTreeMap::new();
    for (key, value) in &items {
        let partition = key.prefix(2);
        let entry = totals
            .entry(partition)
            .or_insert_with(|| Covered::actual(0.0));
        *entry = entry.zip_with(*value, |a, b| a + b);
    }

    items
        .into_iter()
        .map(|(key, value)| {
            let total = totals
                .get(&key.prefix(2))
                .copied()
                .unwrap_or_else(Covered::missing);
            let pair = value.zip_with(total, |v, t| (v, t));
            // Zero partition total leaves the share undefined; missing
            // keeps the NULL value paired with a PARTIAL flag.
            let share = match pair.value {
                Some((v, t)) if t != 0.0 => Covered {
                    value: Some(v / t),
                    flag: pair.flag,
                },
                _ => Covered::missing(),
            };
            (key, share)
        })
        .collect()
}
