//! Typed, read-only fact views.
//!
//! The engine consumes already-loaded fact tables; nothing here fetches or
//! mutates data. A [`FactSet`] is immutable once handed to the engine for a
//! run, and every downstream computation works against slices borrowed from
//! it.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactsError {
    #[error("Failed to read fact file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse fact file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Calendar month, rendered as `YYYY-MM`.
///
/// Settlements arrive pre-bucketed by period; everything else derives its
/// period from an event date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Last calendar day of the period. Used for period-end as-of joins.
    pub fn last_day(&self) -> NaiveDate {
        let (next_y, next_m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_y, next_m, 1)
            .and_then(|first_of_next| first_of_next.pred_opt())
            .unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid period '{}': expected YYYY-MM", s))?;
        let year: i32 = y.parse().map_err(|_| format!("Invalid period year in '{}'", s))?;
        let month: u32 = m.parse().map_err(|_| format!("Invalid period month in '{}'", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("Invalid period month in '{}': {}", s, month));
        }
        Ok(Period { year, month })
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

/// Cost component kinds that make up the landed unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CostComponentKind {
    Inbound,
    Storage,
    Outbound,
    Return,
    Customs,
}

impl CostComponentKind {
    /// Every kind expected for a complete landed cost.
    pub const ALL: [CostComponentKind; 5] = [
        CostComponentKind::Inbound,
        CostComponentKind::Storage,
        CostComponentKind::Outbound,
        CostComponentKind::Return,
        CostComponentKind::Customs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostComponentKind::Inbound => "INBOUND",
            CostComponentKind::Storage => "STORAGE",
            CostComponentKind::Outbound => "OUTBOUND",
            CostComponentKind::Return => "RETURN",
            CostComponentKind::Customs => "CUSTOMS",
        }
    }
}

/// Purchase order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoStatus {
    Open,
    Partial,
    Closed,
    Cancelled,
}

impl PoStatus {
    /// Open and partially-received POs still have pending quantity.
    pub fn is_open(&self) -> bool {
        matches!(self, PoStatus::Open | PoStatus::Partial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub item: String,
    pub warehouse: String,
    pub date: NaiveDate,
    pub on_hand_qty: f64,
    pub reserved_qty: f64,
    pub damaged_qty: f64,
    pub expired_qty: f64,
    pub expiry_date: Option<NaiveDate>,
    pub lot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub item: String,
    pub channel: String,
    pub country: String,
    pub date: NaiveDate,
    pub ordered_qty: f64,
    pub promised_ship_date: Option<NaiveDate>,
    /// Absent for non-sale demand (e.g. internal transfers).
    pub channel_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub item: String,
    pub channel: Option<String>,
    pub warehouse: String,
    pub date: NaiveDate,
    pub shipped_qty: f64,
    pub actual_ship_date: NaiveDate,
    /// Absent for non-sale movements; sales-only metrics filter on this.
    pub channel_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_id: String,
    pub vendor: String,
    pub item: String,
    pub status: PoStatus,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub pending_qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub po_id: String,
    pub item: String,
    pub receipt_date: NaiveDate,
    pub received_qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComponent {
    pub item: String,
    pub effective_date: NaiveDate,
    pub component_kind: CostComponentKind,
    pub cost_per_unit: f64,
    /// Stable insertion-order id; the larger id wins effective-date ties.
    pub record_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub item: String,
    pub channel: String,
    pub country: String,
    pub period: Period,
    pub currency: String,
    pub gross_sales: f64,
    pub discounts: f64,
    pub refunds: f64,
    /// Conversion rate to the base reporting currency. Rows already in the
    /// base currency may leave this unset; it resolves to 1.0.
    pub fx_rate: Option<f64>,
}

/// Tagged variant over all source fact domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum FactRecord {
    InventorySnapshot(InventorySnapshot),
    Order(Order),
    Shipment(Shipment),
    PurchaseOrder(PurchaseOrder),
    Receipt(Receipt),
    CostComponent(CostComponent),
    Settlement(Settlement),
}

/// Read-only collection of fact rows for one run.
///
/// Built once by the caller (the fact view provider boundary); the engine
/// only ever borrows from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactSet {
    pub inventory: Vec<InventorySnapshot>,
    pub orders: Vec<Order>,
    pub shipments: Vec<Shipment>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub receipts: Vec<Receipt>,
    pub cost_components: Vec<CostComponent>,
    pub settlements: Vec<Settlement>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<FactRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            set.push(record);
        }
        set
    }

    pub fn push(&mut self, record: FactRecord) {
        match record {
            FactRecord::InventorySnapshot(r) => self.inventory.push(r),
            FactRecord::Order(r) => self.orders.push(r),
            FactRecord::Shipment(r) => self.shipments.push(r),
            FactRecord::PurchaseOrder(r) => self.purchase_orders.push(r),
            FactRecord::Receipt(r) => self.receipts.push(r),
            FactRecord::CostComponent(r) => self.cost_components.push(r),
            FactRecord::Settlement(r) => self.settlements.push(r),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
            && self.orders.is_empty()
            && self.shipments.is_empty()
            && self.purchase_orders.is_empty()
            && self.receipts.is_empty()
            && self.cost_components.is_empty()
            && self.settlements.is_empty()
    }

    /// Load every `*.json` file under `dir` into one fact set.
    ///
    /// Each file holds a JSON array of tagged [`FactRecord`] values. Files
    /// are read in sorted path order so the resulting row order (and thus
    /// as-of insertion ids downstream) is stable across runs.
    pub fn load_dir(dir: &Path) -> Result<Self, FactsError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| FactsError::Read {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut set = Self::default();
        for path in paths {
            let content = fs::read_to_string(&path).map_err(|source| FactsError::Read {
                path: path.clone(),
                source,
            })?;
            let records: Vec<FactRecord> =
                serde_json::from_str(&content).map_err(|source| FactsError::Parse {
                    path: path.clone(),
                    source,
                })?;
            for record in records {
                set.push(record);
            }
        }
        Ok(set)
    }
}

/// An ordered set of dimension names defining the partition key of one
/// metric's output rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Granularity {
    dims: Vec<String>,
}

impl Granularity {
    pub fn new<I, S>(dims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn arity(&self) -> usize {
        self.dims.len()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.dims.join(", "))
    }
}

/// Rendered partition key: dimension values in granularity order.
///
/// Dates are ISO-formatted and periods `YYYY-MM`, so lexicographic ordering
/// of keys is also chronological. `Ord` makes key-sorted iteration (and
/// therefore output order) deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey(Vec<String>);

impl PartitionKey {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Key truncated to its first `n` dimensions. Rollups group by a prefix
    /// of the declared granularity.
    pub fn prefix(&self, n: usize) -> PartitionKey {
        PartitionKey(self.0.iter().take(n).cloned().collect())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// Distinct sorted values of a dimension extractor over any row slice.
pub fn distinct<T, F>(rows: &[T], f: F) -> Vec<String>
where
    F: Fn(&T) -> &str,
{
    let set: BTreeSet<&str> = rows.iter().map(|r| f(r)).collect();
    set.into_iter().map(str::to_string).collect()
}
