//! Product records, KPI points and derived summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

// ============================================================================
// IDENTITY
// ============================================================================

/// Opaque product identifier as issued by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProductId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Stock health of a product relative to its demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    /// Stock exceeds demand.
    Healthy,
    /// Stock exactly covers demand.
    Low,
    /// Stock below demand.
    Critical,
}

impl ProductStatus {
    pub fn classify(stock: i64, demand: u64) -> Self {
        match i128::from(stock).cmp(&i128::from(demand)) {
            std::cmp::Ordering::Greater => Self::Healthy,
            std::cmp::Ordering::Equal => Self::Low,
            std::cmp::Ordering::Less => Self::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Low => "Low",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "low" => Ok(Self::Low),
            "critical" => Ok(Self::Critical),
            other => Err(ValidationError::InvalidValue {
                field: "status",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One product as last known to the client.
///
/// `stock` is signed: optimistic projections are not clamped and may
/// briefly predict a negative value until the authoritative refetch lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub warehouse: String,
    pub stock: i64,
    pub demand: u64,
    pub status: ProductStatus,
}

impl ProductRecord {
    /// Build a record, classifying its status from stock and demand.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        sku: impl Into<String>,
        warehouse: impl Into<String>,
        stock: i64,
        demand: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sku: sku.into(),
            warehouse: warehouse.into(),
            stock,
            demand,
            status: ProductStatus::classify(stock, demand),
        }
    }
}

/// A single point of the stock-vs-demand trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kpi {
    pub date: NaiveDate,
    pub stock: i64,
    pub demand: u64,
}

// ============================================================================
// DATE RANGES
// ============================================================================

/// KPI window selectable from the dashboard header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateRange {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "14d")]
    Last14Days,
    #[default]
    #[serde(rename = "30d")]
    Last30Days,
}

impl DateRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last14Days => "14d",
            Self::Last30Days => "30d",
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Self::Last7Days => 7,
            Self::Last14Days => 14,
            Self::Last30Days => 30,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(Self::Last7Days),
            "14d" => Ok(Self::Last14Days),
            "30d" => Ok(Self::Last30Days),
            other => Err(ValidationError::InvalidValue {
                field: "date_range",
                reason: format!("expected 7d, 14d or 30d, got '{}'", other),
            }),
        }
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Headline numbers shown above the product table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorySummary {
    pub total_stock: i64,
    pub total_demand: u64,
    /// Percentage of demand covered by available stock, 0.0 to 100.0.
    pub fill_rate: f64,
    pub healthy: usize,
    pub low: usize,
    pub critical: usize,
}

impl InventorySummary {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ProductRecord>,
    {
        let mut total_stock = 0i64;
        let mut total_demand = 0u64;
        let mut filled = 0u64;
        let (mut healthy, mut low, mut critical) = (0, 0, 0);

        for record in records {
            total_stock = total_stock.saturating_add(record.stock);
            total_demand = total_demand.saturating_add(record.demand);
            let available = u64::try_from(record.stock).unwrap_or(0);
            filled = filled.saturating_add(available.min(record.demand));
            match record.status {
                ProductStatus::Healthy => healthy += 1,
                ProductStatus::Low => low += 1,
                ProductStatus::Critical => critical += 1,
            }
        }

        let fill_rate = if total_demand == 0 {
            100.0
        } else {
            filled as f64 / total_demand as f64 * 100.0
        };

        Self {
            total_stock,
            total_demand,
            fill_rate,
            healthy,
            low,
            critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProductStatus::classify(10, 5), ProductStatus::Healthy);
        assert_eq!(ProductStatus::classify(5, 5), ProductStatus::Low);
        assert_eq!(ProductStatus::classify(4, 5), ProductStatus::Critical);
        assert_eq!(ProductStatus::classify(-1, 0), ProductStatus::Critical);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("healthy".parse::<ProductStatus>(), Ok(ProductStatus::Healthy));
        assert_eq!("CRITICAL".parse::<ProductStatus>(), Ok(ProductStatus::Critical));
        assert!("sold-out".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ProductRecord::new("p1", "Bolt", "BLT-1", "WH1", 100, 5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["warehouse"], "WH1");
        assert_eq!(json["status"], "Healthy");
    }

    #[test]
    fn test_date_range_round_trip_strings() {
        for range in [DateRange::Last7Days, DateRange::Last14Days, DateRange::Last30Days] {
            assert_eq!(range.as_str().parse::<DateRange>(), Ok(range));
        }
        assert_eq!(DateRange::default(), DateRange::Last30Days);
        assert!("90d".parse::<DateRange>().is_err());
    }

    #[test]
    fn test_summary_fill_rate() {
        let records = vec![
            ProductRecord::new("p1", "A", "A-1", "WH1", 100, 50),
            ProductRecord::new("p2", "B", "B-1", "WH1", 10, 50),
            ProductRecord::new("p3", "C", "C-1", "WH2", -5, 0),
        ];
        let summary = InventorySummary::from_records(&records);
        assert_eq!(summary.total_stock, 105);
        assert_eq!(summary.total_demand, 100);
        assert!((summary.fill_rate - 60.0).abs() < 1e-9);
        assert_eq!((summary.healthy, summary.low, summary.critical), (1, 0, 2));
    }

    #[test]
    fn test_summary_without_demand_is_fully_filled() {
        let summary = InventorySummary::from_records(&Vec::<ProductRecord>::new());
        assert_eq!(summary.total_demand, 0);
        assert_eq!(summary.fill_rate, 100.0);
    }
}
