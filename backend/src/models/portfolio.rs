use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{deserialize_some, LenientNumber};

// Represents a named collection of purchases (e.g., "Long-term", "NISA").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePortfolio {
    pub name: Option<String>,
    pub description: Option<String>,
}

// A single purchase, joined with the symbol and name of the stock bought.
#[derive(Debug, Clone, FromRow)]
pub struct PortfolioEntryRow {
    pub id: i32,
    pub portfolio_id: i32,
    pub stock_id: i32,
    pub stock_symbol: String,
    pub stock_name: String,
    pub purchase_price: f64,
    pub quantity: f64,
    pub purchase_date: NaiveDate,
    pub sale_price: Option<f64>,
    pub sale_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortfolioEntryRow {
    pub fn investment_amount(&self) -> f64 {
        self.purchase_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEntryView {
    pub id: i32,
    pub portfolio_id: i32,
    pub stock_id: i32,
    pub stock_symbol: String,
    pub stock_name: String,
    pub purchase_price: f64,
    pub quantity: f64,
    pub purchase_date: NaiveDate,
    pub sale_price: Option<f64>,
    pub sale_date: Option<NaiveDate>,
    pub investment_amount: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PortfolioEntryRow> for PortfolioEntryView {
    fn from(row: PortfolioEntryRow) -> Self {
        Self {
            investment_amount: row.investment_amount(),
            id: row.id,
            portfolio_id: row.portfolio_id,
            stock_id: row.stock_id,
            stock_symbol: row.stock_symbol,
            stock_name: row.stock_name,
            purchase_price: row.purchase_price,
            quantity: row.quantity,
            purchase_date: row.purchase_date,
            sale_price: row.sale_price,
            sale_date: row.sale_date,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPerformance {
    pub total_investment: f64,
    pub total_return: f64,
    pub profit_loss: f64,
    /// Percentage with two decimals, e.g. `"12.50"`.
    pub return_percentage: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub entries: Vec<PortfolioEntryView>,
    #[serde(flatten)]
    pub performance: PortfolioPerformance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePortfolioEntry {
    pub stock_id: Option<LenientNumber>,
    pub purchase_price: Option<LenientNumber>,
    pub quantity: Option<LenientNumber>,
    pub purchase_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPortfolioEntry {
    pub portfolio_id: i32,
    pub stock_id: i32,
    pub purchase_price: f64,
    pub quantity: f64,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePortfolioEntry {
    pub purchase_price: Option<f64>,
    pub quantity: Option<f64>,
    pub purchase_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub sale_price: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub sale_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
}

// Validated partial update; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryChanges {
    pub purchase_price: Option<f64>,
    pub quantity: Option<f64>,
    pub purchase_date: Option<NaiveDate>,
    pub sale_price: Option<Option<f64>>,
    pub sale_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        *self == EntryChanges::default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPortfolioEntry {
    pub id: i32,
    pub stock_symbol: String,
    pub message: String,
}
