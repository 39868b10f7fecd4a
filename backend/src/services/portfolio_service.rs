use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use sqlx::PgPool;
use tracing::info;

use crate::db::{portfolio_queries, stock_queries};
use crate::errors::AppError;
use crate::models::{
    CreatePortfolio, CreatePortfolioEntry, DeletedPortfolioEntry, EntryChanges, LenientNumber,
    NewPortfolioEntry, PageParams, PageRequest, Paginated, Pagination, Portfolio,
    PortfolioEntryRow, PortfolioEntryView, PortfolioPerformance, PortfolioView,
    UpdatePortfolioEntry,
};

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Investment, realised return and P/L over a set of entries. Only entries
/// with both a sale price and a sale date count towards the return.
pub fn summarize_entries(entries: &[PortfolioEntryRow]) -> PortfolioPerformance {
    let mut total_investment = 0.0;
    let mut total_return = 0.0;
    let mut profit_loss = 0.0;

    for entry in entries {
        let invested = entry.investment_amount();
        total_investment += invested;

        if let (Some(sale_price), Some(_)) = (entry.sale_price, entry.sale_date) {
            let returned = sale_price * entry.quantity;
            total_return += returned;
            profit_loss += returned - invested;
        }
    }

    let return_percentage = if total_investment > 0.0 {
        profit_loss / total_investment * 100.0
    } else {
        0.0
    };

    PortfolioPerformance {
        total_investment,
        total_return,
        profit_loss,
        return_percentage: format!("{:.2}", return_percentage),
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| AppError::Validation(format!("{} must be a valid date", field)))
}

fn required_number(field: &str, value: Option<&LenientNumber>) -> Result<f64, AppError> {
    value
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))?
        .value()
        .ok_or_else(|| AppError::Validation(format!("{} must be a number", field)))
}

fn positive(field: &str, value: f64) -> Result<f64, AppError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(AppError::Validation(format!("{} must be a positive number", field)))
    }
}

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub fn validate_new_entry(
    portfolio_id: i32,
    input: CreatePortfolioEntry,
) -> Result<NewPortfolioEntry, AppError> {
    let stock_id = required_number("stock_id", input.stock_id.as_ref())?;
    if stock_id.fract() != 0.0 || stock_id < 1.0 || stock_id > i32::MAX as f64 {
        return Err(AppError::Validation("stock_id must be a positive integer".to_string()));
    }
    let purchase_price = positive(
        "purchase_price",
        required_number("purchase_price", input.purchase_price.as_ref())?,
    )?;
    let quantity = positive("quantity", required_number("quantity", input.quantity.as_ref())?)?;
    let purchase_date = input
        .purchase_date
        .as_deref()
        .ok_or_else(|| AppError::Validation("purchase_date is required".to_string()))
        .and_then(|raw| parse_date("purchase_date", raw))?;

    Ok(NewPortfolioEntry {
        portfolio_id,
        stock_id: stock_id as i32,
        purchase_price,
        quantity,
        purchase_date,
        notes: clean_notes(input.notes),
    })
}

pub fn validate_entry_changes(input: UpdatePortfolioEntry) -> Result<EntryChanges, AppError> {
    let changes = EntryChanges {
        purchase_price: input
            .purchase_price
            .map(|p| positive("purchase_price", p))
            .transpose()?,
        quantity: input.quantity.map(|q| positive("quantity", q)).transpose()?,
        purchase_date: input
            .purchase_date
            .as_deref()
            .map(|raw| parse_date("purchase_date", raw))
            .transpose()?,
        sale_price: input
            .sale_price
            .map(|p| p.map(|p| positive("sale_price", p)).transpose())
            .transpose()?,
        sale_date: input
            .sale_date
            .map(|d| {
                d.filter(|raw| !raw.trim().is_empty())
                    .map(|raw| parse_date("sale_date", &raw))
                    .transpose()
            })
            .transpose()?,
        notes: input.notes.map(clean_notes),
    };

    if changes.is_empty() {
        return Err(AppError::Validation("No fields to update".to_string()));
    }
    Ok(changes)
}

pub async fn list(pool: &PgPool, params: &PageParams) -> Result<Paginated<PortfolioView>, AppError> {
    let page = PageRequest::from_params(params, DEFAULT_PAGE_SIZE);
    let (portfolios, total) = tokio::try_join!(
        portfolio_queries::fetch_page(pool, page.limit, page.offset()),
        portfolio_queries::count(pool),
    )?;

    let ids: Vec<i32> = portfolios.iter().map(|p| p.id).collect();
    let mut entries_by_portfolio: HashMap<i32, Vec<PortfolioEntryRow>> = HashMap::new();
    for entry in portfolio_queries::fetch_entries_for(pool, &ids).await? {
        entries_by_portfolio
            .entry(entry.portfolio_id)
            .or_default()
            .push(entry);
    }

    let data = portfolios
        .into_iter()
        .map(|p| {
            let entries = entries_by_portfolio.remove(&p.id).unwrap_or_default();
            PortfolioView {
                performance: summarize_entries(&entries),
                entries: entries.into_iter().map(PortfolioEntryView::from).collect(),
                id: p.id,
                name: p.name,
                description: p.description,
                created_at: p.created_at,
                updated_at: p.updated_at,
            }
        })
        .collect();

    Ok(Paginated {
        data,
        pagination: Pagination::new(total, page),
    })
}

pub async fn create(pool: &PgPool, input: CreatePortfolio) -> Result<Portfolio, AppError> {
    let name = input.name.unwrap_or_default().trim().to_string();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(AppError::Validation(
            "Portfolio name must be between 1 and 255 characters".to_string(),
        ));
    }
    let description = clean_notes(input.description);
    if description.as_ref().is_some_and(|d| d.chars().count() > 1000) {
        return Err(AppError::Validation(
            "description must be at most 1000 characters".to_string(),
        ));
    }

    let portfolio = portfolio_queries::insert(pool, &name, description.as_deref()).await?;
    info!("Created portfolio {} ({})", portfolio.name, portfolio.id);
    Ok(portfolio)
}

pub async fn add_entry(
    pool: &PgPool,
    portfolio_id: i32,
    input: CreatePortfolioEntry,
) -> Result<PortfolioEntryView, AppError> {
    if !portfolio_queries::exists(pool, portfolio_id).await? {
        return Err(AppError::NotFound(format!("Portfolio {} not found", portfolio_id)));
    }
    let entry = validate_new_entry(portfolio_id, input)?;
    if stock_queries::fetch_one(pool, entry.stock_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Stock {} not found", entry.stock_id)));
    }

    let row = portfolio_queries::insert_entry(pool, &entry).await?;
    info!("Added {} to portfolio {}", row.stock_symbol, portfolio_id);
    Ok(row.into())
}

pub async fn update_entry(
    pool: &PgPool,
    entry_id: i32,
    input: UpdatePortfolioEntry,
) -> Result<PortfolioEntryView, AppError> {
    let changes = validate_entry_changes(input)?;
    let row = portfolio_queries::update_entry(pool, entry_id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Portfolio entry {} not found", entry_id)))?;
    info!("Updated portfolio entry {}", entry_id);
    Ok(row.into())
}

pub async fn delete_entry(pool: &PgPool, entry_id: i32) -> Result<DeletedPortfolioEntry, AppError> {
    let entry = portfolio_queries::fetch_entry(pool, entry_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Portfolio entry {} not found", entry_id)))?;

    if portfolio_queries::delete_entry(pool, entry_id).await? == 0 {
        return Err(AppError::NotFound(format!("Portfolio entry {} not found", entry_id)));
    }

    info!("Deleted portfolio entry {}", entry_id);
    Ok(DeletedPortfolioEntry {
        id: entry.id,
        stock_symbol: entry.stock_symbol,
        message: "Portfolio entry deleted".to_string(),
    })
}
