use sqlx::PgPool;

use crate::models::{EntryChanges, NewPortfolioEntry, Portfolio, PortfolioEntryRow};

const ENTRY_SELECT: &str = "SELECT e.id, e.portfolio_id, e.stock_id,
        s.symbol AS stock_symbol, s.name AS stock_name,
        e.purchase_price, e.quantity, e.purchase_date, e.sale_price, e.sale_date,
        e.notes, e.created_at, e.updated_at";

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM portfolios")
        .fetch_one(pool)
        .await
}

pub async fn fetch_page(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(
        "SELECT id, name, description, created_at, updated_at
         FROM portfolios
         ORDER BY created_at DESC, id DESC
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn exists(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM portfolios WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn insert(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
) -> Result<Portfolio, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(
        "INSERT INTO portfolios (name, description)
         VALUES ($1, $2)
         RETURNING id, name, description, created_at, updated_at",
    )
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await
}

pub async fn fetch_entries_for(
    pool: &PgPool,
    portfolio_ids: &[i32],
) -> Result<Vec<PortfolioEntryRow>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioEntryRow>(&format!(
        "{ENTRY_SELECT}
         FROM portfolio_entries e
         JOIN stocks s ON s.id = e.stock_id
         WHERE e.portfolio_id = ANY($1)
         ORDER BY e.purchase_date, e.id"
    ))
    .bind(portfolio_ids.to_vec())
    .fetch_all(pool)
    .await
}

pub async fn fetch_entry(pool: &PgPool, id: i32) -> Result<Option<PortfolioEntryRow>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioEntryRow>(&format!(
        "{ENTRY_SELECT}
         FROM portfolio_entries e
         JOIN stocks s ON s.id = e.stock_id
         WHERE e.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_entry(
    pool: &PgPool,
    entry: &NewPortfolioEntry,
) -> Result<PortfolioEntryRow, sqlx::Error> {
    sqlx::query_as::<_, PortfolioEntryRow>(&format!(
        "WITH e AS (
             INSERT INTO portfolio_entries
                 (portfolio_id, stock_id, purchase_price, quantity, purchase_date, notes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *
         )
         {ENTRY_SELECT}
         FROM e
         JOIN stocks s ON s.id = e.stock_id"
    ))
    .bind(entry.portfolio_id)
    .bind(entry.stock_id)
    .bind(entry.purchase_price)
    .bind(entry.quantity)
    .bind(entry.purchase_date)
    .bind(entry.notes.as_deref())
    .fetch_one(pool)
    .await
}

pub async fn update_entry(
    pool: &PgPool,
    id: i32,
    changes: &EntryChanges,
) -> Result<Option<PortfolioEntryRow>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioEntryRow>(&format!(
        "WITH e AS (
             UPDATE portfolio_entries
             SET purchase_price = COALESCE($2, purchase_price),
                 quantity = COALESCE($3, quantity),
                 purchase_date = COALESCE($4, purchase_date),
                 sale_price = CASE WHEN $5 THEN $6 ELSE sale_price END,
                 sale_date = CASE WHEN $7 THEN $8 ELSE sale_date END,
                 notes = CASE WHEN $9 THEN $10 ELSE notes END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *
         )
         {ENTRY_SELECT}
         FROM e
         JOIN stocks s ON s.id = e.stock_id"
    ))
    .bind(id)
    .bind(changes.purchase_price)
    .bind(changes.quantity)
    .bind(changes.purchase_date)
    .bind(changes.sale_price.is_some())
    .bind(changes.sale_price.flatten())
    .bind(changes.sale_date.is_some())
    .bind(changes.sale_date.flatten())
    .bind(changes.notes.is_some())
    .bind(changes.notes.clone().flatten())
    .fetch_optional(pool)
    .await
}

pub async fn delete_entry(pool: &PgPool, id: i32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM portfolio_entries WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
