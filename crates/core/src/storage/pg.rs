use crate::domain::stock::{NewStockEvent, StockEvent};
use crate::storage::{SearchParams, StockStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

const STOCK_COLUMNS: &str = "id, created_at, updated_at, ticker, company, brokerage, action, \
     rating_to, rating_from, target_to, target_from, time";

#[derive(Debug, Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ticker: String,
    company: String,
    brokerage: String,
    action: String,
    rating_to: String,
    rating_from: Option<String>,
    target_to: Option<Decimal>,
    target_from: Option<Decimal>,
    time: DateTime<Utc>,
}

impl From<StockRow> for StockEvent {
    fn from(row: StockRow) -> Self {
        StockEvent {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ticker: row.ticker,
            company: row.company,
            brokerage: row.brokerage,
            action: row.action,
            rating_to: row.rating_to,
            rating_from: row.rating_from,
            target_to: row.target_to,
            target_from: row.target_from,
            time: row.time,
        }
    }
}

#[async_trait::async_trait]
impl StockStore for PgStockStore {
    async fn search(&self, params: &SearchParams) -> anyhow::Result<(Vec<StockEvent>, i64)> {
        let total: i64 = count_query(params)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("count stocks for search failed")?;

        let rows: Vec<StockRow> = page_query(params)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("select stocks for search failed")?;

        Ok((rows.into_iter().map(StockEvent::from).collect(), total))
    }

    async fn get_by_ticker(&self, ticker: &str) -> anyhow::Result<Option<StockEvent>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks \
             WHERE deleted_at IS NULL AND UPPER(ticker) = $1 \
             ORDER BY id ASC \
             LIMIT 1"
        ))
        .bind(ticker.to_uppercase())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select stock by ticker failed (ticker={ticker})"))?;

        Ok(row.map(StockEvent::from))
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stocks WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .context("count stocks failed")?;
        Ok(count)
    }

    async fn recent(&self, limit: i64) -> anyhow::Result<Vec<StockEvent>> {
        let rows: Vec<StockRow> = recent_query(limit)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("select recent stocks failed")?;

        Ok(rows.into_iter().map(StockEvent::from).collect())
    }

    async fn insert(&self, event: &NewStockEvent) -> anyhow::Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO stocks \
               (ticker, company, brokerage, action, rating_to, rating_from, target_to, target_from, time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(&event.ticker)
        .bind(&event.company)
        .bind(&event.brokerage)
        .bind(&event.action)
        .bind(&event.rating_to)
        .bind(&event.rating_from)
        .bind(event.target_to)
        .bind(event.target_from)
        .bind(event.time)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("insert stock failed (ticker={})", event.ticker))?;

        Ok(id)
    }
}

fn count_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM stocks");
    push_filter(&mut qb, params);
    qb
}

fn page_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {STOCK_COLUMNS} FROM stocks"));
    push_filter(&mut qb, params);

    let (column, direction) = params.ordering();
    qb.push(" ORDER BY ")
        .push(column.as_sql())
        .push(" ")
        .push(direction.as_sql())
        .push(", id ASC");

    if let Some((limit, offset)) = params.window() {
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
    }
    qb
}

fn recent_query(limit: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE deleted_at IS NULL ORDER BY time DESC, id ASC"
    ));
    if limit > 0 {
        qb.push(" LIMIT ").push_bind(limit);
    }
    qb
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, params: &SearchParams) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(needle) = params.needle() {
        let pattern = format!("%{}%", escape_like(&needle));
        qb.push(" AND (LOWER(ticker) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(company) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

// Postgres LIKE uses backslash as the default escape character.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_orders_and_paginates() {
        let params = SearchParams {
            sort_by: Some("ticker".to_string()),
            sort_order: Some("desc".to_string()),
            page: 2,
            page_size: 10,
            ..Default::default()
        };
        let qb = page_query(&params);
        let sql = qb.sql();
        assert!(sql.contains("WHERE deleted_at IS NULL"), "{sql}");
        assert!(sql.contains("ORDER BY ticker DESC, id ASC"), "{sql}");
        assert!(sql.contains("LIMIT $1 OFFSET $2"), "{sql}");
    }

    #[test]
    fn page_query_without_sort_or_size_returns_all_newest_first() {
        let qb = page_query(&SearchParams::default());
        let sql = qb.sql();
        assert!(sql.contains("ORDER BY time DESC, id ASC"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn search_filters_ticker_and_company_in_both_queries() {
        let params = SearchParams {
            search: Some("App".to_string()),
            ..Default::default()
        };
        for qb in [count_query(&params), page_query(&params)] {
            let sql = qb.sql();
            assert!(
                sql.contains("AND (LOWER(ticker) LIKE $1 OR LOWER(company) LIKE $2)"),
                "{sql}"
            );
        }
    }

    #[test]
    fn recent_query_limit_is_optional() {
        let qb = recent_query(0);
        assert!(!qb.sql().contains("LIMIT"));
        let qb = recent_query(5);
        assert!(qb.sql().ends_with("LIMIT $1"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
