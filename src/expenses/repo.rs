use anyhow::Context;
use sqlx::PgPool;

use super::{
    query::{list_query, summary_query, ExpenseFilter, SummaryRequest},
    repo_types::{Expense, NewExpense, PeriodTotal},
};

pub async fn list(db: &PgPool, filter: &ExpenseFilter) -> anyhow::Result<Vec<Expense>> {
    let mut qb = list_query(filter);
    let rows = qb
        .build_query_as::<Expense>()
        .fetch_all(db)
        .await
        .context("list expenses")?;
    Ok(rows)
}

pub async fn create(db: &PgPool, new: &NewExpense) -> anyhow::Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO expenses (user_id, amount, category, date, description, updated_at)
        VALUES ($1, $2, $3, $4, $5, CURRENT_TIMESTAMP)
        RETURNING id
        "#,
    )
    .bind(new.user_id)
    .bind(new.amount)
    .bind(&new.category)
    .bind(new.date)
    .bind(&new.description)
    .fetch_one(db)
    .await
    .context("insert expense")?;
    Ok(id)
}

/// Replaces every mutable column of expense `id`. The owner never changes.
/// Returns the number of rows touched; zero means the expense does not exist.
pub async fn update(db: &PgPool, id: i64, new: &NewExpense) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE expenses
           SET amount = $1, category = $2, date = $3, description = $4,
               updated_at = CURRENT_TIMESTAMP
         WHERE id = $5
        "#,
    )
    .bind(new.amount)
    .bind(&new.category)
    .bind(new.date)
    .bind(&new.description)
    .bind(id)
    .execute(db)
    .await
    .context("update expense")?;
    Ok(result.rows_affected())
}

pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete expense")?;
    Ok(result.rows_affected())
}

pub async fn summary(db: &PgPool, req: &SummaryRequest) -> anyhow::Result<Vec<PeriodTotal>> {
    let mut qb = summary_query(req);
    let rows = qb
        .build_query_as::<PeriodTotal>()
        .fetch_all(db)
        .await
        .context("summarize expenses")?;
    Ok(rows)
}

pub async fn ping(db: &PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT 1")
        .execute(db)
        .await
        .context("ping database")?;
    Ok(())
}
