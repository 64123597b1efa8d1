use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub category: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One row of a summary: the truncated period start and its total.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PeriodTotal {
    #[serde(with = "iso_date")]
    pub period: Date,
    pub total: Decimal,
}

/// Validated fields for inserting or fully replacing an expense.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub user_id: i64,
    pub amount: Decimal,
    pub category: String,
    pub date: Date,
    pub description: String,
}
