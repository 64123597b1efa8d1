//! SQL construction for expense listing and period summaries.
//!
//! Every caller-supplied value goes through `push_bind`; only fixed
//! fragments are pushed as SQL text.

use std::{fmt, str::FromStr};

use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use time::Date;

const EXPENSE_COLUMNS: &str =
    "id, user_id, amount, category, date, description, created_at, updated_at";

/// Optional filters for listing a user's expenses. `None` means "do not
/// filter on this column".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub user_id: i64,
    pub id: Option<i64>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub category: Option<String>,
}

pub fn list_query(filter: &ExpenseFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = "
    ));
    qb.push_bind(filter.user_id);

    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND date <= ").push_bind(end);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    qb
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Day,
    #[default]
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid period, use day, month, quarter, or year")]
pub struct InvalidPeriod;

impl Period {
    /// Field name understood by `date_trunc`.
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }
}

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            _ => Err(InvalidPeriod),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range summarized at `period` granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub user_id: i64,
    pub period: Period,
    pub start_date: Date,
    pub end_date: Date,
}

pub fn summary_query(req: &SummaryRequest) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT date_trunc('{}', date::timestamp)::date AS period, SUM(amount) AS total \
         FROM expenses WHERE user_id = ",
        req.period.as_str()
    ));
    qb.push_bind(req.user_id)
        .push(" AND date BETWEEN ")
        .push_bind(req.start_date)
        .push(" AND ")
        .push_bind(req.end_date)
        .push(" GROUP BY 1 ORDER BY 1");
    qb
}
