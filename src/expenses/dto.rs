use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    dates::parse_date,
    query::{ExpenseFilter, Period, SummaryRequest},
    repo_types::{Expense, NewExpense, PeriodTotal},
};
use crate::error::AppError;

const MAX_CATEGORY_LEN: usize = 50;
/// Scale of the `amount` column, `NUMERIC(12, 2)`.
const AMOUNT_SCALE: u32 = 2;

/// Largest value `NUMERIC(12, 2)` holds: 9999999999.99.
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, AMOUNT_SCALE)
}

/// Query string of `GET /expenses`. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExpensesParams {
    pub user_id: Option<String>,
    pub id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
}

/// Query string of `GET /expenses/summary`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    pub user_id: Option<String>,
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Body of `POST /expenses` and `PUT /expenses/:id`.
#[derive(Debug, Deserialize)]
pub struct ExpenseBody {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: i64,
    pub amount: Decimal,
    pub category: String,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseList {
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Serialize)]
pub struct SummaryList {
    pub summaries: Vec<PeriodTotal>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseCreated {
    pub message: &'static str,
    pub id: i64,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_user_id(raw: Option<String>) -> Result<i64, AppError> {
    let raw = present(raw).ok_or_else(|| AppError::validation("userId is required"))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::validation("userId must be an integer"))
}

impl ListExpensesParams {
    pub fn into_filter(self) -> Result<ExpenseFilter, AppError> {
        let user_id = parse_user_id(self.user_id)?;
        let id = present(self.id)
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::validation("id must be an integer"))
            })
            .transpose()?;
        let start_date = present(self.start_date).map(|v| parse_date(&v)).transpose()?;
        let end_date = present(self.end_date).map(|v| parse_date(&v)).transpose()?;
        Ok(ExpenseFilter {
            user_id,
            id,
            start_date,
            end_date,
            category: present(self.category),
        })
    }
}

impl SummaryParams {
    pub fn into_request(self) -> Result<SummaryRequest, AppError> {
        let user_id = parse_user_id(self.user_id)?;
        let period = match present(self.period) {
            Some(p) => p
                .parse::<Period>()
                .map_err(|e| AppError::validation(e.to_string()))?,
            None => Period::default(),
        };
        let start_date = present(self.start_date)
            .ok_or_else(|| AppError::validation("startDate is required"))
            .and_then(|v| parse_date(&v))?;
        let end_date = present(self.end_date)
            .ok_or_else(|| AppError::validation("endDate is required"))
            .and_then(|v| parse_date(&v))?;
        Ok(SummaryRequest {
            user_id,
            period,
            start_date,
            end_date,
        })
    }
}

impl ExpenseBody {
    /// Checks the body before anything reaches storage.
    pub fn validate(self) -> Result<NewExpense, AppError> {
        if self.user_id <= 0 {
            return Err(AppError::validation("userId is required"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(AppError::validation("amount must be greater than 0"));
        }
        if self.amount.normalize().scale() > AMOUNT_SCALE {
            return Err(AppError::validation(
                "amount must have at most 2 decimal places",
            ));
        }
        if self.amount > max_amount() {
            return Err(AppError::validation(format!(
                "amount must be at most {}",
                max_amount()
            )));
        }
        let category = self.category.trim().to_string();
        if category.is_empty() {
            return Err(AppError::validation("category is required"));
        }
        if category.chars().count() > MAX_CATEGORY_LEN {
            return Err(AppError::validation(format!(
                "category must be at most {MAX_CATEGORY_LEN} characters"
            )));
        }
        let date = parse_date(&self.date)?;
        Ok(NewExpense {
            user_id: self.user_id,
            amount: self.amount,
            category,
            date,
            description: self.description.unwrap_or_default(),
        })
    }
}
