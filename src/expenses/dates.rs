use time::{macros::format_description, Date};

use crate::error::AppError;

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<Date, AppError> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::validation("Invalid date format, use YYYY-MM-DD"))
}
