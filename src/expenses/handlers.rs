use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{
    dto::{
        ExpenseBody, ExpenseCreated, ExpenseList, ListExpensesParams, SummaryList, SummaryParams,
    },
    repo,
};
use crate::{
    auth::gate::AuthUser,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/summary", get(expense_summary))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
}

#[instrument(skip(state, auth, params), fields(caller = auth.user_id))]
pub async fn list_expenses(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(params): ApiQuery<ListExpensesParams>,
) -> Result<Json<ExpenseList>, AppError> {
    let filter = params.into_filter()?;
    let expenses = repo::list(&state.db, &filter)
        .await
        .map_err(|e| AppError::internal("Failed to fetch expenses", e))?;
    Ok(Json(ExpenseList { expenses }))
}

#[instrument(skip(state, auth, body), fields(caller = auth.user_id))]
pub async fn create_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ExpenseBody>,
) -> Result<Json<ExpenseCreated>, AppError> {
    let new = body.validate()?;
    let id = repo::create(&state.db, &new)
        .await
        .map_err(|e| AppError::internal("Failed to add expense", e))?;
    info!(expense_id = id, user_id = new.user_id, "expense added");
    Ok(Json(ExpenseCreated {
        message: "Expense added",
        id,
    }))
}

#[instrument(skip(state, auth, body), fields(caller = auth.user_id))]
pub async fn update_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ExpenseBody>,
) -> Result<Json<Value>, AppError> {
    let new = body.validate()?;
    let touched = repo::update(&state.db, id, &new)
        .await
        .map_err(|e| AppError::internal("Failed to update expense", e))?;
    if touched == 0 {
        return Err(AppError::NotFound("Expense not found"));
    }
    Ok(Json(json!({ "message": "Expense updated" })))
}

#[instrument(skip(state, auth), fields(caller = auth.user_id))]
pub async fn delete_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, AppError> {
    let touched = repo::delete(&state.db, id)
        .await
        .map_err(|e| AppError::internal("Failed to delete expense", e))?;
    if touched == 0 {
        return Err(AppError::NotFound("Expense not found"));
    }
    info!(expense_id = id, "expense deleted");
    Ok(Json(json!({ "message": "Expense deleted" })))
}

#[instrument(skip(state, auth, params), fields(caller = auth.user_id))]
pub async fn expense_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(params): ApiQuery<SummaryParams>,
) -> Result<Json<SummaryList>, AppError> {
    let request = params.into_request()?;
    let summaries = repo::summary(&state.db, &request)
        .await
        .map_err(|e| AppError::internal("Failed to fetch summary", e))?;
    Ok(Json(SummaryList { summaries }))
}
