use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Error;
use crate::models::*;
use crate::pricing;

// ============================================================
// Error Handling
// ============================================================

/// Map a persistence-layer error to a response.
///
/// Validation failures carry a message meant for the client and become 422.
/// Everything else is logged in full and reported as a generic 500.
fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    if let Some(err) = e.downcast_ref::<Error>() {
        return domain_error(err.clone());
    }

    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn domain_error(err: Error) -> (StatusCode, String) {
    match err {
        Error::Validation(msg) => {
            tracing::warn!("Validation error: {}", msg);
            (StatusCode::UNPROCESSABLE_ENTITY, msg)
        }
        other => {
            tracing::error!("Internal error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Project not found".to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Pricing
// ============================================================

pub async fn calculate(
    Json(input): Json<CalculatorDocument>,
) -> Result<Json<CalculationResult>, (StatusCode, String)> {
    pricing::calculate(&input).map(Json).map_err(domain_error)
}

// ============================================================
// Settings
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsInput {
    pub exchange_rate: Decimal,
}

pub async fn get_settings(
    State(db): State<Database>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    db.get_settings().map(Json).map_err(internal_error)
}

pub async fn update_settings(
    State(db): State<Database>,
    Json(input): Json<UpdateSettingsInput>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    if input.exchange_rate <= Decimal::ZERO {
        return Err(domain_error(Error::validation(
            "exchangeRate must be greater than 0",
        )));
    }
    let settings = Settings {
        exchange_rate: ExchangeRate::from_decimal(input.exchange_rate),
    };
    db.update_settings(settings)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(db): State<Database>,
) -> Result<Json<Vec<ProjectSummary>>, (StatusCode, String)> {
    db.get_project_summaries()
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_project_tree(
    State(db): State<Database>,
) -> Result<Json<ProjectForest>, (StatusCode, String)> {
    db.get_project_tree().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectSnapshot>, (StatusCode, String)> {
    db.get_project(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<SaveProjectInput>,
) -> Result<(StatusCode, Json<ProjectSnapshot>), (StatusCode, String)> {
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<SaveProjectInput>,
) -> Result<Json<ProjectSnapshot>, (StatusCode, String)> {
    db.update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedProjects>, (StatusCode, String)> {
    let deleted_ids = db.delete_project_cascade(id).map_err(internal_error)?;
    if deleted_ids.is_empty() {
        return Err(not_found());
    }
    Ok(Json(DeletedProjects { deleted_ids }))
}

pub async fn create_branch(
    State(db): State<Database>,
    Path(parent_id): Path<Uuid>,
    Json(input): Json<CreateBranchInput>,
) -> Result<(StatusCode, Json<ProjectSnapshot>), (StatusCode, String)> {
    db.create_branch(parent_id, input)
        .map_err(internal_error)?
        .map(|p| (StatusCode::CREATED, Json(p)))
        .ok_or_else(not_found)
}

// ============================================================
// Export
// ============================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

pub async fn export_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, (StatusCode, String)> {
    let project = db
        .get_project(id)
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    let response = match query.format {
        ExportFormat::Json => Json(project).into_response(),
        ExportFormat::Csv => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.csv\"", project.summary.branch_path),
                ),
            ],
            project.result.summary_csv(),
        )
            .into_response(),
    };
    Ok(response)
}
