use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireOperator;
use crate::domain::{MaterialProfile, MaterialRequest};
use crate::error::{ApiError, ApiResult};

/// Material catalogue - public
pub async fn list_materials(
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<MaterialProfile>>> {
    Ok(DataResponse::new(state.store.list_materials().await?))
}

pub async fn create_material(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MaterialRequest>,
) -> ApiResult<Created<MaterialProfile>> {
    req.validate().map_err(ApiError::BadRequest)?;

    let material = req.into_profile(Uuid::new_v4());
    state.store.insert_material(&material).await?;

    tracing::info!(
        material_id = %material.id,
        family = %material.family,
        operator = %operator.operator,
        "Material created"
    );

    Ok(Created(material))
}

pub async fn update_material(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<Uuid>,
    Json(req): Json<MaterialRequest>,
) -> ApiResult<DataResponse<MaterialProfile>> {
    req.validate().map_err(ApiError::BadRequest)?;

    let material = req.into_profile(material_id);
    if !state.store.update_material(&material).await? {
        return Err(ApiError::not_found(format!("Material {} not found", material_id)));
    }

    tracing::info!(material_id = %material_id, operator = %operator.operator, "Material updated");

    Ok(DataResponse::new(material))
}

pub async fn delete_material(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<NoContent> {
    if !state.store.delete_material(material_id).await? {
        return Err(ApiError::not_found(format!("Material {} not found", material_id)));
    }

    tracing::info!(material_id = %material_id, operator = %operator.operator, "Material deleted");

    Ok(NoContent)
}
