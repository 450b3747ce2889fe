//! PostgreSQL-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::{OrderStore, StoreError, StoreResult};
use crate::domain::{
    AuthMethod, CustomerIdentity, Infill, LayerHeight, LocalizedText, MaterialFamily,
    MaterialProfile, MaterialSelection, OperatorNotes, Order, OrderParams, OrderStatus,
};
use crate::estimator::PriceEstimate;

const ORDER_COLUMNS: &str = r#"
    id, file_name, file_ref, operator_choice, material_id, material_name, material_color,
    purpose, loads, infill_percent, layer_height_mm, scale, estimate, final_price,
    status, customer_name, customer_phone, customer_email, auth_method,
    created_at, approved_at, price_modified_at, ordered_at, completed_at, updated_at
"#;

const MATERIAL_COLUMNS: &str = r#"
    id, name_ru, name_ro, family, price_per_kg, colors, description_ru, description_ro
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for order
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    file_name: String,
    file_ref: String,
    operator_choice: bool,
    material_id: Option<Uuid>,
    material_name: Option<String>,
    material_color: Option<String>,
    purpose: Option<String>,
    loads: Option<String>,
    infill_percent: i32,
    layer_height_mm: f64,
    scale: f64,
    estimate: Option<Json<PriceEstimate>>,
    final_price: Option<Decimal>,
    status: String,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    auth_method: Option<String>,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    price_modified_at: Option<DateTime<Utc>>,
    ordered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |reason: String| StoreError::Corrupt { id, reason };

        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", row.status)))?;
        let infill_percent = u32::try_from(row.infill_percent)
            .ok()
            .and_then(|p| Infill::new(p).ok())
            .ok_or_else(|| corrupt(format!("invalid infill {}", row.infill_percent)))?;
        let layer_height_mm = LayerHeight::from_millimetres(row.layer_height_mm)
            .ok_or_else(|| corrupt(format!("invalid layer height {}", row.layer_height_mm)))?;

        let material = match (row.material_id, row.material_name) {
            (Some(material_id), Some(material_name)) => Some(MaterialSelection {
                material_id,
                material_name,
                color: row.material_color,
            }),
            _ => None,
        };

        let notes = if row.purpose.is_some() || row.loads.is_some() {
            Some(OperatorNotes {
                purpose: row.purpose,
                loads: row.loads,
            })
        } else {
            None
        };

        let customer = match (row.customer_name, row.customer_phone) {
            (Some(name), Some(phone)) => Some(CustomerIdentity {
                name,
                phone,
                email: row.customer_email,
                auth_method: row.auth_method.as_deref().map(auth_method_from_str),
            }),
            _ => None,
        };

        Ok(Order {
            id: row.id,
            file_name: row.file_name,
            file_ref: row.file_ref,
            operator_choice: row.operator_choice,
            material,
            notes,
            params: OrderParams {
                infill_percent,
                layer_height_mm,
                scale: row.scale,
            },
            estimate: row.estimate.map(|Json(e)| e),
            status,
            final_price: row.final_price.and_then(|d| d.round().to_i64()),
            customer,
            created_at: row.created_at,
            approved_at: row.approved_at,
            price_modified_at: row.price_modified_at,
            ordered_at: row.ordered_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for material
#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    id: Uuid,
    name_ru: String,
    name_ro: String,
    family: String,
    price_per_kg: Option<Decimal>,
    colors: Vec<String>,
    description_ru: Option<String>,
    description_ro: Option<String>,
}

impl From<MaterialRow> for MaterialProfile {
    fn from(row: MaterialRow) -> Self {
        let description = match (row.description_ru, row.description_ro) {
            (None, None) => None,
            (ru, ro) => Some(LocalizedText::new(
                ru.unwrap_or_default(),
                ro.unwrap_or_default(),
            )),
        };

        Self {
            id: row.id,
            name: LocalizedText::new(row.name_ru, row.name_ro),
            family: MaterialFamily::parse(&row.family),
            price_per_kg: row.price_per_kg.and_then(|d| d.to_f64()),
            colors: row.colors,
            description,
        }
    }
}

fn auth_method_str(method: AuthMethod) -> &'static str {
    match method {
        AuthMethod::Google => "google",
        AuthMethod::Phone => "phone",
        AuthMethod::Other => "other",
    }
}

fn auth_method_from_str(s: &str) -> AuthMethod {
    match s {
        "google" => AuthMethod::Google,
        "phone" => AuthMethod::Phone,
        _ => AuthMethod::Other,
    }
}

fn money(value: Option<i64>) -> Option<Decimal> {
    value.map(Decimal::from)
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let material = order.material.as_ref();
        let notes = order.notes.as_ref();
        let customer = order.customer.as_ref();

        sqlx::query(&format!(
            r#"
            INSERT INTO orders ({ORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#
        ))
        .bind(order.id)
        .bind(&order.file_name)
        .bind(&order.file_ref)
        .bind(order.operator_choice)
        .bind(material.map(|m| m.material_id))
        .bind(material.map(|m| m.material_name.clone()))
        .bind(material.and_then(|m| m.color.clone()))
        .bind(notes.and_then(|n| n.purpose.clone()))
        .bind(notes.and_then(|n| n.loads.clone()))
        .bind(order.params.infill_percent.percent() as i32)
        .bind(order.params.layer_height_mm.millimetres())
        .bind(order.params.scale)
        .bind(order.estimate.map(Json))
        .bind(money(order.final_price))
        .bind(order.status.as_str())
        .bind(customer.map(|c| c.name.clone()))
        .bind(customer.map(|c| c.phone.clone()))
        .bind(customer.and_then(|c| c.email.clone()))
        .bind(customer.and_then(|c| c.auth_method).map(auth_method_str))
        .bind(order.created_at)
        .bind(order.approved_at)
        .bind(order.price_modified_at)
        .bind(order.ordered_at)
        .bind(order.completed_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> StoreResult<bool> {
        let customer = order.customer.as_ref();

        // Only the fields operator and customer actions can touch
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                final_price = $3,
                customer_name = $4,
                customer_phone = $5,
                customer_email = $6,
                auth_method = $7,
                approved_at = $8,
                price_modified_at = $9,
                ordered_at = $10,
                completed_at = $11,
                updated_at = $12
            WHERE id = $1 AND status = $13
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(money(order.final_price))
        .bind(customer.map(|c| c.name.clone()))
        .bind(customer.map(|c| c.phone.clone()))
        .bind(customer.and_then(|c| c.email.clone()))
        .bind(customer.and_then(|c| c.auth_method).map(auth_method_str))
        .bind(order.approved_at)
        .bind(order.price_modified_at)
        .bind(order.ordered_at)
        .bind(order.completed_at)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_orders(&self, offset: u32, limit: u32) -> StoreResult<(Vec<Order>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((orders, total.max(0) as u64))
    }

    async fn orders_for_customer(&self, email: &str, limit: u32) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE lower(customer_email) = lower($1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(email)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn count_completed_for_customer(&self, email: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE lower(customer_email) = lower($1) AND status = 'completed'",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn list_materials(&self) -> StoreResult<Vec<MaterialProfile>> {
        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MaterialProfile::from).collect())
    }

    async fn get_material(&self, id: Uuid) -> StoreResult<Option<MaterialProfile>> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MaterialProfile::from))
    }

    async fn insert_material(&self, material: &MaterialProfile) -> StoreResult<()> {
        let description = material.description.as_ref();

        sqlx::query(&format!(
            "INSERT INTO materials ({MATERIAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(material.id)
        .bind(&material.name.ru)
        .bind(&material.name.ro)
        .bind(material.family.as_str())
        .bind(material.price_per_kg.and_then(Decimal::from_f64))
        .bind(&material.colors)
        .bind(description.map(|d| d.ru.clone()))
        .bind(description.map(|d| d.ro.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_material(&self, material: &MaterialProfile) -> StoreResult<bool> {
        let description = material.description.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE materials SET
                name_ru = $2, name_ro = $3, family = $4, price_per_kg = $5,
                colors = $6, description_ru = $7, description_ro = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(material.id)
        .bind(&material.name.ru)
        .bind(&material.name.ro)
        .bind(material.family.as_str())
        .bind(material.price_per_kg.and_then(Decimal::from_f64))
        .bind(&material.colors)
        .bind(description.map(|d| d.ru.clone()))
        .bind(description.map(|d| d.ro.clone()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_material(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
