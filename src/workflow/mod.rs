//! Client-side order confirmation workflow.
//!
//! Sequences a single order from the customer's side: the draft (model,
//! material, print parameters) feeds a live price preview; `submit` creates
//! an unconfirmed order and starts polling for the operator's decision; once
//! the operator approves or changes the price, `finalize` attaches the
//! customer's identity and places the order.
//!
//! The workflow is shared behind `&self`. State lives in one mutex that is
//! never held across an `.await`; submit and finalize additionally hold an
//! in-flight flag so a second concurrent call is refused with
//! [`WorkflowError::Busy`] instead of reaching the service twice.

mod error;
mod poller;
mod service;
mod state;

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{PollPolicy, WorkflowSettings};
use crate::domain::{
    is_supported_model_file, Axis, ConfirmOrderRequest, CreateOrderRequest, CustomerIdentity,
    Extents, Infill, LayerHeight, Locale, MaterialProfile, MaterialSelection, ModelGeometry,
    OperatorNotes, OrderParams, OrderStatus, PrintParameters, ScaleOutcome, ValidationError,
};
use crate::estimator::{CostModel, PriceEstimate};
use crate::history::{OrderHistory, OrderHistoryEntry, OPERATOR_CHOICE_LABEL};

pub use error::WorkflowError;
pub use poller::PollProgress;
pub use service::{OrderService, ServiceError};
pub use state::{Confirmation, PollOutcome, WorkflowState};

/// Model file picked by the customer
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

/// Everything the customer has chosen for the next order
#[derive(Debug, Clone, Default)]
pub struct Draft {
    model: Option<ModelFile>,
    geometry: Option<ModelGeometry>,
    material: Option<MaterialProfile>,
    color: Option<String>,
    params: PrintParameters,
    estimate: Option<PriceEstimate>,
}

impl Draft {
    pub fn model(&self) -> Option<&ModelFile> {
        self.model.as_ref()
    }

    pub fn geometry(&self) -> Option<&ModelGeometry> {
        self.geometry.as_ref()
    }

    pub fn material(&self) -> Option<&MaterialProfile> {
        self.material.as_ref()
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn params(&self) -> &PrintParameters {
        &self.params
    }

    pub fn estimate(&self) -> Option<PriceEstimate> {
        self.estimate
    }

    fn recompute(&mut self, cost_model: &CostModel) {
        self.estimate = if self.params.operator_choice {
            None
        } else {
            cost_model.estimate(self.geometry.as_ref(), self.material.as_ref(), &self.params)
        };
    }

    /// Clears the order-specific choices; infill and layer height carry over.
    fn clear(&mut self) {
        let params = PrintParameters {
            infill: self.params.infill,
            layer_height: self.params.layer_height,
            ..Default::default()
        };
        *self = Draft {
            params,
            ..Default::default()
        };
    }

    fn check_ready(&self) -> Result<(&ModelFile, &ModelGeometry), ValidationError> {
        let (Some(model), Some(geometry)) = (&self.model, &self.geometry) else {
            return Err(ValidationError::MissingModel);
        };
        if !self.params.operator_choice {
            if self.material.is_none() {
                return Err(ValidationError::MissingMaterial);
            }
            if self.estimate.is_none() {
                return Err(ValidationError::MissingEstimate);
            }
        }
        Ok((model, geometry))
    }
}

pub(crate) struct Shared {
    draft: Draft,
    state: WorkflowState,
    progress: PollProgress,
    in_flight: bool,
    poller: Option<JoinHandle<()>>,
    /// Clears a completed order after `reset_delay`
    reset_timer: Option<JoinHandle<()>>,
    reset_delay: Duration,
}

impl Shared {
    fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    fn cancel_reset(&mut self) {
        if let Some(handle) = self.reset_timer.take() {
            handle.abort();
        }
    }

    /// Enters `Completed` and arms the delayed reset.
    fn complete(&mut self, shared: &Arc<Mutex<Shared>>, order_id: Uuid, price: i64) {
        self.stop_polling();
        self.cancel_reset();
        self.state = WorkflowState::Completed { order_id, price };
        self.progress = PollProgress::Idle;
        self.reset_timer = Some(spawn_reset(Arc::clone(shared), order_id, self.reset_delay));
    }

    fn ensure_idle(&self) -> Result<(), WorkflowError> {
        if self.in_flight {
            Err(WorkflowError::Busy)
        } else {
            Ok(())
        }
    }

    /// Drops any order in progress and returns to `NotSubmitted`.
    fn abandon(&mut self) {
        self.stop_polling();
        self.cancel_reset();
        if let Some(order_id) = self.state.order_id() {
            debug!(%order_id, state = self.state.name(), "Abandoning order");
        }
        self.state = WorkflowState::NotSubmitted;
        self.progress = PollProgress::Idle;
    }
}

fn spawn_reset(shared: Arc<Mutex<Shared>>, order_id: Uuid, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let mut inner = shared.lock();
        let showing = matches!(
            inner.state,
            WorkflowState::Completed { order_id: id, .. } if id == order_id
        );
        if !showing {
            return;
        }
        inner.reset_timer = None;
        inner.abandon();
        inner.draft.clear();
        debug!(%order_id, "Workflow reset after completed order");
    })
}

/// Resets `in_flight` however the request future ends, including on drop.
struct InFlight<'a>(&'a Mutex<Shared>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

pub struct OrderWorkflow<S: OrderService> {
    service: Arc<S>,
    history: OrderHistory,
    cost_model: CostModel,
    poll: PollPolicy,
    locale: Locale,
    shared: Arc<Mutex<Shared>>,
}

impl<S: OrderService> OrderWorkflow<S> {
    pub fn new(service: Arc<S>, history: OrderHistory, settings: &WorkflowSettings) -> Self {
        Self {
            service,
            history,
            cost_model: CostModel::STANDARD,
            poll: settings.poll,
            locale: Locale::default(),
            shared: Arc::new(Mutex::new(Shared {
                draft: Draft::default(),
                state: WorkflowState::NotSubmitted,
                progress: PollProgress::Idle,
                in_flight: false,
                poller: None,
                reset_timer: None,
                reset_delay: settings.reset_delay,
            })),
        }
    }

    /// Locale used for material names sent with the order.
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.shared.lock().state.clone()
    }

    pub fn poll_progress(&self) -> PollProgress {
        self.shared.lock().progress
    }

    pub fn draft(&self) -> Draft {
        self.shared.lock().draft.clone()
    }

    pub fn estimate(&self) -> Option<PriceEstimate> {
        self.shared.lock().draft.estimate
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().in_flight
    }

    pub fn history(&self) -> &OrderHistory {
        &self.history
    }

    /// Catalogue for the material picker.
    pub async fn materials(&self) -> Result<Vec<MaterialProfile>, WorkflowError> {
        Ok(self.service.list_materials().await?)
    }

    // ---------------------------------------------------------------------
    // Draft editing
    // ---------------------------------------------------------------------

    /// Attaches a new model. Any order in progress is abandoned and its
    /// polling stopped.
    pub fn attach_model(
        &self,
        file_name: impl Into<String>,
        data: Vec<u8>,
        extents: Extents,
    ) -> Result<ScaleOutcome, WorkflowError> {
        let file_name = file_name.into();
        if !is_supported_model_file(&file_name) {
            return Err(ValidationError::UnsupportedFile(file_name).into());
        }
        let geometry = ModelGeometry::new(extents)?;

        let mut inner = self.shared.lock();
        inner.ensure_idle()?;
        inner.abandon();

        let outcome = ScaleOutcome {
            applied: geometry.scale(),
            clamped: geometry.scale() < 1.0,
        };
        debug!(file_name = %file_name, scale = outcome.applied, "Model attached");

        inner.draft.model = Some(ModelFile {
            name: file_name,
            data: Arc::new(data),
        });
        inner.draft.geometry = Some(geometry);
        inner.draft.recompute(&self.cost_model);
        Ok(outcome)
    }

    pub fn clear_model(&self) -> Result<(), WorkflowError> {
        let mut inner = self.shared.lock();
        inner.ensure_idle()?;
        inner.abandon();
        inner.draft.model = None;
        inner.draft.geometry = None;
        inner.draft.estimate = None;
        Ok(())
    }

    pub fn set_scale(&self, scale: f64) -> Result<ScaleOutcome, WorkflowError> {
        self.edit_geometry(|g| g.set_scale(scale))
    }

    /// Sets the scale from a length typed for one axis.
    pub fn set_axis_length(&self, axis: Axis, input: &str) -> Result<ScaleOutcome, WorkflowError> {
        self.edit_geometry(|g| g.set_axis_length(axis, input))
    }

    pub fn reset_scale(&self) -> Result<ScaleOutcome, WorkflowError> {
        self.edit_geometry(|g| Ok(g.reset_scale()))
    }

    /// Selecting a material clears operator choice. A color the new material
    /// does not offer is dropped.
    pub fn select_material(&self, material: Option<MaterialProfile>) {
        let mut inner = self.shared.lock();
        let draft = &mut inner.draft;
        let keep_color = match (&material, &draft.color) {
            (Some(m), Some(color)) => m.colors.is_empty() || m.colors.contains(color),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !keep_color {
            draft.color = None;
        }
        if material.is_some() {
            draft.params.operator_choice = false;
        }
        draft.material = material;
        draft.recompute(&self.cost_model);
    }

    pub fn select_color(&self, color: Option<String>) -> Result<(), WorkflowError> {
        let mut inner = self.shared.lock();
        let draft = &mut inner.draft;
        if let Some(color) = &color {
            let material = draft.material.as_ref().ok_or(ValidationError::MissingMaterial)?;
            if !material.colors.is_empty() && !material.colors.contains(color) {
                return Err(ValidationError::UnknownColor(color.clone()).into());
            }
        }
        draft.color = color;
        Ok(())
    }

    pub fn set_infill(&self, percent: u32) -> Result<(), WorkflowError> {
        let infill = Infill::new(percent)?;
        let mut inner = self.shared.lock();
        inner.draft.params.infill = infill;
        inner.draft.recompute(&self.cost_model);
        Ok(())
    }

    pub fn set_layer_height(&self, layer_height: LayerHeight) {
        let mut inner = self.shared.lock();
        inner.draft.params.layer_height = layer_height;
        inner.draft.recompute(&self.cost_model);
    }

    /// Leaves the material to the operator. No price is estimated while set.
    pub fn set_operator_choice(&self, enabled: bool, notes: OperatorNotes) {
        let mut inner = self.shared.lock();
        let draft = &mut inner.draft;
        draft.params.operator_choice = enabled;
        draft.params.notes = notes;
        if enabled {
            draft.material = None;
            draft.color = None;
        }
        draft.recompute(&self.cost_model);
    }

    fn edit_geometry<F>(&self, f: F) -> Result<ScaleOutcome, WorkflowError>
    where
        F: FnOnce(&mut ModelGeometry) -> Result<ScaleOutcome, ValidationError>,
    {
        let mut inner = self.shared.lock();
        let geometry = inner
            .draft
            .geometry
            .as_mut()
            .ok_or(ValidationError::MissingModel)?;
        let outcome = f(geometry)?;
        if outcome.clamped {
            debug!(scale = outcome.applied, "Scale clamped to build volume");
        }
        inner.draft.recompute(&self.cost_model);
        Ok(outcome)
    }

    // ---------------------------------------------------------------------
    // Order lifecycle
    // ---------------------------------------------------------------------

    /// Uploads the model and creates an unconfirmed order.
    ///
    /// On any failure the workflow stays in `NotSubmitted` and the call can
    /// be retried.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<Uuid, WorkflowError> {
        let (model, request, entry_material) = {
            let mut inner = self.shared.lock();
            inner.ensure_idle()?;
            if inner.state != WorkflowState::NotSubmitted {
                return Err(WorkflowError::InvalidTransition {
                    action: "submit",
                    state: inner.state.name(),
                });
            }
            let prepared = self.prepare_submission(&inner.draft)?;
            inner.in_flight = true;
            prepared
        };
        let _in_flight = InFlight(&self.shared);

        let uploaded = self
            .service
            .upload_model(&model.name, model.data.as_ref().clone())
            .await
            .map_err(|e| {
                warn!(error = %e, "Model upload failed");
                e
            })?;

        let request = CreateOrderRequest {
            file_ref: uploaded.file_ref,
            ..request
        };
        let created = self.service.create_order(&request).await.map_err(|e| {
            warn!(error = %e, "Order creation failed");
            e
        })?;
        let order_id = created.order_id;

        let now = Utc::now();
        self.history.record(OrderHistoryEntry {
            order_id,
            file_name: request.file_name.clone(),
            material_name: entry_material,
            infill_percent: request.params.infill_percent.percent(),
            color: request.material.as_ref().and_then(|m| m.color.clone()),
            status: created.status,
            estimated_total: request.estimate.map(|e| e.total),
            final_price: None,
            recorded_at: now,
            updated_at: now,
        });

        {
            let mut inner = self.shared.lock();
            inner.state = WorkflowState::AwaitingConfirmation { order_id };
            inner.progress = PollProgress::Waiting { attempts: 0 };
            self.start_polling(&mut inner, order_id);
        }

        info!(%order_id, estimate = ?request.estimate.map(|e| e.total), "Order submitted");
        Ok(order_id)
    }

    /// Places a confirmed order with the customer's identity. Returns the
    /// final price.
    ///
    /// When the service refuses with a conflict, the order is re-read: a
    /// price changed in the meantime is adopted and reported as
    /// [`WorkflowError::PriceUpdated`], and an order that was already placed
    /// completes. Any other failure returns to the confirmed state.
    #[instrument(skip(self, identity))]
    pub async fn finalize(&self, identity: CustomerIdentity) -> Result<i64, WorkflowError> {
        identity.validate()?;

        let (order_id, price, confirmation) = {
            let mut inner = self.shared.lock();
            inner.ensure_idle()?;
            let Some(confirmed) = inner.state.confirmed() else {
                return Err(WorkflowError::InvalidTransition {
                    action: "finalize",
                    state: inner.state.name(),
                });
            };
            let (order_id, price, confirmation) = confirmed;
            inner.state = WorkflowState::Finalizing {
                order_id,
                price,
                confirmation,
            };
            inner.in_flight = true;
            confirmed
        };
        let _in_flight = InFlight(&self.shared);

        let request = ConfirmOrderRequest::new(identity, Some(price));
        let error = match self.service.confirm_order(order_id, &request).await {
            Ok(status) => {
                let final_price = status.final_cost.unwrap_or(price);
                let status = if status.status.is_finalized() {
                    status.status
                } else {
                    OrderStatus::Ordered
                };
                self.finish(order_id, status, final_price);
                info!(%order_id, final_price, "Order placed");
                return Ok(final_price);
            }
            Err(e) => e,
        };

        let current = match &error {
            ServiceError::Rejected { status: 409, .. } => {
                match self.service.order_status(order_id).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!(%order_id, error = %e, "Failed to reload order after conflict");
                        None
                    }
                }
            }
            _ => None,
        };
        let outcome = current
            .as_ref()
            .map(|status| (PollOutcome::from_status(status), status.status));

        match outcome {
            Some((PollOutcome::Placed { price: final_price }, status)) => {
                self.finish(order_id, status, final_price);
                info!(%order_id, final_price, "Order was already placed");
                Ok(final_price)
            }
            Some((
                PollOutcome::Confirmed {
                    price: current_price,
                    confirmation: current_confirmation,
                },
                status,
            )) if current_price != price || current_confirmation != confirmation => {
                self.restore(order_id, current_price, current_confirmation);
                self.history.update(order_id, |entry| {
                    entry.status = status;
                    entry.final_price = Some(current_price);
                });
                warn!(%order_id, old_price = price, current_price, "Price changed before the order was placed");
                Err(WorkflowError::PriceUpdated {
                    price: current_price,
                })
            }
            _ => {
                self.restore(order_id, price, confirmation);
                warn!(%order_id, error = %error, "Order confirmation failed");
                Err(error.into())
            }
        }
    }

    /// Starts another polling round after the previous one gave up.
    /// Must be called from within a Tokio runtime.
    pub fn resume_polling(&self) -> Result<(), WorkflowError> {
        let mut inner = self.shared.lock();
        let WorkflowState::AwaitingConfirmation { order_id } = inner.state else {
            return Err(WorkflowError::InvalidTransition {
                action: "resume polling",
                state: inner.state.name(),
            });
        };
        if inner.poller.is_some() {
            return Ok(());
        }
        inner.progress = PollProgress::Waiting { attempts: 0 };
        self.start_polling(&mut inner, order_id);
        info!(%order_id, "Polling resumed");
        Ok(())
    }

    /// Clears the draft and any order in progress.
    pub fn reset(&self) -> Result<(), WorkflowError> {
        let mut inner = self.shared.lock();
        inner.ensure_idle()?;
        inner.abandon();
        inner.draft.clear();
        Ok(())
    }

    /// Completes a finalizing order and records the outcome.
    fn finish(&self, order_id: Uuid, status: OrderStatus, final_price: i64) {
        {
            let mut inner = self.shared.lock();
            if inner.state.is_finalizing(order_id) {
                inner.complete(&self.shared, order_id, final_price);
            }
        }
        self.history.update(order_id, |entry| {
            entry.status = status;
            entry.final_price = Some(final_price);
        });
    }

    /// Returns a finalizing order to the confirmed state.
    fn restore(&self, order_id: Uuid, price: i64, confirmation: Confirmation) {
        let mut inner = self.shared.lock();
        if inner.state.is_finalizing(order_id) {
            inner.state = WorkflowState::confirmed_from(order_id, price, confirmation);
        }
    }

    fn prepare_submission(
        &self,
        draft: &Draft,
    ) -> Result<(ModelFile, CreateOrderRequest, String), ValidationError> {
        let (model, geometry) = draft.check_ready()?;
        let params = &draft.params;

        let (material, entry_material) = match (&draft.material, params.operator_choice) {
            (Some(m), false) => (
                Some(MaterialSelection {
                    material_id: m.id,
                    material_name: m.display_name(self.locale).to_string(),
                    color: draft.color.clone(),
                }),
                m.display_name(self.locale).to_string(),
            ),
            _ => (None, OPERATOR_CHOICE_LABEL.to_string()),
        };

        let request = CreateOrderRequest {
            file_name: model.name.clone(),
            file_ref: String::new(),
            operator_choice: params.operator_choice,
            material,
            notes: params.operator_choice.then(|| params.notes.clone()),
            params: OrderParams {
                infill_percent: params.infill,
                layer_height_mm: params.layer_height,
                scale: geometry.scale(),
            },
            estimate: draft.estimate,
        };
        Ok((model.clone(), request, entry_material))
    }

    fn start_polling(&self, inner: &mut Shared, order_id: Uuid) {
        inner.stop_polling();
        inner.poller = Some(poller::spawn(
            Arc::clone(&self.service),
            Arc::clone(&self.shared),
            self.history.clone(),
            order_id,
            self.poll,
        ));
    }
}

impl<S: OrderService> Drop for OrderWorkflow<S> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.stop_polling();
        inner.cancel_reset();
    }
}

#[cfg(test)]
mod tests;
