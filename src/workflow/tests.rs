use super::*;
use crate::domain::{AuthMethod, LocalizedText, MaterialFamily, OrderCreated, OrderStatusResponse, UploadedModel};
use async_trait::async_trait;
use std::collections::VecDeque;
use tempfile::TempDir;

type Scripted = Result<(OrderStatus, Option<i64>), ServiceError>;

#[derive(Default)]
struct MockService {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    latency: Duration,
    uploads: Vec<String>,
    created: Vec<(Uuid, CreateOrderRequest)>,
    script: VecDeque<Scripted>,
    polls: u32,
    confirms: Vec<(Uuid, ConfirmOrderRequest)>,
    fail_upload: Option<ServiceError>,
    fail_confirm: Option<ServiceError>,
}

impl MockService {
    fn push(&self, scripted: Scripted) {
        self.state.lock().script.push_back(scripted);
    }

    async fn delay(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn response(
        state: &MockState,
        order_id: Uuid,
        status: OrderStatus,
        final_cost: Option<i64>,
    ) -> OrderStatusResponse {
        let request = state
            .created
            .iter()
            .find(|(id, _)| *id == order_id)
            .map(|(_, r)| r);
        OrderStatusResponse {
            order_id,
            status,
            file_name: request.map(|r| r.file_name.clone()).unwrap_or_default(),
            material_name: request
                .and_then(|r| r.material.as_ref())
                .map(|m| m.material_name.clone()),
            estimated_cost: request.and_then(|r| r.estimate).map(|e| e.total),
            final_cost,
            approved_at: None,
            price_modified_at: None,
            ordered_at: None,
            completed_at: None,
        }
    }
}

#[async_trait]
impl OrderService for MockService {
    async fn upload_model(
        &self,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedModel, ServiceError> {
        self.delay().await;
        let mut state = self.state.lock();
        if let Some(e) = state.fail_upload.take() {
            return Err(e);
        }
        state.uploads.push(file_name.to_string());
        Ok(UploadedModel {
            file_ref: format!("uploads/{file_name}"),
            file_name: file_name.to_string(),
            size_bytes: data.len() as u64,
        })
    }

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<OrderCreated, ServiceError> {
        self.delay().await;
        let order_id = Uuid::new_v4();
        self.state.lock().created.push((order_id, request.clone()));
        Ok(OrderCreated {
            order_id,
            status: OrderStatus::Pending,
        })
    }

    async fn order_status(&self, order_id: Uuid) -> Result<OrderStatusResponse, ServiceError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.polls += 1;
        let (status, final_cost) = match state.script.pop_front() {
            Some(scripted) => scripted?,
            None => (OrderStatus::Pending, None),
        };
        Ok(Self::response(&state, order_id, status, final_cost))
    }

    async fn confirm_order(
        &self,
        order_id: Uuid,
        request: &ConfirmOrderRequest,
    ) -> Result<OrderStatusResponse, ServiceError> {
        self.delay().await;
        let mut state = self.state.lock();
        if let Some(e) = state.fail_confirm.take() {
            return Err(e);
        }
        state.confirms.push((order_id, request.clone()));
        Ok(Self::response(
            &state,
            order_id,
            OrderStatus::Ordered,
            request.final_price,
        ))
    }

    async fn list_materials(&self) -> Result<Vec<MaterialProfile>, ServiceError> {
        Ok(vec![pla()])
    }
}

struct Fixture {
    service: Arc<MockService>,
    workflow: OrderWorkflow<MockService>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    fixture_with(PollPolicy::default())
}

fn fixture_with(poll: PollPolicy) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let settings = WorkflowSettings {
        history_path: dir.path().join("history.json"),
        poll,
        ..Default::default()
    };
    let service = Arc::new(MockService::default());
    let history = OrderHistory::open(&settings.history_path, settings.history_capacity);
    let workflow = OrderWorkflow::new(Arc::clone(&service), history, &settings);
    Fixture {
        service,
        workflow,
        _dir: dir,
    }
}

fn pla() -> MaterialProfile {
    MaterialProfile {
        id: Uuid::from_u128(1),
        name: LocalizedText::new("PLA Белый", "PLA Alb"),
        family: MaterialFamily::Pla,
        price_per_kg: Some(290.0),
        colors: vec!["White".into(), "Black".into()],
        description: None,
    }
}

fn customer() -> CustomerIdentity {
    CustomerIdentity {
        name: "Maria Rusu".into(),
        phone: "+37369111222".into(),
        email: Some("maria@example.com".into()),
        auth_method: Some(AuthMethod::Google),
    }
}

/// 50 mm PLA cube at 20% / 0.20 mm, estimated at 93.
fn prepare(workflow: &OrderWorkflow<MockService>) {
    workflow
        .attach_model("cube.stl", vec![0u8; 84], Extents::new(50.0, 50.0, 50.0))
        .unwrap();
    workflow.select_material(Some(pla()));
    workflow.select_color(Some("White".into())).unwrap();
}

async fn settle(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn submit_requires_a_complete_draft() {
    let f = fixture();
    let wf = &f.workflow;

    assert_eq!(
        wf.submit().await,
        Err(WorkflowError::Validation(ValidationError::MissingModel))
    );

    wf.attach_model("cube.obj", vec![1, 2, 3], Extents::new(50.0, 50.0, 50.0))
        .unwrap();
    assert_eq!(
        wf.submit().await,
        Err(WorkflowError::Validation(ValidationError::MissingMaterial))
    );

    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
    assert!(f.service.state.lock().uploads.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejects_unsupported_model_files() {
    let f = fixture();
    let result = f
        .workflow
        .attach_model("part.step", vec![], Extents::new(1.0, 1.0, 1.0));
    assert!(matches!(
        result,
        Err(WorkflowError::Validation(ValidationError::UnsupportedFile(_)))
    ));
    assert!(f.workflow.draft().model().is_none());
}

#[tokio::test(start_paused = true)]
async fn setters_recompute_the_estimate() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    assert_eq!(wf.estimate().map(|e| e.total), Some(93));

    let outcome = wf.set_scale(2.0).unwrap();
    assert!(!outcome.clamped);
    let doubled = wf.estimate().unwrap().total;
    assert!(doubled > 93);

    let outcome = wf.set_axis_length(Axis::Z, "1000").unwrap();
    assert!(outcome.clamped);
    assert!((outcome.applied - 6.0).abs() < 1e-9);

    wf.reset_scale().unwrap();
    wf.set_infill(100).unwrap();
    assert!(wf.estimate().unwrap().total > 93);
    assert!(matches!(
        wf.set_infill(15),
        Err(WorkflowError::Validation(ValidationError::InvalidInfill(15)))
    ));

    wf.set_operator_choice(true, OperatorNotes::default());
    assert_eq!(wf.estimate(), None);
    assert!(wf.draft().material().is_none());
}

#[tokio::test(start_paused = true)]
async fn color_must_belong_to_material() {
    let f = fixture();
    let wf = &f.workflow;
    assert!(wf.select_color(Some("White".into())).is_err());

    wf.select_material(Some(pla()));
    assert_eq!(
        wf.select_color(Some("Gold".into())),
        Err(WorkflowError::Validation(ValidationError::UnknownColor(
            "Gold".into()
        )))
    );
    wf.select_color(Some("Black".into())).unwrap();
    assert_eq!(wf.draft().color(), Some("Black"));
}

#[tokio::test(start_paused = true)]
async fn approval_arrives_through_polling() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::Pending, None)));
    f.service.push(Ok((OrderStatus::Approved, None)));

    let order_id = wf.submit().await.unwrap();
    assert_eq!(wf.state(), WorkflowState::AwaitingConfirmation { order_id });

    let entry = wf.history().get(order_id).unwrap();
    assert_eq!(entry.status, OrderStatus::Pending);
    assert_eq!(entry.estimated_total, Some(93));
    assert_eq!(entry.material_name, "PLA Белый");
    assert_eq!(entry.color.as_deref(), Some("White"));

    settle(15).await;
    assert_eq!(wf.poll_progress(), PollProgress::Waiting { attempts: 1 });

    settle(10).await;
    assert_eq!(
        wf.state(),
        WorkflowState::Approved {
            order_id,
            price: 93
        }
    );
    assert_eq!(wf.poll_progress(), PollProgress::Settled);
    assert_eq!(
        wf.history().get(order_id).unwrap().status,
        OrderStatus::Approved
    );

    // Settled: no further requests
    settle(60).await;
    assert_eq!(f.service.state.lock().polls, 2);
}

#[tokio::test(start_paused = true)]
async fn changed_price_is_confirmed_and_recorded() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::PriceChanged, Some(120))));

    let order_id = wf.submit().await.unwrap();
    settle(11).await;
    assert_eq!(
        wf.state(),
        WorkflowState::PriceChanged {
            order_id,
            price: 120
        }
    );

    let final_price = wf.finalize(customer()).await.unwrap();
    assert_eq!(final_price, 120);
    assert_eq!(
        wf.state(),
        WorkflowState::Completed {
            order_id,
            price: 120
        }
    );

    let confirms = f.service.state.lock().confirms.clone();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].0, order_id);
    assert_eq!(confirms[0].1.final_price, Some(120));
    assert_eq!(confirms[0].1.customer_name, "Maria Rusu");

    let entry = wf.history().get(order_id).unwrap();
    assert_eq!(entry.status, OrderStatus::Ordered);
    assert_eq!(entry.final_price, Some(120));
    assert_eq!(wf.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn finalize_failure_returns_to_confirmed_state() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::Approved, None)));
    let order_id = wf.submit().await.unwrap();
    settle(11).await;

    f.service.state.lock().fail_confirm = Some(ServiceError::Unavailable("timeout".into()));
    let err = wf.finalize(customer()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Service(ServiceError::Unavailable(_))));
    assert_eq!(
        wf.state(),
        WorkflowState::Approved {
            order_id,
            price: 93
        }
    );
    assert!(!wf.is_busy());

    assert_eq!(wf.finalize(customer()).await, Ok(93));
}

#[tokio::test(start_paused = true)]
async fn finalize_needs_operator_confirmation_and_valid_identity() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    let order_id = wf.submit().await.unwrap();

    assert_eq!(
        wf.finalize(customer()).await,
        Err(WorkflowError::InvalidTransition {
            action: "finalize",
            state: "awaiting confirmation"
        })
    );
    assert_eq!(wf.state(), WorkflowState::AwaitingConfirmation { order_id });

    let mut nameless = customer();
    nameless.name = " ".into();
    assert_eq!(
        wf.finalize(nameless).await,
        Err(WorkflowError::Validation(ValidationError::MissingCustomerName))
    );
    assert!(f.service.state.lock().confirms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_create_one_order() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.state.lock().latency = Duration::from_secs(1);

    let (first, second) = tokio::join!(wf.submit(), wf.submit());

    assert!(first.is_ok());
    assert_eq!(second, Err(WorkflowError::Busy));
    assert_eq!(f.service.state.lock().created.len(), 1);
    assert_eq!(wf.history().len(), 1);

    // Once submitted, a further submit is a state error rather than a duplicate
    assert!(matches!(
        wf.submit().await,
        Err(WorkflowError::InvalidTransition { action: "submit", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_submission_can_be_retried() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.state.lock().fail_upload = Some(ServiceError::Rejected {
        status: 413,
        message: "File too large".into(),
    });

    assert!(matches!(
        wf.submit().await,
        Err(WorkflowError::Service(ServiceError::Rejected { status: 413, .. }))
    ));
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
    assert!(wf.history().is_empty());

    let order_id = wf.submit().await.unwrap();
    assert_eq!(wf.state(), WorkflowState::AwaitingConfirmation { order_id });
}

#[tokio::test(start_paused = true)]
async fn repeated_poll_failures_degrade_then_recover() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    for _ in 0..3 {
        f.service
            .push(Err(ServiceError::Unavailable("connection refused".into())));
    }
    f.service.push(Ok((OrderStatus::Approved, None)));

    let order_id = wf.submit().await.unwrap();
    settle(25).await;
    assert_eq!(wf.poll_progress(), PollProgress::Waiting { attempts: 2 });

    settle(10).await;
    assert_eq!(
        wf.poll_progress(),
        PollProgress::Degraded {
            consecutive_failures: 3
        }
    );
    assert_eq!(wf.state(), WorkflowState::AwaitingConfirmation { order_id });

    settle(10).await;
    assert_eq!(
        wf.state(),
        WorkflowState::Approved {
            order_id,
            price: 93
        }
    );
}

#[tokio::test(start_paused = true)]
async fn polling_is_bounded_and_resumable() {
    let f = fixture_with(PollPolicy {
        interval: Duration::from_secs(10),
        max_attempts: 2,
        failure_threshold: 3,
    });
    let wf = &f.workflow;
    prepare(wf);

    let order_id = wf.submit().await.unwrap();
    settle(60).await;
    assert_eq!(wf.poll_progress(), PollProgress::GaveUp { attempts: 2 });
    assert_eq!(f.service.state.lock().polls, 2);
    assert_eq!(wf.state(), WorkflowState::AwaitingConfirmation { order_id });

    f.service.push(Ok((OrderStatus::PriceChanged, Some(75))));
    wf.resume_polling().unwrap();
    settle(11).await;
    assert_eq!(
        wf.state(),
        WorkflowState::PriceChanged {
            order_id,
            price: 75
        }
    );
    assert_eq!(
        wf.resume_polling(),
        Err(WorkflowError::InvalidTransition {
            action: "resume polling",
            state: "price changed"
        })
    );
}

#[tokio::test(start_paused = true)]
async fn new_model_abandons_order_and_stops_polling() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::Approved, None)));

    wf.submit().await.unwrap();
    wf.attach_model("other.stl", vec![0u8; 84], Extents::new(20.0, 20.0, 20.0))
        .unwrap();
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
    assert_eq!(wf.poll_progress(), PollProgress::Idle);

    settle(60).await;
    assert_eq!(f.service.state.lock().polls, 0);
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
}

#[tokio::test(start_paused = true)]
async fn late_poll_result_for_abandoned_order_is_ignored() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::Approved, None)));

    wf.submit().await.unwrap();
    // Next status request takes 5s to answer
    f.service.state.lock().latency = Duration::from_secs(5);
    settle(12).await;
    wf.reset().unwrap();

    settle(10).await;
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
    assert_eq!(wf.poll_progress(), PollProgress::Idle);
}

#[tokio::test(start_paused = true)]
async fn operator_choice_submits_without_estimate() {
    let f = fixture();
    let wf = &f.workflow;
    wf.attach_model("gear.obj", vec![0u8; 10], Extents::new(30.0, 30.0, 10.0))
        .unwrap();
    wf.set_operator_choice(
        true,
        OperatorNotes {
            purpose: Some("Replacement gear".into()),
            loads: Some("High torque".into()),
        },
    );

    let order_id = wf.submit().await.unwrap();

    let created = f.service.state.lock().created.clone();
    let request = &created[0].1;
    assert!(request.operator_choice);
    assert!(request.material.is_none());
    assert!(request.estimate.is_none());
    assert_eq!(
        request.notes.as_ref().and_then(|n| n.loads.as_deref()),
        Some("High torque")
    );
    assert_eq!(request.file_ref, "uploads/gear.obj");

    let entry = wf.history().get(order_id).unwrap();
    assert_eq!(entry.material_name, OPERATOR_CHOICE_LABEL);
    assert_eq!(entry.estimated_total, None);
}

fn conflict(message: &str) -> ServiceError {
    ServiceError::Rejected {
        status: 409,
        message: message.into(),
    }
}

/// Submits and lets the poller observe the approval at 93.
async fn approved_order(f: &Fixture) -> Uuid {
    prepare(&f.workflow);
    f.service.push(Ok((OrderStatus::Approved, None)));
    let order_id = f.workflow.submit().await.unwrap();
    settle(11).await;
    assert_eq!(
        f.workflow.state(),
        WorkflowState::Approved {
            order_id,
            price: 93
        }
    );
    order_id
}

#[tokio::test(start_paused = true)]
async fn price_changed_after_approval_is_adopted() {
    let f = fixture();
    let wf = &f.workflow;
    let order_id = approved_order(&f).await;

    // Operator repriced after the poller settled
    f.service.state.lock().fail_confirm = Some(conflict("Agreed price is 120, request carried 93"));
    f.service.push(Ok((OrderStatus::PriceChanged, Some(120))));

    assert_eq!(
        wf.finalize(customer()).await,
        Err(WorkflowError::PriceUpdated { price: 120 })
    );
    assert_eq!(
        wf.state(),
        WorkflowState::PriceChanged {
            order_id,
            price: 120
        }
    );
    let entry = wf.history().get(order_id).unwrap();
    assert_eq!(entry.status, OrderStatus::PriceChanged);
    assert_eq!(entry.final_price, Some(120));

    assert_eq!(wf.finalize(customer()).await, Ok(120));
    let confirms = f.service.state.lock().confirms.clone();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].1.final_price, Some(120));
    assert_eq!(
        wf.state(),
        WorkflowState::Completed {
            order_id,
            price: 120
        }
    );
}

#[tokio::test(start_paused = true)]
async fn conflict_on_already_placed_order_completes() {
    let f = fixture();
    let wf = &f.workflow;
    let order_id = approved_order(&f).await;

    f.service.state.lock().fail_confirm = Some(conflict("Order is ordered; cannot confirm"));
    f.service.push(Ok((OrderStatus::Ordered, Some(93))));

    assert_eq!(wf.finalize(customer()).await, Ok(93));
    assert_eq!(
        wf.state(),
        WorkflowState::Completed {
            order_id,
            price: 93
        }
    );
    let entry = wf.history().get(order_id).unwrap();
    assert_eq!(entry.status, OrderStatus::Ordered);
    assert_eq!(entry.final_price, Some(93));
}

#[tokio::test(start_paused = true)]
async fn conflict_without_a_change_keeps_the_confirmed_state() {
    let f = fixture();
    let wf = &f.workflow;
    let order_id = approved_order(&f).await;

    f.service.state.lock().fail_confirm = Some(conflict("Order was modified concurrently"));
    f.service.push(Ok((OrderStatus::Approved, None)));

    assert!(matches!(
        wf.finalize(customer()).await,
        Err(WorkflowError::Service(ServiceError::Rejected { status: 409, .. }))
    ));
    assert_eq!(
        wf.state(),
        WorkflowState::Approved {
            order_id,
            price: 93
        }
    );
    assert_eq!(wf.finalize(customer()).await, Ok(93));
}

#[tokio::test(start_paused = true)]
async fn order_placed_elsewhere_is_shown_as_completed() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    f.service.push(Ok((OrderStatus::Completed, Some(110))));

    let order_id = wf.submit().await.unwrap();
    settle(11).await;

    assert_eq!(
        wf.state(),
        WorkflowState::Completed {
            order_id,
            price: 110
        }
    );
    assert_eq!(
        wf.history().get(order_id).unwrap().status,
        OrderStatus::Completed
    );
    assert!(matches!(
        wf.finalize(customer()).await,
        Err(WorkflowError::InvalidTransition { action: "finalize", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn completed_order_resets_after_delay() {
    let f = fixture();
    let wf = &f.workflow;
    prepare(wf);
    wf.set_infill(40).unwrap();
    f.service.push(Ok((OrderStatus::Approved, None)));
    let order_id = wf.submit().await.unwrap();
    settle(11).await;
    wf.finalize(customer()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2999)).await;
    assert_eq!(
        wf.state(),
        WorkflowState::Completed {
            order_id,
            price: 93
        }
    );

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);
    let draft = wf.draft();
    assert!(draft.model().is_none());
    assert!(draft.material().is_none());
    assert!(draft.estimate().is_none());
    assert_eq!(draft.params().infill.percent(), 40);

    prepare(wf);
    assert!(wf.submit().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn new_model_during_completed_cancels_the_reset() {
    let f = fixture();
    let wf = &f.workflow;
    approved_order(&f).await;
    wf.finalize(customer()).await.unwrap();

    wf.attach_model("next.stl", vec![0u8; 84], Extents::new(20.0, 20.0, 20.0))
        .unwrap();
    assert_eq!(wf.state(), WorkflowState::NotSubmitted);

    settle(10).await;
    let draft = wf.draft();
    assert_eq!(draft.model().map(|m| m.name.as_str()), Some("next.stl"));
}
