//! End-to-end: the customer workflow talking to a live Order Service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use printquote::app::{create_app, AppState};
use printquote::config::{PollPolicy, Settings, WorkflowSettings};
use printquote::domain::{
    AuthMethod, CustomerIdentity, Extents, LocalizedText, MaterialFamily, MaterialProfile,
    OrderStatus,
};
use printquote::history::OrderHistory;
use printquote::services::HttpOrderService;
use printquote::store::{MemoryStore, OrderStore};
use printquote::workflow::{OrderWorkflow, WorkflowError, WorkflowState};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

const SECRET: &str = "integration-secret-integration-secret";

struct Server {
    addr: SocketAddr,
    state: Arc<AppState>,
    http: reqwest::Client,
    _uploads: TempDir,
}

impl Server {
    async fn start() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_materials(vec![MaterialProfile {
            id: Uuid::new_v4(),
            name: LocalizedText::new("PLA", "PLA"),
            family: MaterialFamily::Pla,
            price_per_kg: Some(290.0),
            colors: vec!["White".into(), "Black".into()],
            description: None,
        }]);
        let state = AppState::new(
            Arc::new(store),
            Settings::local(SECRET, uploads.path()),
            None,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_app(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            http: reqwest::Client::new(),
            _uploads: uploads,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn operator(&self, path: &str, body: Option<Value>) -> reqwest::StatusCode {
        let token = self
            .state
            .tokens
            .issue("olga", chrono::Duration::hours(1))
            .unwrap();
        let mut request = self.http.put(self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.unwrap().status()
    }

    async fn order_status(&self, order_id: Uuid) -> Value {
        self.http
            .get(self.url(&format!("/orders/{order_id}/status")))
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap()["data"]
            .clone()
    }

    fn workflow(&self, history: &TempDir) -> OrderWorkflow<HttpOrderService> {
        let settings = WorkflowSettings {
            order_service_url: format!("http://{}", self.addr),
            request_timeout: Duration::from_secs(5),
            poll: PollPolicy {
                interval: Duration::from_millis(50),
                max_attempts: 200,
                failure_threshold: 3,
            },
            history_path: history.path().join("history.json"),
            history_capacity: 10,
            reset_delay: Duration::from_millis(100),
        };
        let service =
            HttpOrderService::new(&settings.order_service_url, settings.request_timeout).unwrap();
        let history = OrderHistory::open(&settings.history_path, settings.history_capacity);
        OrderWorkflow::new(Arc::new(service), history, &settings)
    }
}

async fn wait_for_state<F>(workflow: &OrderWorkflow<HttpOrderService>, done: F) -> WorkflowState
where
    F: Fn(&WorkflowState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let state = workflow.state();
            if done(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("workflow did not reach the expected state")
}

fn customer() -> CustomerIdentity {
    CustomerIdentity {
        name: "Ion Popescu".into(),
        phone: "+37369000000".into(),
        email: Some("ion@example.com".into()),
        auth_method: Some(AuthMethod::Google),
    }
}

async fn prepared_workflow(server: &Server, history: &TempDir) -> OrderWorkflow<HttpOrderService> {
    let workflow = server.workflow(history);
    let materials = workflow.materials().await.unwrap();
    assert_eq!(materials.len(), 1);

    let outcome = workflow
        .attach_model("cube.stl", b"solid cube".to_vec(), Extents::new(50.0, 50.0, 50.0))
        .unwrap();
    assert_eq!(outcome.applied, 1.0);
    workflow.select_material(materials.into_iter().next());
    workflow.select_color(Some("White".into())).unwrap();
    assert_eq!(workflow.estimate().map(|e| e.total), Some(93));
    workflow
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn approved_order_is_placed_end_to_end() {
    let server = Server::start().await;
    let history = tempfile::tempdir().unwrap();
    let workflow = prepared_workflow(&server, &history).await;

    let order_id = workflow.submit().await.unwrap();
    assert_eq!(workflow.state(), WorkflowState::AwaitingConfirmation { order_id });
    assert_eq!(server.order_status(order_id).await["status"], "pending");

    let status = server
        .operator(&format!("/orders/{order_id}/approve"), None)
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let state = wait_for_state(&workflow, |s| !s.is_awaiting(order_id)).await;
    assert_eq!(state, WorkflowState::Approved { order_id, price: 93 });

    let price = workflow.finalize(customer()).await.unwrap();
    assert_eq!(price, 93);
    assert_eq!(workflow.state(), WorkflowState::Completed { order_id, price: 93 });

    let remote = server.order_status(order_id).await;
    assert_eq!(remote["status"], "ordered");
    assert_eq!(remote["final_cost"], 93);

    let entry = workflow.history().get(order_id).unwrap();
    assert_eq!(entry.status, OrderStatus::Ordered);
    assert_eq!(entry.final_price, Some(93));
    assert_eq!(entry.material_name, "PLA");

    wait_for_state(&workflow, |s| *s == WorkflowState::NotSubmitted).await;
    assert!(workflow.draft().model().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operator_price_change_reaches_the_customer() {
    let server = Server::start().await;
    let history = tempfile::tempdir().unwrap();
    let workflow = prepared_workflow(&server, &history).await;

    let order_id = workflow.submit().await.unwrap();
    let status = server
        .operator(
            &format!("/orders/{order_id}/price"),
            Some(json!({ "final_price": 140 })),
        )
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let state = wait_for_state(&workflow, |s| !s.is_awaiting(order_id)).await;
    assert_eq!(state, WorkflowState::PriceChanged { order_id, price: 140 });

    assert_eq!(workflow.finalize(customer()).await.unwrap(), 140);
    assert_eq!(server.order_status(order_id).await["final_cost"], 140);

    let status = server
        .operator(&format!("/orders/{order_id}/complete"), None)
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let discount: Value = server
        .http
        .get(server.url("/customers/ion@example.com/discount"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(discount["data"]["discount_percent"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn price_changed_after_approval_is_confirmed_at_the_new_price() {
    let server = Server::start().await;
    let history = tempfile::tempdir().unwrap();
    let workflow = prepared_workflow(&server, &history).await;

    let order_id = workflow.submit().await.unwrap();
    server
        .operator(&format!("/orders/{order_id}/approve"), None)
        .await;
    let state = wait_for_state(&workflow, |s| !s.is_awaiting(order_id)).await;
    assert_eq!(state, WorkflowState::Approved { order_id, price: 93 });

    // Polling has stopped; the customer still sees 93
    let status = server
        .operator(
            &format!("/orders/{order_id}/price"),
            Some(json!({ "final_price": 120 })),
        )
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    assert_eq!(
        workflow.finalize(customer()).await,
        Err(WorkflowError::PriceUpdated { price: 120 })
    );
    assert_eq!(workflow.state(), WorkflowState::PriceChanged { order_id, price: 120 });
    assert_eq!(server.order_status(order_id).await["status"], "price_changed");

    assert_eq!(workflow.finalize(customer()).await, Ok(120));
    let remote = server.order_status(order_id).await;
    assert_eq!(remote["status"], "ordered");
    assert_eq!(remote["final_cost"], 120);
    assert_eq!(
        workflow.history().get(order_id).unwrap().final_price,
        Some(120)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn double_submit_creates_one_order() {
    let server = Server::start().await;
    let history = tempfile::tempdir().unwrap();
    let workflow = prepared_workflow(&server, &history).await;

    let (first, second) = futures::join!(workflow.submit(), workflow.submit());
    let created: Vec<Uuid> = [&first, &second]
        .into_iter()
        .filter_map(|r| r.as_ref().ok().copied())
        .collect();
    assert_eq!(created.len(), 1);
    assert!(matches!(
        (&first, &second),
        (Ok(_), Err(WorkflowError::Busy)) | (Err(WorkflowError::Busy), Ok(_))
    ));

    let (_, total) = server.state.store.list_orders(0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(workflow.history().len(), 1);
}
