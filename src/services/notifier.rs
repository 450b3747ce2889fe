//! Operator notifications over the Telegram Bot API.
//!
//! Messages are HTML formatted and sent in the background, with the uploaded
//! model attached when it is on disk. A failed delivery is retried with
//! exponential backoff and then logged. Order handling never waits on the bot.

use backoff::{future::retry, ExponentialBackoffBuilder};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::fmt::Write;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TelegramSettings;
use crate::domain::{AuthMethod, Order};
use crate::history::OPERATOR_CHOICE_LABEL;

const CURRENCY: &str = "MDL";

/// Upper bound on time spent retrying one message
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);

/// Telegram's limit for document captions
const MAX_CAPTION_CHARS: usize = 1024;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    /// Bad chat id or markup will not fix itself; throttling and server
    /// errors might.
    fn is_permanent(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => {
                *status != StatusCode::TOO_MANY_REQUESTS.as_u16() && *status < 500
            }
            Self::Http(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    /// `{api_url}/bot{token}`
    base_url: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                settings.api_url.trim_end_matches('/'),
                settings.bot_token
            ),
            chat_id: settings.chat_id.clone(),
        })
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        with_retry(move || self.send_once(text)).await
    }

    /// Sends the model file with `caption` attached. Captions longer than
    /// Telegram allows go out as a separate message first.
    pub async fn send_document(
        &self,
        caption: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<(), NotifyError> {
        let caption = if caption.chars().count() > MAX_CAPTION_CHARS {
            self.send(caption).await?;
            None
        } else {
            Some(caption)
        };
        with_retry(move || self.send_document_once(caption, file_name, data)).await
    }

    /// Sends in a background task; failures are logged.
    pub fn notify(&self, text: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&text).await {
                warn!(error = %e, "Failed to notify operator");
            }
        });
    }

    /// Background variant of [`send_document`](Self::send_document). An
    /// unreadable file degrades to a text-only message.
    pub fn notify_with_document(&self, caption: String, path: PathBuf, file_name: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let result = match tokio::fs::read(&path).await {
                Ok(data) => notifier.send_document(&caption, &file_name, &data).await,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Model file unreadable, sending text only");
                    notifier.send(&caption).await
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to notify operator");
            }
        });
    }

    async fn send_once(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;
        check(response).await
    }

    async fn send_document_once(
        &self,
        caption: Option<&str>,
        file_name: &str,
        data: &[u8],
    ) -> Result<(), NotifyError> {
        let document = Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("document", document);
        if let Some(caption) = caption {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", "HTML");
        }

        let response = self
            .client
            .post(format!("{}/sendDocument", self.base_url))
            .multipart(form)
            .send()
            .await?;
        check(response).await
    }
}

async fn with_retry<F, Fut>(mut attempt: F) -> Result<(), NotifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), NotifyError>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
        .build();

    retry(policy, || {
        let fut = attempt();
        async move {
            fut.await.map_err(|e| {
                if e.is_permanent() {
                    backoff::Error::permanent(e)
                } else {
                    debug!(error = %e, "Telegram delivery failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        }
    })
    .await
}

async fn check(response: Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn order_created_message(order: &Order) -> String {
    let mut msg = format!("<b>Новый заказ</b> <code>{}</code>\n\n", order.id);
    let _ = writeln!(msg, "<b>Файл:</b> {}", escape_html(&order.file_name));

    match &order.material {
        Some(m) => {
            let _ = write!(msg, "<b>Материал:</b> {}", escape_html(&m.material_name));
            if let Some(color) = &m.color {
                let _ = write!(msg, " ({})", escape_html(color));
            }
            msg.push('\n');
        }
        None => {
            let _ = writeln!(msg, "<b>Материал:</b> {}", OPERATOR_CHOICE_LABEL);
        }
    }
    if let Some(notes) = &order.notes {
        if let Some(purpose) = notes.purpose.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(msg, "<b>Назначение:</b> {}", escape_html(purpose));
        }
        if let Some(loads) = notes.loads.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(msg, "<b>Нагрузки:</b> {}", escape_html(loads));
        }
    }

    let _ = writeln!(
        msg,
        "<b>Параметры:</b> заполнение {}%, слой {:.2} мм, масштаб {:.2}",
        order.params.infill_percent.percent(),
        order.params.layer_height_mm.millimetres(),
        order.params.scale
    );

    if let Some(estimate) = &order.estimate {
        let _ = writeln!(
            msg,
            "<b>Расчёт клиента:</b> {} {}, {:.1} г, {} мин",
            estimate.total, CURRENCY, estimate.weight_g, estimate.print_time_minutes
        );
    }

    let _ = write!(msg, "\n{}", order.created_at.format("%d.%m.%Y %H:%M"));
    msg
}

/// `discount_percent` is only shown for Google-authenticated customers.
pub fn order_confirmed_message(order: &Order, discount_percent: Option<u32>) -> String {
    let mut msg = format!("<b>Заказ оформлен</b> <code>{}</code>\n\n", order.id);
    let _ = writeln!(msg, "<b>Файл:</b> {}", escape_html(&order.file_name));
    if let Some(price) = order.agreed_price() {
        let _ = writeln!(msg, "<b>Цена:</b> {} {}", price, CURRENCY);
    }

    if let Some(customer) = &order.customer {
        let _ = writeln!(msg, "<b>Клиент:</b> {}", escape_html(&customer.name));
        let _ = writeln!(msg, "<b>Телефон:</b> {}", escape_html(&customer.phone));
        if let Some(email) = &customer.email {
            let _ = writeln!(msg, "<b>Email:</b> {}", escape_html(email));
        }
        if customer.auth_method == Some(AuthMethod::Google) {
            if let Some(discount) = discount_percent.filter(|d| *d > 0) {
                let _ = writeln!(msg, "<b>Скидка постоянного клиента:</b> {}%", discount);
            }
        }
    }
    msg
}
