//! The dispatch engine: one exchange at a time behind a single submit/cancel
//! control.
//!
//! # Design
//! `DispatchEngine` is an actor. The presentation talks to it through an
//! `EngineHandle` (a queue of `Intent`s) and listens on a queue of
//! `UiEvent`s, which it drains on its own thread or event loop; the engine
//! never calls back into presentation code.
//!
//! The state is a tagged enum. `Idle` owns nothing; `InFlight` owns the only
//! `ExchangeHandle`, which carries the cancel token and the pending transport
//! future. Because the handle lives inside the state, a second exchange cannot
//! be started while one is outstanding, and leaving `InFlight` drops it. The
//! run loop only leaves `InFlight` through `complete`, which is reached once
//! per exchange whether the transport succeeded, failed or was cancelled, and
//! always restores the submit label.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineStopped, TransportError};
use crate::format::format_response;
use crate::http::HttpMethod;
use crate::request::{BodyMode, RequestForm};
use crate::transport::Transport;

pub const STATUS_SENDING: &str = "Sending...";
pub const STATUS_OK: &str = "OK";
pub const STATUS_EMPTY: &str = "Empty response.";
pub const STATUS_CANCELLED: &str = "Cancelled.";

/// The two faces of the single action control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionLabel {
    Submit,
    Cancel,
}

impl ActionLabel {
    pub fn text(self) -> &'static str {
        match self {
            ActionLabel::Submit => "Send",
            ActionLabel::Cancel => "Cancel...",
        }
    }
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Non-empty body, already formatted for display.
    Success(String),
    EmptyResponse,
    Cancelled,
    Failed(String),
}

impl Outcome {
    pub fn status_text(&self) -> String {
        match self {
            Outcome::Success(_) => STATUS_OK.to_string(),
            Outcome::EmptyResponse => STATUS_EMPTY.to_string(),
            Outcome::Cancelled => STATUS_CANCELLED.to_string(),
            Outcome::Failed(message) => format!("Error: {message}"),
        }
    }
}

/// Something the operator did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Submit when idle, cancel when an exchange is in flight.
    SubmitOrCancel,
    /// Cancel the exchange in flight; ignored when idle.
    Cancel,
    SetUrl(String),
    SetToken(String),
    SelectMethod(HttpMethod),
    SelectBodyMode(BodyMode),
    SetRawBody(String),
    SetBuilderRows(Vec<(String, String)>),
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::SubmitOrCancel => "submit_or_cancel",
            Intent::Cancel => "cancel",
            Intent::SetUrl(_) => "set_url",
            Intent::SetToken(_) => "set_token",
            Intent::SelectMethod(_) => "select_method",
            Intent::SelectBodyMode(_) => "select_body_mode",
            Intent::SetRawBody(_) => "set_raw_body",
            Intent::SetBuilderRows(_) => "set_builder_rows",
        }
    }
}

/// Something the presentation should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Status(String),
    Output(String),
    ActionLabel(ActionLabel),
    /// Emitted last for every exchange, after the submit label is restored.
    Finished(Outcome),
}

type ExchangeFuture = Pin<Box<dyn Future<Output = Result<Option<String>, TransportError>> + Send>>;

/// The one outstanding exchange.
///
/// Dropping the handle fires its cancel token, so an exchange abandoned by a
/// stopping engine does not keep running.
pub(crate) struct ExchangeHandle {
    id: Uuid,
    cancel: CancellationToken,
    response: ExchangeFuture,
}

impl ExchangeHandle {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ExchangeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum EngineState {
    Idle,
    InFlight(ExchangeHandle),
}

enum Step {
    Intent(Option<Intent>),
    Completed(Result<Option<String>, TransportError>),
}

/// Owns the form, the state machine and the transport.
pub struct DispatchEngine<T> {
    transport: Arc<T>,
    form: RequestForm,
    state: EngineState,
    intents: mpsc::UnboundedReceiver<Intent>,
    events: mpsc::UnboundedSender<UiEvent>,
}

impl<T: Transport> DispatchEngine<T> {
    /// Create an idle engine with a default form.
    ///
    /// Returns the engine (drive it with `run`), the handle for sending
    /// intents and the receiver the presentation drains for events.
    pub fn new(transport: T) -> (Self, EngineHandle, mpsc::UnboundedReceiver<UiEvent>) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Self {
            transport: Arc::new(transport),
            form: RequestForm::default(),
            state: EngineState::Idle,
            intents: intent_rx,
            events: event_tx,
        };
        (engine, EngineHandle { intents: intent_tx }, event_rx)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, EngineState::Idle)
    }

    pub fn form(&self) -> &RequestForm {
        &self.form
    }

    /// Process intents until every `EngineHandle` is dropped.
    pub async fn run(mut self) {
        loop {
            let step = match &mut self.state {
                EngineState::Idle => Step::Intent(self.intents.recv().await),
                EngineState::InFlight(exchange) => tokio::select! {
                    intent = self.intents.recv() => Step::Intent(intent),
                    result = &mut exchange.response => Step::Completed(result),
                },
            };
            match step {
                Step::Intent(Some(intent)) => self.handle(intent),
                Step::Intent(None) => break,
                Step::Completed(result) => self.complete(result),
            }
        }
        debug!(idle = self.is_idle(), "all engine handles dropped, stopping");
    }

    fn handle(&mut self, intent: Intent) {
        debug!(intent = intent.name(), "intent received");
        match intent {
            Intent::SubmitOrCancel if self.is_idle() => self.submit(),
            Intent::SubmitOrCancel => self.cancel(),
            Intent::Cancel => self.cancel(),
            Intent::SetUrl(url) => self.form.url = url,
            Intent::SetToken(token) => self.form.token = token,
            Intent::SelectMethod(method) => self.form.method = method,
            Intent::SelectBodyMode(mode) => self.form.body_mode = mode,
            Intent::SetRawBody(body) => self.form.raw_body = body,
            Intent::SetBuilderRows(rows) => self.form.rows = rows,
        }
    }

    fn submit(&mut self) {
        let spec = match self.form.to_spec() {
            Ok(spec) => spec,
            Err(err) => {
                debug!(%err, "submit rejected");
                self.emit(UiEvent::Status(err.to_string()));
                return;
            }
        };

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        info!(exchange = %id, method = %spec.method(), url = %spec.url(), "exchange started");

        let transport = Arc::clone(&self.transport);
        let token = cancel.clone();
        let response: ExchangeFuture = Box::pin(async move { transport.execute(spec, token).await });
        self.state = EngineState::InFlight(ExchangeHandle { id, cancel, response });

        self.emit(UiEvent::ActionLabel(ActionLabel::Cancel));
        self.emit(UiEvent::Status(STATUS_SENDING.to_string()));
        self.emit(UiEvent::Output(String::new()));
    }

    fn cancel(&mut self) {
        match &self.state {
            EngineState::Idle => debug!("cancel ignored, nothing in flight"),
            EngineState::InFlight(exchange) if exchange.is_cancelled() => {
                debug!(exchange = %exchange.id, "cancel already requested")
            }
            EngineState::InFlight(exchange) => {
                info!(exchange = %exchange.id, "cancelling exchange");
                exchange.cancel.cancel();
            }
        }
    }

    fn complete(&mut self, result: Result<Option<String>, TransportError>) {
        let EngineState::InFlight(exchange) = std::mem::replace(&mut self.state, EngineState::Idle) else {
            return;
        };
        let id = exchange.id;
        // A cancel that races a completing transport still wins.
        let cancelled = exchange.is_cancelled();
        drop(exchange);

        let outcome = match result {
            _ if cancelled => Outcome::Cancelled,
            Ok(Some(body)) => Outcome::Success(format_response(&body)),
            Ok(None) => Outcome::EmptyResponse,
            Err(err) if err.is_cancelled() => Outcome::Cancelled,
            Err(err) => {
                warn!(exchange = %id, %err, "exchange failed");
                Outcome::Failed(err.to_string())
            }
        };
        info!(exchange = %id, outcome = outcome_name(&outcome), "exchange finished");

        if let Outcome::Success(body) = &outcome {
            self.emit(UiEvent::Output(body.clone()));
        }
        self.emit(UiEvent::Status(outcome.status_text()));
        self.emit(UiEvent::ActionLabel(ActionLabel::Submit));
        self.emit(UiEvent::Finished(outcome));
    }

    fn emit(&self, event: UiEvent) {
        // A presentation that dropped its receiver just stops seeing events.
        let _ = self.events.send(event);
    }
}

fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Success(_) => "success",
        Outcome::EmptyResponse => "empty",
        Outcome::Cancelled => "cancelled",
        Outcome::Failed(_) => "failed",
    }
}

/// Cloneable sender of intents to a running `DispatchEngine`.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    intents: mpsc::UnboundedSender<Intent>,
}

impl EngineHandle {
    pub fn send(&self, intent: Intent) -> Result<(), EngineStopped> {
        self.intents.send(intent).map_err(|_| EngineStopped)
    }

    pub fn submit_or_cancel(&self) -> Result<(), EngineStopped> {
        self.send(Intent::SubmitOrCancel)
    }

    pub fn cancel(&self) -> Result<(), EngineStopped> {
        self.send(Intent::Cancel)
    }

    pub fn set_url(&self, url: impl Into<String>) -> Result<(), EngineStopped> {
        self.send(Intent::SetUrl(url.into()))
    }

    pub fn set_token(&self, token: impl Into<String>) -> Result<(), EngineStopped> {
        self.send(Intent::SetToken(token.into()))
    }

    pub fn select_method(&self, method: HttpMethod) -> Result<(), EngineStopped> {
        self.send(Intent::SelectMethod(method))
    }

    pub fn select_body_mode(&self, mode: BodyMode) -> Result<(), EngineStopped> {
        self.send(Intent::SelectBodyMode(mode))
    }

    pub fn set_raw_body(&self, body: impl Into<String>) -> Result<(), EngineStopped> {
        self.send(Intent::SetRawBody(body.into()))
    }

    pub fn set_builder_rows(&self, rows: Vec<(String, String)>) -> Result<(), EngineStopped> {
        self.send(Intent::SetBuilderRows(rows))
    }
}
