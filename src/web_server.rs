use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    serve, Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitStream, StreamExt},
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::constants;
use crate::error::SendRejected;
use crate::llm_interaction::InferenceClient;
use crate::locale::Locale;
use crate::session::{run_turn, EngineStatus, GatekeeperSession, Liveness, SessionEvent};

/// Messages accepted from the widget, in the same envelope as [`SessionEvent`].
#[derive(Debug, Deserialize)]
#[serde(tag = "message_type", content = "payload")]
enum ClientMessage {
    Send { text: String },
}

#[derive(Debug, Deserialize)]
struct LocaleQuery {
    locale: Option<String>,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    client: Arc<dyn InferenceClient>,
    // Held here so receivers never observe a closed channel.
    engine_status: Arc<watch::Sender<EngineStatus>>,
    temperature: f32,
    default_locale: Locale,
}

impl AppState {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        temperature: f32,
        default_locale: Locale,
    ) -> Result<Self> {
        let templates = create_minijinja_env(constants::TEMPLATES_DIR.clone())
            .context("Failed to initialize template engine")?;
        let (engine_status, _) = watch::channel(EngineStatus::Loading(String::new()));
        Ok(Self {
            templates: Arc::new(templates),
            client,
            engine_status: Arc::new(engine_status),
            temperature,
            default_locale,
        })
    }

    pub fn engine_status(&self) -> Arc<watch::Sender<EngineStatus>> {
        self.engine_status.clone()
    }

    /// `?locale=` wins over the server default; unknown tags mean English.
    fn locale_for(&self, query: &LocaleQuery) -> Locale {
        match query.locale.as_deref() {
            Some(tag) => Locale::resolve(Some(tag)),
            None => self.default_locale,
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: String) -> Result<AutoReloader> {
    let reloader = AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    });
    Ok(reloader)
}

async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<LocaleQuery>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let locale = state.locale_for(&query);
    let strings = locale.profile().strings;
    let status = state.engine_status.borrow().clone();

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    locale => locale.tag(),
                    strings => strings,
                    status => status.display_text(strings),
                    ready => status.is_ready(),
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<LocaleQuery>,
) -> impl IntoResponse {
    let locale = state.locale_for(&query);
    debug!(%locale, "WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, locale))
}

/// One WebSocket connection is one game session.
async fn handle_socket(socket: WebSocket, state: AppState, locale: Locale) {
    info!(%locale, "New WebSocket connection established");
    let (mut sink, mut incoming) = socket.split();
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(64);

    let mut session = GatekeeperSession::new(locale).with_temperature(state.temperature);
    let liveness = session.liveness();

    let writer_liveness = liveness.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        warn!("WebSocket client disconnected or send error. Closing connection.");
                        writer_liveness.cancel();
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize session event: {}", e),
            }
        }
    });

    let mut status_rx = state.engine_status.subscribe();
    session.set_engine_status(status_rx.borrow_and_update().clone());
    let _ = tx.send(session.status_event()).await;

    while liveness.is_alive() {
        tokio::select! {
            Ok(()) = status_rx.changed() => {
                session.set_engine_status(status_rx.borrow_and_update().clone());
                let _ = tx.send(session.status_event()).await;
            }

            msg = incoming.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Send { text }) => {
                            run_turn_while_listening(&mut session, &state, &text, &tx, &mut incoming).await;
                        }
                        Err(e) => warn!("Ignoring malformed client message: {}", e),
                    },
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Received unexpected binary message from client");
                    }
                    // Axum answers pings itself
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                }
            }
        }
    }

    session.teardown();
    drop(tx);
    if let Err(e) = writer.await {
        error!("WebSocket writer task failed: {:?}", e);
    }
    info!(turns = session.messages().len(), "WebSocket connection closed");
}

/// Streams one reply while still reading the socket, so a disconnect cancels
/// the turn and a second send is refused instead of queued.
///
/// Sends arriving mid-turn are answered with `Busy` directly; the session is
/// borrowed by the turn.
async fn run_turn_while_listening(
    session: &mut GatekeeperSession,
    state: &AppState,
    text: &str,
    tx: &mpsc::Sender<SessionEvent>,
    incoming: &mut SplitStream<WebSocket>,
) {
    let liveness: Liveness = session.liveness();
    let turn = run_turn(session, state.client.as_ref(), text, tx);
    tokio::pin!(turn);

    loop {
        tokio::select! {
            outcome = &mut turn => {
                match outcome {
                    Ok(outcome) => debug!(outcome = outcome.kind(), chars = outcome.reply_chars(), "Turn finished"),
                    Err(reason) => debug!(%reason, "Turn rejected"),
                }
                return;
            }
            msg = incoming.next() => match msg {
                Some(Ok(Message::Text(_))) => {
                    let _ = tx.send(SessionEvent::Rejected { reason: SendRejected::Busy }).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("WebSocket client left mid-turn, cancelling");
                    liveness.cancel();
                    // Dropping the turn closes the model stream; nothing is committed.
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Initializes the shared client in the background, publishing progress.
pub fn spawn_engine_initialization(
    client: Arc<dyn InferenceClient>,
    engine_status: Arc<watch::Sender<EngineStatus>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let progress_status = engine_status.clone();
        let progress = move |line: String| {
            progress_status.send_replace(EngineStatus::Loading(line));
        };
        match client.initialize(&progress).await {
            Ok(()) => {
                info!("Inference engine ready");
                engine_status.send_replace(EngineStatus::Ready);
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize inference engine");
                engine_status.send_replace(EngineStatus::Failed(e.to_string()));
            }
        }
    })
}

pub fn build_router(state: AppState) -> Router {
    // Serve the widget script from the static directory
    let static_files_service = ServeDir::new(constants::STATIC_DIR.as_str()).not_found_service(
        tower::service_fn(|_req: Request| async {
            Ok::<Response, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(
    port: u16,
    client: Arc<dyn InferenceClient>,
    temperature: f32,
    default_locale: Locale,
) -> Result<()> {
    let state = AppState::new(client.clone(), temperature, default_locale)?;
    let init_handle = spawn_engine_initialization(client, state.engine_status());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    let served = serve(listener, app.into_make_service())
        .await
        .context("Web server failed");
    init_handle.abort();
    served
}
