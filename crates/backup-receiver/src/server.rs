//! The HTTP front of the receiver.
//!

use core::net::SocketAddr;
use std::{io, sync::Arc, time::SystemTime};

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State, connect_info::Connected},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{USER_AGENT, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    serve::IncomingStream,
};
use chrono::Local;
use http_body_util::BodyExt;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::Notify,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{error, info, warn};

use crate::{Context, IngestError, Receiver, Submission};

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// The receiver handling backups.
    pub receiver: Arc<Receiver>,

    /// Wakes the background sweeper.
    pub sweep: Arc<Notify>,
}

/// The addresses of a connection.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionInfo {
    /// The client's address.
    pub peer: SocketAddr,

    /// The address the connection was accepted on.
    pub local: Option<SocketAddr>,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionInfo {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            peer: *stream.remote_addr(),
            local: stream.io().local_addr().ok(),
        }
    }
}

/// Routes `/` to the backup handler.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(receive_backup))
        .layer(middleware::map_response(security_headers))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C is received.
pub async fn serve(receiver: Receiver) -> Result<(), ServeError> {
    let listener = TcpListener::bind(receiver.config.socket_address)
        .await
        .map_err(ServeError::Bind)?;
    let address = listener.local_addr().map_err(ServeError::Bind)?;

    let state = AppState {
        receiver: Arc::new(receiver),
        sweep: Arc::new(Notify::new()),
    };
    let sweeper = spawn_sweeper(Arc::clone(&state.receiver), Arc::clone(&state.sweep));

    info!("Listening on: {address}");

    let result = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<ConnectionInfo>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(ServeError::Serve);

    sweeper.abort();

    result
}

/// Run the retention sweep on startup, every sweep interval, and whenever `trigger` is
/// notified. Notifications that arrive during a sweep are coalesced into one more sweep.
pub fn spawn_sweeper(receiver: Arc<Receiver>, trigger: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(receiver.config.retention.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = trigger.notified() => {}
            }

            let receiver = Arc::clone(&receiver);
            if let Err(error) =
                tokio::task::spawn_blocking(move || receiver.sweep(SystemTime::now())).await
            {
                error!("[Cleanup] Sweep did not complete: {error}");
            }
        }
    })
}

async fn receive_backup(
    State(state): State<AppState>,
    ConnectInfo(connection): ConnectInfo<ConnectionInfo>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let client = connection.peer.ip();
    let mut context = Context::for_peer(client);
    context.current_context = "Receive Backup";

    if method != Method::POST {
        warn!("{context}Rejected {method} request");
        return IngestError::MethodNotAllowed(method.to_string()).into_response();
    }

    // Reject before reading the body.
    if let Err(error) = state.receiver.authorize(&mut context, client) {
        return error.into_response();
    }

    let receiver = Arc::clone(&state.receiver);
    let admission = tokio::task::spawn_blocking(move || {
        let result = receiver.admit(&mut context, Local::now().date_naive());
        (context, result)
    })
    .await;
    let mut context = match admission {
        Ok((context, Ok(()))) => context,
        Ok((_, Err(error))) => return error.into_response(),
        Err(error) => {
            error!("[{client}] [Receive Backup] Admission task failed: {error}");
            return IngestError::Interrupted(error.to_string()).into_response();
        }
    };
    context.current_context = "Receive Backup";

    let maximum = state.receiver.config.limits.maximum_payload_bytes;
    let body = match read_body(body, maximum).await {
        Ok(body) => body,
        Err(error) => {
            warn!("{context}{error}");
            return error.into_response();
        }
    };

    let submission = Submission {
        client,
        server: connection.local.map(|address| address.ip()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    };

    let receiver = Arc::clone(&state.receiver);
    let result =
        tokio::task::spawn_blocking(move || receiver.ingest(&mut context, &submission)).await;

    match result {
        Ok(Ok(accepted)) => {
            state.sweep.notify_one();
            (StatusCode::OK, Json(accepted.response())).into_response()
        }
        Ok(Err(error)) => error.into_response(),
        Err(error) => {
            error!("[{client}] [Receive Backup] Ingest task failed: {error}");
            IngestError::Interrupted(error.to_string()).into_response()
        }
    }
}

/// Read at most `maximum + 1` bytes of `body`. Anything past that is never buffered, the
/// validator rejects the truncated body as too large.
async fn read_body(mut body: Body, maximum: u64) -> Result<Vec<u8>, IngestError> {
    let cap = usize::try_from(maximum.saturating_add(1)).unwrap_or(usize::MAX);
    let mut buffer = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|error| IngestError::BodyUnreadable(error.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };

        let remaining = cap.saturating_sub(buffer.len());
        if data.len() >= remaining {
            buffer.extend(data.iter().take(remaining));
            break;
        }

        buffer.extend_from_slice(&data);
    }

    Ok(buffer)
}

async fn security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Could not listen for Ctrl-C: {error}");
        core::future::pending::<()>().await;
    }

    info!("Shutting down");
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind TCP listener:\n{0}")]
    Bind(#[source] io::Error),

    #[error("Server failed:\n{0}")]
    Serve(#[source] io::Error),
}
