//! Listener bootstrap: binds ports and hands accepted connections,
//! datagrams and HTTP requests to the engine. The engine itself has no
//! knowledge of port binding.

use std::{
    net::SocketAddr,
    sync::Arc,
};

use axum::{
    Router,
    body::Bytes,
    extract::{
        ConnectInfo,
        RawQuery,
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::any,
};
use tokio::net::{
    TcpListener,
    UdpSocket,
};
use tokio_util::sync::CancellationToken;
use trackbee_engine::{
    Dispatcher,
    Protocol,
    reply,
};

const UDP_BUFFER_SIZE: usize = 4096;

/// Accept loop for a stream listener: one task per connection.
pub async fn serve_tcp(
    dispatcher: Arc<Dispatcher>,
    protocol: Arc<dyn Protocol>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(protocol = protocol.name(), port, "tcp listener up");

    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::warn!(port, %error, "accept failed");
                continue;
            }
        };

        tokio::spawn({
            let dispatcher = dispatcher.clone();
            let protocol = protocol.clone();
            let shutdown = shutdown.clone();
            async move {
                if let Err(error) = dispatcher
                    .run_stream(&*protocol, stream, remote, shutdown)
                    .await
                {
                    tracing::debug!(
                        protocol = protocol.name(),
                        %remote,
                        %error,
                        "connection ended with transport error"
                    );
                }
            }
        });
    }

    Ok(())
}

/// Receive loop for a datagram listener. Each datagram is one decoding
/// task's worth of work; replies go back to the sender, best effort.
pub async fn serve_udp(
    dispatcher: Arc<Dispatcher>,
    protocol: Arc<dyn Protocol>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let socket = Arc::new(UdpSocket::bind(("0.0.0.0", port)).await?);
    tracing::info!(protocol = protocol.name(), port, "udp listener up");

    let mut buffer = [0u8; UDP_BUFFER_SIZE];
    loop {
        let received = tokio::select! {
            () = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buffer) => received,
        };

        let (length, remote) = match received {
            Ok(received) => received,
            Err(error) => {
                tracing::warn!(port, %error, "udp receive failed");
                continue;
            }
        };

        // one task per datagram, so a slow resolver on one device can't
        // hold up the receive loop
        let datagram = buffer[..length].to_vec();
        tokio::spawn({
            let dispatcher = dispatcher.clone();
            let protocol = protocol.clone();
            let socket = socket.clone();
            async move {
                match dispatcher.dispatch_single_shot(&*protocol, &datagram, remote) {
                    Ok(Some(payload)) => {
                        reply::send_datagram(&socket, remote, &payload, protocol.name());
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(
                            protocol = protocol.name(),
                            %remote,
                            %error,
                            "framing error, datagram dropped"
                        );
                    }
                }
            }
        });
    }

    Ok(())
}

#[derive(Clone)]
struct HttpState {
    dispatcher: Arc<Dispatcher>,
    protocol: Arc<dyn Protocol>,
}

/// HTTP listener: the request body (or, for bodyless GETs, the query
/// string) is the frame; the reply payload, if any, is the response
/// body, delivered within the same request cycle.
pub async fn serve_http(
    dispatcher: Arc<Dispatcher>,
    protocol: Arc<dyn Protocol>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let state = HttpState {
        dispatcher,
        protocol,
    };
    let router = Router::new()
        .route("/", any(handle_request))
        .with_state(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(protocol = state.protocol.name(), port, "http listener up");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

async fn handle_request(
    State(state): State<HttpState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> impl IntoResponse {
    let input = if body.is_empty() {
        Bytes::from(query.unwrap_or_default())
    }
    else {
        body
    };

    match state
        .dispatcher
        .dispatch_single_shot(&*state.protocol, &input, remote)
    {
        Ok(Some(payload)) => (StatusCode::OK, payload).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(error) => {
            tracing::warn!(
                protocol = state.protocol.name(),
                %remote,
                %error,
                "bad request"
            );
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
