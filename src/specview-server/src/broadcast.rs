// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spectrum WebSocket endpoint and the frame sink that feeds it.
//!
//! Exposes `/spectrum` which upgrades to a WebSocket carrying binary
//! spectrum frames (see `specview_protocol::encode_frame` for the layout).
//! Every connected client receives the same frames via a tokio broadcast
//! channel.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use actix_web::dev::Server;
use actix_web::{get, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_ws::Message;
use bytes::Bytes;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, trace, warn};

use specview_dsp::{FrameInfo, FrameSink};
use specview_protocol::encode_frame;

/// Capacity of the frame broadcast channel. Slow clients that fall more
/// than this many frames behind skip ahead to the newest frame.
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Minimum interval between broadcast frames. Analysis cycles that complete
/// faster than this are dropped; the next cycle after the window elapses is
/// the one that goes out, so clients always see the freshest data.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// Frame sink that encodes completed spectra and publishes them on a
/// broadcast channel, rate-limited to at most one frame per
/// [`MIN_FRAME_INTERVAL`].
pub struct BroadcastSink {
    tx: broadcast::Sender<Bytes>,
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<Bytes>) -> Self {
        Self::with_interval(tx, MIN_FRAME_INTERVAL)
    }

    pub fn with_interval(tx: broadcast::Sender<Bytes>, min_interval: Duration) -> Self {
        Self {
            tx,
            min_interval,
            last_sent: None,
        }
    }
}

impl FrameSink for BroadcastSink {
    fn new_frame(&mut self, info: &FrameInfo, spectrum: &[f32]) {
        let now = Instant::now();
        if let Some(last) = self.last_sent {
            if now.duration_since(last) < self.min_interval {
                trace!("spectrum frame dropped by rate limiter");
                return;
            }
        }
        self.last_sent = Some(now);

        // Best effort: send fails only when no receiver is subscribed.
        let _ = self.tx.send(encode_frame(info, spectrum));
    }
}

#[get("/spectrum")]
async fn spectrum_ws(
    req: HttpRequest,
    body: web::Payload,
    frames: web::Data<broadcast::Sender<Bytes>>,
) -> Result<HttpResponse, Error> {
    // Plain GET probe (no WebSocket upgrade) signals the stream is available.
    if !req.headers().contains_key("upgrade") {
        return Ok(HttpResponse::NoContent().finish());
    }

    let mut frame_rx = frames.subscribe();
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    actix_web::rt::spawn(async move {
        // Forward spectrum frames to the client.
        let mut fwd_session = session.clone();
        let fwd_handle = actix_web::rt::spawn(async move {
            loop {
                match frame_rx.recv().await {
                    Ok(frame) => {
                        if fwd_session.binary(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Spectrum WS: dropped {} frames", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        // Drain client messages; only control frames matter.
        while let Some(Ok(msg)) = msg_stream.recv().await {
            match msg {
                Message::Ping(data) => {
                    if session.pong(&data).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        fwd_handle.abort();
        let _ = session.close(None).await;
    });

    Ok(response)
}

/// Run the spectrum HTTP server until ctrl-c.
pub async fn serve(
    addr: SocketAddr,
    frames: broadcast::Sender<Bytes>,
) -> Result<(), actix_web::Error> {
    let server = build_server(addr, frames)?;
    let handle = server.handle();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        handle.stop(false).await;
    });
    info!("spectrum server listening on ws://{}/spectrum", addr);
    server.await?;
    Ok(())
}

fn build_server(addr: SocketAddr, frames: broadcast::Sender<Bytes>) -> Result<Server, Error> {
    let frames_data = web::Data::new(frames);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(frames_data.clone())
            .service(spectrum_ws)
    })
    .shutdown_timeout(1)
    .disable_signals()
    .bind(addr)?
    .run();
    Ok(server)
}
