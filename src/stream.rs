//! # Token stream multiplexer
//!
//! Wraps a synthesis outcome into the outward newline-delimited event stream:
//!
//! 1. exactly one meta record — guardrail hits, action tag, provenance
//! 2. zero or more `{"token": ...}` records, in arrival order
//! 3. the literal `[DONE]` line, exactly once, always last
//!
//! Fragments are forwarded as they arrive; the full model output is never
//! buffered. An upstream fault mid-stream becomes one placeholder token and
//! an immediate sentinel. A send failure means the client went away, and the
//! remaining work is abandoned silently.
use std::convert::Infallible;

use axum::body::Body;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::synth::{Outcome, TokenSource, UNAVAILABLE_PLACEHOLDER, strip_self_identification};

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize, Debug, Clone)]
pub struct Provenance {
    pub model: String,
    pub hybrid: bool,
}

pub fn to_event_stream(outcome: Outcome, provenance: Provenance) -> Body {
    let (tx, rx) = mpsc::channel::<Result<String, Infallible>>(16);

    tokio::spawn(pump(outcome, provenance, tx));

    Body::from_stream(ReceiverStream::new(rx))
}

async fn send_line(tx: &mpsc::Sender<Result<String, Infallible>>, line: String) -> Result<(), ()> {
    tx.send(Ok(format!("{line}\n"))).await.map_err(|_| ())
}

async fn send_token(tx: &mpsc::Sender<Result<String, Infallible>>, token: &str) -> Result<(), ()> {
    send_line(tx, json!({ "token": token }).to_string()).await
}

pub(crate) async fn pump(
    outcome: Outcome,
    provenance: Provenance,
    tx: mpsc::Sender<Result<String, Infallible>>,
) {
    let (action, hits) = match &outcome {
        Outcome::Restricted { hits, .. } => ("restrict", hits.clone()),
        Outcome::Allowed { .. } => ("allow", Vec::new()),
    };

    let meta = json!({
        "meta": { "guardrails": hits, "action": action, "provenance": provenance }
    });
    if send_line(&tx, meta.to_string()).await.is_err() {
        return;
    }

    match outcome {
        Outcome::Restricted { message, .. } => {
            if send_token(&tx, &message).await.is_err() {
                return;
            }
        }
        Outcome::Allowed { source } => match source {
            TokenSource::Live(mut fragments) => {
                let mut faulted = false;
                // Self-identifying phrases can straddle fragment boundaries
                // ("I am" + " an AI"), so fragments accumulate here and only
                // the part that can no longer be a phrase prefix is emitted.
                let mut pending = String::new();

                while let Some(next) = fragments.next().await {
                    match next {
                        Ok(fragment) => {
                            pending.push_str(&fragment);
                            pending = strip_self_identification(&pending);

                            if let Some(ready) = drain_ready(&mut pending) {
                                if send_token(&tx, &ready).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Upstream stream faulted mid-response: {e}");
                            faulted = true;
                            break;
                        }
                    }
                }

                let tail = strip_self_identification(&pending);
                if !tail.is_empty() && send_token(&tx, &tail).await.is_err() {
                    return;
                }

                if faulted && send_token(&tx, UNAVAILABLE_PLACEHOLDER).await.is_err() {
                    return;
                }
            }
            TokenSource::Chunked {
                text,
                chunk_size,
                delay,
            } => {
                for piece in chunk_text(&text, chunk_size) {
                    if send_token(&tx, piece).await.is_err() {
                        return;
                    }
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        },
    }

    let _ = send_line(&tx, DONE_SENTINEL.to_string()).await;
}

// Longer than any single self-identifying phrase the stripper recognizes, so
// an incomplete phrase always sits entirely inside the held-back tail.
const PHRASE_HOLDBACK: usize = 64;

/// Takes everything except the last `PHRASE_HOLDBACK` bytes out of `pending`,
/// on a char boundary. `None` while the buffer is still short.
fn drain_ready(pending: &mut String) -> Option<String> {
    if pending.len() <= PHRASE_HOLDBACK {
        return None;
    }

    let mut cut = pending.len() - PHRASE_HOLDBACK;
    while !pending.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        return None;
    }

    let ready: String = pending.drain(..cut).collect();
    Some(ready)
}

/// Splits on char boundaries at roughly `size` bytes; concatenation of the
/// pieces is always exactly the input.
fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end += 1;
        }
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }

    pieces
}
