//! Per-turn response demultiplexing.
//!
//! The subprocess emits an unstructured byte stream; the only delimiter is
//! the [`TURN_MARKER`](crate::TURN_MARKER) it prints when idle. Each turn is
//! driven by a small state machine reacting to three events: a chunk
//! arrived, the raw channel closed, or the idle timer fired. The turn's
//! output is split into two views sharing one completion signal: a live
//! [`TokenStream`] of chunks and a deferred [`Completion`] with the full
//! text.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::debug;

use crate::error::LlamaError;
use crate::TURN_MARKER;

/// Raw output channel fed by the session's reader task. Wrapped in a mutex
/// so only one turn can consume it at a time.
pub(crate) type RawOutput = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// One prompt/response cycle in flight.
pub struct Turn {
    stream: TokenStream,
    completion: Completion,
}

/// Live, single-pass sequence of response chunks. Ends after the turn
/// finishes; a pipe failure surfaces as a final `Err` item.
pub struct TokenStream {
    rx: mpsc::UnboundedReceiver<Result<String, LlamaError>>,
}

/// Deferred full response text, delimiter already stripped.
pub struct Completion {
    rx: oneshot::Receiver<Result<String, LlamaError>>,
}

impl Turn {
    /// Split into the live chunk stream and the deferred full text. Both
    /// can be consumed; neither blocks the other.
    pub fn into_parts(self) -> (TokenStream, Completion) {
        (self.stream, self.completion)
    }

    /// Wait for the full response text, ignoring the live stream.
    pub async fn text(self) -> Result<String, LlamaError> {
        self.completion.await
    }
}

impl Stream for TokenStream {
    type Item = Result<String, LlamaError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Future for Completion {
    type Output = Result<String, LlamaError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Driver dropped without finalizing (e.g. runtime teardown).
            Poll::Ready(Err(_)) => Poll::Ready(Err(LlamaError::StreamError(
                "turn abandoned before completion".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start a turn over the raw output channel.
pub(crate) fn spawn_turn(raw: RawOutput, idle_timeout: Duration) -> Turn {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(drive(raw, idle_timeout, chunk_tx, done_tx));
    Turn {
        stream: TokenStream { rx: chunk_rx },
        completion: Completion { rx: done_rx },
    }
}

/// Input events for the turn state machine.
enum Event {
    Chunk(String),
    PipeClosed,
    IdleTimerFired,
}

/// Consume raw output until the turn finalizes, exactly once.
async fn drive(
    raw: RawOutput,
    idle_timeout: Duration,
    chunks: mpsc::UnboundedSender<Result<String, LlamaError>>,
    done: oneshot::Sender<Result<String, LlamaError>>,
) {
    // Holding the lock for the whole turn enforces one pending response
    // per process handle.
    let mut rx = raw.lock().await;
    let mut text = String::new();

    let outcome = loop {
        let event = match timeout(idle_timeout, rx.recv()).await {
            Ok(Some(chunk)) => Event::Chunk(chunk),
            Ok(None) => Event::PipeClosed,
            Err(_) => Event::IdleTimerFired,
        };

        match event {
            Event::Chunk(chunk) => {
                // The whole chunk counts toward the accumulated text; only
                // a single trailing delimiter is stripped at finalization.
                text.push_str(&chunk);
                match chunk.find(TURN_MARKER) {
                    None => {
                        let _ = chunks.send(Ok(chunk));
                    }
                    Some(pos) => {
                        // Marker seen: the live stream carries what
                        // precedes it, then the turn finishes.
                        if pos > 0 {
                            let _ = chunks.send(Ok(chunk[..pos].to_string()));
                        }
                        break Ok(());
                    }
                }
            }
            Event::PipeClosed => break Err("output pipe closed mid-turn"),
            Event::IdleTimerFired => {
                debug!(
                    "No output for {:?}, treating turn as complete",
                    idle_timeout
                );
                break Ok(());
            }
        }
    };

    match outcome {
        Ok(()) => {
            // Callers never see a raw trailing delimiter.
            if text.ends_with(TURN_MARKER) {
                text.pop();
            }
            let _ = done.send(Ok(text));
        }
        Err(reason) => {
            let _ = chunks.send(Err(LlamaError::StreamError(reason.to_string())));
            let _ = done.send(Err(LlamaError::StreamError(reason.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::time::Instant;

    fn raw_channel() -> (mpsc::UnboundedSender<String>, RawOutput) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Arc::new(Mutex::new(rx)))
    }

    async fn collect_ok(mut stream: TokenStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_marker_finishes_turn() {
        let (tx, raw) = raw_channel();
        let turn = spawn_turn(raw, Duration::from_secs(5));

        tx.send("hel".to_string()).unwrap();
        tx.send("lo".to_string()).unwrap();
        tx.send(">".to_string()).unwrap();

        let (stream, completion) = turn.into_parts();
        assert_eq!(collect_ok(stream).await, vec!["hel", "lo"]);
        assert_eq!(completion.await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_trailing_marker_stripped_from_text() {
        let (tx, raw) = raw_channel();
        let turn = spawn_turn(raw, Duration::from_secs(5));

        tx.send("answer>".to_string()).unwrap();

        let (stream, completion) = turn.into_parts();
        assert_eq!(collect_ok(stream).await, vec!["answer"]);
        assert_eq!(completion.await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_interior_marker_keeps_text_after_it() {
        let (tx, raw) = raw_channel();
        let turn = spawn_turn(raw, Duration::from_secs(5));

        tx.send("a>b".to_string()).unwrap();

        let (stream, completion) = turn.into_parts();
        assert_eq!(collect_ok(stream).await, vec!["a"]);
        // Only a single trailing delimiter is ever stripped; an interior
        // marker still ends the turn but loses no accumulated text.
        assert_eq!(completion.await.unwrap(), "a>b");
    }

    #[tokio::test]
    async fn test_idle_timer_completes_turn() {
        let (tx, raw) = raw_channel();
        let idle = Duration::from_millis(200);
        let turn = spawn_turn(raw, idle);

        tx.send("partial".to_string()).unwrap();
        // No marker ever arrives.

        let start = Instant::now();
        assert_eq!(turn.text().await.unwrap(), "partial");
        assert!(start.elapsed() >= idle);
    }

    #[tokio::test]
    async fn test_closed_pipe_errors_both_views() {
        let (tx, raw) = raw_channel();
        let turn = spawn_turn(raw, Duration::from_secs(5));

        tx.send("half".to_string()).unwrap();
        drop(tx);

        let (mut stream, completion) = turn.into_parts();
        assert_eq!(stream.next().await.unwrap().unwrap(), "half");
        assert!(matches!(
            stream.next().await,
            Some(Err(LlamaError::StreamError(_)))
        ));
        assert!(stream.next().await.is_none());
        assert!(matches!(completion.await, Err(LlamaError::StreamError(_))));
    }

    #[tokio::test]
    async fn test_completion_after_last_chunk() {
        let (tx, raw) = raw_channel();
        let turn = spawn_turn(raw, Duration::from_secs(5));

        for chunk in ["a", "b", "c", ">"] {
            tx.send(chunk.to_string()).unwrap();
        }

        let (stream, completion) = turn.into_parts();
        let text = completion.await.unwrap();
        // Every chunk is already queued once the completion resolves.
        assert_eq!(collect_ok(stream).await.concat(), text);
    }
}
