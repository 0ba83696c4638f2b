// src/relay/stdio.rs

//! JSON-lines transport: one inbound frame per input line, one outbound
//! frame per output line.
//!
//! Input lines are either a submission (`{"code": "...", "correlationId":
//! "..."}`) or a close request (`{"close": "restarting" | "page-left"}`).
//! End of input closes the connection as "page left".

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::relay::wire::encode;
use crate::relay::{ClientMessage, CloseReason, InboundFrame, OutboundFrame, Relay};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputLine {
    Close { close: String },
    Frame(InboundFrame),
}

fn parse_close(value: &str) -> CloseReason {
    match value.trim().to_lowercase().as_str() {
        "restarting" | "restart" => CloseReason::Restarting,
        "page-left" | "page_left" | "pageleft" => CloseReason::PageLeft,
        _ => CloseReason::Other(None),
    }
}

/// Drive `relay` over a line-oriented reader/writer pair until close.
pub async fn serve_lines<R, W>(relay: Relay, reader: R, writer: W) -> Result<CloseReason>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (in_tx, in_rx) = mpsc::channel::<ClientMessage>(16);
    let (out_tx, out_rx) = mpsc::channel::<OutboundFrame>(64);

    let read_task = tokio::spawn(read_input(reader, in_tx, out_tx.clone()));
    let write_task = tokio::spawn(write_output(writer, out_rx));

    let reason = relay.serve(in_rx, out_tx).await;

    read_task.abort();
    let _ = read_task.await;
    // Every sender is gone now, so the writer flushes and exits.
    write_task.await.map_err(anyhow::Error::from)??;

    Ok(reason)
}

/// Convenience wrapper over the process's own stdin/stdout.
pub async fn serve_stdio(relay: Relay) -> Result<CloseReason> {
    serve_lines(relay, tokio::io::stdin(), tokio::io::stdout()).await
}

async fn read_input<R>(
    reader: R,
    in_tx: mpsc::Sender<ClientMessage>,
    out_tx: mpsc::Sender<OutboundFrame>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("input closed");
                let _ = in_tx.send(ClientMessage::Close(CloseReason::PageLeft)).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed reading input");
                let _ = in_tx.send(ClientMessage::Close(CloseReason::Other(None))).await;
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<InputLine>(&line) {
            Ok(InputLine::Close { close }) => ClientMessage::Close(parse_close(&close)),
            Ok(InputLine::Frame(frame)) => ClientMessage::Frame(frame),
            Err(e) => {
                let _ = out_tx
                    .send(OutboundFrame::Rejected {
                        message: format!("invalid frame: {e}"),
                    })
                    .await;
                continue;
            }
        };

        let closing = matches!(message, ClientMessage::Close(_));
        if in_tx.send(message).await.is_err() || closing {
            return;
        }
    }
}

async fn write_output<W>(mut writer: W, mut out_rx: mpsc::Receiver<OutboundFrame>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = out_rx.recv().await {
        let mut text = encode(&frame)?;
        text.push('\n');
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
