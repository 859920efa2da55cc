//! Drains one recipient queue to one socket writer with buffered or
//! vectored I/O and a maximum flush-latency timer.

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

/// How pending bytes are accumulated between flushes.
enum Mode {
    /// No buffering; every write goes straight to the socket.
    Direct,
    /// Copy into a growable byte buffer, flushed at `threshold`.
    Buffered { pending: Vec<u8>, threshold: usize },
    /// Hold references to the original chunks and flush with a single
    /// vectored write once their total size reaches `threshold`.
    Vectored { pending: Vec<Bytes>, pending_len: usize, threshold: usize },
}

impl Mode {
    fn new(buffer_size: usize, vectored: bool) -> Self {
        if buffer_size == 0 {
            Mode::Direct
        } else if vectored {
            Mode::Vectored {
                pending: Vec::new(),
                pending_len: 0,
                threshold: buffer_size,
            }
        } else {
            Mode::Buffered {
                pending: Vec::with_capacity(buffer_size),
                threshold: buffer_size,
            }
        }
    }
}

/// Drains `queue` to `writer` until the queue closes, `done` fires, or a
/// write fails. Returns once draining is terminal; the caller owns the
/// socket and may tear it down afterward.
pub async fn forward<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Bytes>,
    mut done: broadcast::Receiver<()>,
    buffer_size: usize,
    vectored: bool,
    flush_interval: Duration,
) where
    W: AsyncWriteExt + Unpin,
{
    let mut mode = Mode::new(buffer_size, vectored);
    let mut ticker = if flush_interval.is_zero() {
        None
    } else {
        let mut t = tokio::time::interval(flush_interval);
        t.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(t)
    };

    loop {
        let tick = async {
            match &mut ticker {
                Some(t) => {
                    t.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = done.recv() => {
                let _ = flush(&mut writer, &mut mode).await;
                return;
            }
            msg = queue.recv() => {
                match msg {
                    Some(line) => {
                        if write_one(&mut writer, &mut mode, line).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        let _ = flush(&mut writer, &mut mode).await;
                        return;
                    }
                }
            }
            _ = tick => {
                if flush(&mut writer, &mut mode).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write_one<W>(writer: &mut W, mode: &mut Mode, line: Bytes) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let should_flush = match mode {
        Mode::Direct => {
            writer.write_all(&line).await?;
            false
        }
        Mode::Buffered { pending, threshold } => {
            pending.extend_from_slice(&line);
            pending.len() >= *threshold
        }
        Mode::Vectored {
            pending,
            pending_len,
            threshold,
        } => {
            *pending_len += line.len();
            pending.push(line);
            *pending_len >= *threshold
        }
    };
    if should_flush {
        flush(writer, mode).await?;
    }
    Ok(())
}

async fn flush<W>(writer: &mut W, mode: &mut Mode) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    match mode {
        Mode::Direct => Ok(()),
        Mode::Buffered { pending, .. } => {
            if pending.is_empty() {
                return Ok(());
            }
            let chunk = std::mem::take(pending);
            writer.write_all(&chunk).await?;
            writer.flush().await
        }
        Mode::Vectored {
            pending,
            pending_len,
            ..
        } => {
            if pending.is_empty() {
                return Ok(());
            }
            let chunks = std::mem::take(pending);
            *pending_len = 0;
            write_vectored_all(writer, &chunks).await?;
            writer.flush().await
        }
    }
}

/// Write every chunk in `chunks` to completion, advancing across partial
/// vectored writes by rebuilding the `IoSlice` list from a cursor into
/// the remaining bytes of each chunk.
async fn write_vectored_all<W>(writer: &mut W, chunks: &[Bytes]) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let mut chunk_idx = 0usize;
    let mut offset = 0usize;

    while chunk_idx < chunks.len() {
        let slices: Vec<IoSlice> = chunks[chunk_idx..]
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    IoSlice::new(&c[offset..])
                } else {
                    IoSlice::new(&c[..])
                }
            })
            .collect();

        let mut written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }

        while written > 0 {
            let remaining_in_chunk = chunks[chunk_idx].len() - offset;
            if written < remaining_in_chunk {
                offset += written;
                written = 0;
            } else {
                written -= remaining_in_chunk;
                offset = 0;
                chunk_idx += 1;
                if chunk_idx >= chunks.len() {
                    break;
                }
            }
        }
    }
    Ok(())
}
