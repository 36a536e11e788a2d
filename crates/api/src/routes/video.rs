//! MJPEG live stream

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{ApiError, AppState};

/// Multipart boundary between frames
pub const BOUNDARY: &str = "frame";

const STREAM_BUFFER: usize = 64 * 1024;

/// Stream the running session's frames as `multipart/x-mixed-replace`
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if !state.worker.is_running() {
        return Err(ApiError::NoStream);
    }

    let frames = state.worker.subscribe_frames();
    let (writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    tokio::spawn(pump_frames(state, frames, writer));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

/// Write each new frame once until the session ends or the client leaves
async fn pump_frames<W>(
    state: Arc<AppState>,
    mut frames: watch::Receiver<Option<Bytes>>,
    mut out: W,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = frames.borrow_and_update().clone();
        match frame {
            Some(jpeg) => {
                if let Err(e) = write_part(&mut out, &jpeg).await {
                    debug!("Video client disconnected: {}", e);
                    return;
                }
            }
            None if !state.worker.is_running() => break,
            None => {}
        }

        if frames.changed().await.is_err() {
            break;
        }
    }
    debug!("Video stream ended with the session");
}

async fn write_part<W>(out: &mut W, jpeg: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    out.write_all(head.as_bytes()).await?;
    out.write_all(jpeg).await?;
    out.write_all(b"\r\n").await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_part_layout() {
        let mut out = Vec::new();
        write_part(&mut out, &[0xFF, 0xD8, 0xFF, 0xD9]).await.unwrap();

        let head = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        assert!(out.starts_with(head));
        assert_eq!(&out[head.len()..], &[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']);
    }
}
