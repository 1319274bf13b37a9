//! Side channel for streaming pre-encoded frames straight to the device.
//!
//! Wire format, repeated: a big-endian `u16` length followed by that many raw
//! bytes, forwarded unmodified. A zero length means end-of-stream: local
//! rendering resumes, but the peer keeps the session and may stream again.
//! Closing the connection ends the session. Only one peer may hold it.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::control::accept_backoff;
use crate::transport::{BypassSession, SharedBypass};

/// Accept bypass peers until the listener fails.
pub async fn serve(listener: TcpListener, bypass: SharedBypass) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, "Bypass listener ready");
    let mut failures = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => {
                failures = 0;
                accepted
            }
            Err(e) => {
                failures += 1;
                let delay = accept_backoff(failures);
                warn!(error = %e, failures, ?delay, "Accept failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let Some(session) = BypassSession::begin(&bypass) else {
            warn!(%peer, "Bypass already in use, refusing peer");
            continue;
        };
        tokio::task::spawn_local(
            async move {
                info!("Bypass peer connected");
                match stream_frames(stream, &session).await {
                    Ok(frames) => info!(frames, "Bypass peer disconnected"),
                    Err(e) => warn!(error = %e, "Bypass stream failed"),
                }
            }
            .instrument(info_span!("bypass", %peer)),
        );
    }
}

/// Forward frames from `reader` into `session` until the peer disconnects.
/// Returns the number of frames forwarded.
pub async fn stream_frames<R>(mut reader: R, session: &BypassSession) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut forwarded = 0;
    loop {
        let len = match reader.read_u16().await {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(forwarded),
            Err(e) => return Err(e),
        };
        if len == 0 {
            debug!("End of stream");
            session.pause();
            continue;
        }

        let mut frame = vec![0; usize::from(len)];
        reader.read_exact(&mut frame).await?;
        session.forward(frame);
        forwarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::task::LocalSet;

    use super::*;
    use crate::transport::Bypass;

    fn message(bytes: &[u8]) -> Vec<u8> {
        let mut out = (bytes.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(bytes);
        out
    }

    #[tokio::test]
    async fn frames_and_end_of_stream() {
        let bypass = Bypass::shared(8);
        let session = BypassSession::begin(&bypass).unwrap();

        let mut input = message(&[1, 2, 3]);
        input.extend(message(&[4, 255]));
        let forwarded = stream_frames(input.as_slice(), &session).await.unwrap();
        assert_eq!(forwarded, 2);
        assert!(bypass.borrow().is_active());
        assert_eq!(bypass.borrow_mut().next_frame(), Some(vec![1, 2, 3]));
        assert_eq!(bypass.borrow_mut().next_frame(), Some(vec![4, 255]));

        let forwarded = stream_frames(&[0u8, 0][..], &session).await.unwrap();
        assert_eq!(forwarded, 0);
        assert!(!bypass.borrow().is_active());
        assert!(bypass.borrow().is_claimed());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let bypass = Bypass::shared(8);
        let session = BypassSession::begin(&bypass).unwrap();
        let input = [0u8, 5, 1, 2];
        assert!(stream_frames(&input[..], &session).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_releases_the_session() {
        LocalSet::new()
            .run_until(async {
                let bypass = Bypass::shared(8);
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                tokio::task::spawn_local(serve(listener, bypass.clone()));

                let mut peer = TcpStream::connect(addr).await.unwrap();
                peer.write_all(&message(&[7; 226])).await.unwrap();
                peer.flush().await.unwrap();
                for _ in 0..100 {
                    if bypass.borrow().is_active() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                assert!(bypass.borrow().is_active());

                drop(peer);
                for _ in 0..100 {
                    if !bypass.borrow().is_claimed() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                assert!(!bypass.borrow().is_active());
                assert!(!bypass.borrow().is_claimed());
            })
            .await;
    }
}
