//! Newline-delimited JSON control socket.
//!
//! Every line is one request and gets one reply line:
//!
//! ```text
//! > {"ball": "red"}
//! < {"status":"ok"}
//! > {"ball": "red", "stop": true}
//! < {"status":"error","message":"request has more than one recognized field: stop, ball"}
//! > {"catalog": true}
//! < {"status":"ok","active":"ball","catalog":{"fire":8,...},"default":"fire"}
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::scheduler::SchedulerCommand;

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Accept control connections until the listener fails.
pub async fn serve(
    listener: TcpListener,
    commands: mpsc::Sender<SchedulerCommand>,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, "Control listener ready");
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
                error!(error = %e, failures, ?delay, "Accept failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let commands = commands.clone();
        tokio::task::spawn_local(
            async move {
                debug!("Connected");
                if let Err(e) = handle_connection(stream, commands).await {
                    warn!(error = %e, "Control connection failed");
                }
                debug!("Disconnected");
            }
            .instrument(info_span!("control", %peer)),
        );
    }
}

/// Pause before retrying after `failures` consecutive accept errors, so a
/// persistent error such as running out of file descriptors does not spin.
pub(crate) fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(6);
    (ACCEPT_BACKOFF_BASE * 2u32.pow(exponent)).min(ACCEPT_BACKOFF_MAX)
}

async fn handle_connection(
    stream: TcpStream,
    commands: mpsc::Sender<SchedulerCommand>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let mut reply = respond(&line, &commands).await.to_string();
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

/// Handle one request line and build the reply.
pub async fn respond(line: &str, commands: &mpsc::Sender<SchedulerCommand>) -> Value {
    let payload: Value = match serde_json::from_str(line) {
        Ok(payload) => payload,
        Err(e) => return failure(format!("invalid JSON: {e}")),
    };

    if is_catalog_query(&payload) {
        let (reply, response) = oneshot::channel();
        if commands.send(SchedulerCommand::Describe { reply }).await.is_err() {
            return failure("scheduler unavailable");
        }
        return match response.await {
            Ok(status) => json!({
                "status": "ok",
                "active": status.active,
                "catalog": status.catalog,
                "default": status.default,
            }),
            Err(_) => failure("scheduler unavailable"),
        };
    }

    let (reply, response) = oneshot::channel();
    if commands
        .send(SchedulerCommand::Change { payload, reply })
        .await
        .is_err()
    {
        return failure("scheduler unavailable");
    }
    match response.await {
        Ok(Ok(())) => json!({"status": "ok"}),
        Ok(Err(e)) => failure(e.to_string()),
        Err(_) => failure("scheduler unavailable"),
    }
}

fn is_catalog_query(payload: &Value) -> bool {
    payload
        .as_object()
        .filter(|object| object.len() == 1)
        .and_then(|object| object.get("catalog"))
        .is_some_and(|value| !matches!(value, Value::Null | Value::Bool(false)))
}

fn failure(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::task::LocalSet;

    use super::*;
    use crate::catalog::Catalog;
    use crate::power::testing::RecordingPower;
    use crate::scheduler::{ModeContext, ModeScheduler};
    use crate::surface::RasterSurface;

    fn scheduler() -> ModeScheduler {
        let entries = [("fire".to_string(), 8)].into();
        let ctx = ModeContext::new(
            RasterSurface::shared(15, 15),
            Catalog::new(entries, "fire".to_string()),
            std::env::temp_dir(),
            "gif",
            Rc::new(RecordingPower::default()),
        );
        ModeScheduler::with_rng(ctx, StdRng::seed_from_u64(1))
    }

    #[test]
    fn catalog_query_detection() {
        assert!(is_catalog_query(&json!({"catalog": true})));
        assert!(!is_catalog_query(&json!({"catalog": false})));
        assert!(!is_catalog_query(&json!({"catalog": true, "ball": "red"})));
        assert!(!is_catalog_query(&json!(["catalog"])));
    }

    #[tokio::test]
    async fn replies_for_each_kind_of_line() {
        LocalSet::new()
            .run_until(async {
                let (tx, rx) = mpsc::channel(8);
                tokio::task::spawn_local(scheduler().run(rx));

                assert_eq!(respond(r#"{"ball": "red"}"#, &tx).await, json!({"status": "ok"}));
                assert_eq!(
                    respond(r#"{"ball": "red", "plasma": true}"#, &tx).await["status"],
                    "error"
                );
                assert_eq!(respond("{not json", &tx).await["status"], "error");

                let catalog = respond(r#"{"catalog": true}"#, &tx).await;
                assert_eq!(catalog["active"], "ball");
                assert_eq!(catalog["catalog"]["fire"], 8);
                assert_eq!(catalog["default"], "fire");
            })
            .await;
    }

    #[test]
    fn accept_errors_back_off_up_to_a_cap() {
        let delays: Vec<u64> = (1..=9)
            .map(|failures| accept_backoff(failures).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![50, 100, 200, 400, 800, 1600, 2000, 2000, 2000]);
        assert!(accept_backoff(u32::MAX) <= ACCEPT_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn closed_scheduler_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let reply = respond(r#"{"stop": true}"#, &tx).await;
        assert_eq!(reply["message"], "scheduler unavailable");
    }

    #[tokio::test]
    async fn serves_json_lines_over_tcp() {
        LocalSet::new()
            .run_until(async {
                let (tx, rx) = mpsc::channel(8);
                tokio::task::spawn_local(scheduler().run(rx));

                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                tokio::task::spawn_local(serve(listener, tx));

                let stream = TcpStream::connect(addr).await.unwrap();
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();

                writer.write_all(b"{\"plasma\": true}\n\n{}\n").await.unwrap();
                let first: Value =
                    serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
                let second: Value =
                    serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
                assert_eq!(first, json!({"status": "ok"}));
                assert_eq!(
                    second,
                    json!({"status": "error", "message": "request has no recognized field"})
                );
            })
            .await;
    }
}
