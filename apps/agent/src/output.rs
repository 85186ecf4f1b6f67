use std::str::FromStr;

use mediator::{DispatchError, Inbox};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::events::{AgentDispatcher, Event, EventName};
use crate::monitoring::ProbeResult;

const RESULTS_BUFFER: usize = 1024;

/// How completed probe results are reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFormat {
    /// Structured log lines only
    #[default]
    Log,
    /// One JSON document per result on the writer
    Json,
}

impl FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(ResultFormat::Log),
            "json" => Ok(ResultFormat::Json),
            other => Err(format!("unknown result format '{other}', expected log or json")),
        }
    }
}

/// Bind a consumer of `probe.completed` that reports every result.
///
/// The task stops when `cancel` fires, after writing what was already delivered.
pub fn register_result_listener<W>(
    dispatcher: &AgentDispatcher,
    format: ResultFormat,
    mut writer: W,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, DispatchError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbox, mut results) = Inbox::<EventName, Event>::new(RESULTS_BUFFER);
    dispatcher.register(inbox, &[EventName::ProbeCompleted])?;

    Ok(tokio::spawn(async move {
        loop {
            let delivery = tokio::select! {
                biased;
                delivery = results.recv() => delivery,
                _ = cancel.cancelled() => results.try_recv().ok(),
            };
            let Some(delivery) = delivery else { break };

            match delivery.payload {
                Event::ProbeCompleted(result) => {
                    if let Err(e) = report(format, &mut writer, &result).await {
                        error!(error = %e, "failed to write probe result");
                    }
                }
                Event::SettingsSaved(item) => {
                    warn!(event = %delivery.name, setting = %item.name, "unexpected settings payload")
                }
            }
        }

        if let Err(e) = writer.flush().await {
            error!(error = %e, "failed to flush probe results");
        }
        debug!("result listener stopped");
    }))
}

async fn report<W>(format: ResultFormat, writer: &mut W, result: &ProbeResult) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match format {
        ResultFormat::Log => {
            debug!(
                id = %result.id(),
                group = result.group(),
                item = result.item(),
                status = %result.status(),
                "probe result received"
            );
            Ok(())
        }
        ResultFormat::Json => {
            let mut line = serde_json::to_vec(result)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await
        }
    }
}
