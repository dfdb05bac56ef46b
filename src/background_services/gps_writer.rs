//! Owns the realtime GPS log. Submissions arrive over a channel so only this task
//! ever reads and rewrites the file.
use std::path::{Path, PathBuf};

use anyhow::{Context, Error, anyhow};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};

use crate::dal::{read_gps_log, write_gps_log};
use crate::model::gps::GpsPing;

/// How long submitted pings are kept
pub const RETENTION_DAYS: i64 = 7;
const CHANNEL_CAPACITY: usize = 32;

struct GpsSubmission {
    pings: Vec<GpsPing>,
    reply: oneshot::Sender<Result<usize, String>>,
}

/// Cloneable sender side of the GPS log writer.
#[derive(Clone, Debug)]
pub struct GpsLogHandle {
    sender: mpsc::Sender<GpsSubmission>,
}

impl GpsLogHandle {
    /// Queues the pings and waits until they are on disk.
    /// Returns the number of records kept in the log.
    pub async fn submit(&self, pings: Vec<GpsPing>) -> Result<usize, Error> {
        let (reply, response) = oneshot::channel();

        self.sender
            .send(GpsSubmission { pings, reply })
            .await
            .map_err(|_| anyhow!("GPS log writer is not running"))?;

        response
            .await
            .context("GPS log writer dropped the submission")?
            .map_err(|e| anyhow!(e))
    }
}

/// Starts the writer task for the log at `path`.
pub fn spawn_gps_writer(path: PathBuf) -> (GpsLogHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

    let task = tokio::spawn(write_submissions(path, receiver));

    (GpsLogHandle { sender }, task)
}

async fn write_submissions(path: PathBuf, mut receiver: mpsc::Receiver<GpsSubmission>) {
    let mut buffer: Vec<GpsSubmission> = vec![];

    // whatever queued up while the last batch was written goes to disk in one pass
    while receiver.recv_many(&mut buffer, CHANNEL_CAPACITY).await != 0 {
        let batch = buffer.drain(..).collect_vec();
        let (pings, replies): (Vec<Vec<GpsPing>>, Vec<_>) =
            batch.into_iter().map(|s| (s.pings, s.reply)).unzip();
        let pings = pings.into_iter().flatten().collect_vec();

        let batch_path = path.clone();
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);

        let result = tokio::task::spawn_blocking(move || append_and_prune(&batch_path, pings, cutoff))
            .instrument(info_span!("Writing GPS batch", submissions = replies.len()))
            .await
            .map_err(Error::from)
            .and_then(|r| r);

        let result = result.map_err(|e| {
            error!("{e:?}");
            format!("{e:#}")
        });

        for reply in replies {
            if reply.send(result.clone()).is_err() {
                info!("GPS submitter went away before the write finished");
            }
        }
    }

    info!("Channel closed");
}

/// Appends `pings` to the log and drops everything older than `cutoff`.
#[tracing::instrument(err, skip(pings), fields(pings = pings.len()))]
pub fn append_and_prune(
    path: &Path,
    pings: Vec<GpsPing>,
    cutoff: DateTime<Utc>,
) -> Result<usize, Error> {
    let mut log = read_gps_log(path)?;
    log.extend(pings);
    log.retain(|p| p.timestamp >= cutoff);

    write_gps_log(path, &log)?;

    info!("GPS log holds {} records", log.len());

    Ok(log.len())
}
