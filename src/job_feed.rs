//! Upstream events as JSON lines.
//!
//! Each non-empty line that does not start with `#` holds one event:
//!
//! ```text
//! {"nonce1": "f000000f"}
//! {"job": {"job_id": "1a", "version": 4, "prev_hash": "<64 hex>", "merkle_root": "<64 hex>",
//!          "reserved": "<64 hex>", "time": 1700000000, "bits": 520617983,
//!          "target": "<64 hex>", "clean_jobs": true}}
//! ```
//!
//! Both events are dispatched to every miner, which queues a fresh context
//! once it knows a job and nonce1.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing::warn;

use crate::coordinator::GpuMiner;
use crate::models::job::Job;
use crate::models::nonce::Nonce1;
use crate::models::share::OnShare;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamEvent {
    Nonce1(Nonce1),
    Job(Job),
}

#[derive(Debug, thiserror::Error)]
pub enum JobFeedError {
    #[error("could not read job feed")]
    Io(#[from] std::io::Error),
}

/// Receiver of upstream events.
pub trait JobListener: Send + Sync {
    fn set_nonce1(&self, nonce1: Nonce1);

    /// registers `job` and makes it the job being mined
    fn new_job(&self, job: Job, on_share: OnShare);
}

impl JobListener for GpuMiner {
    fn set_nonce1(&self, nonce1: Nonce1) {
        GpuMiner::set_nonce1(self, nonce1);
    }

    fn new_job(&self, job: Job, on_share: OnShare) {
        self.register_new_job(job, on_share);
    }
}

/// Reads events from `input` until end of stream and dispatches each one to
/// all `listeners`. Malformed lines are logged and skipped.
///
/// Returns the number of dispatched events.
pub async fn run_job_feed<R, L>(
    input: R,
    listeners: &[Arc<L>],
    on_share: OnShare,
) -> Result<usize, JobFeedError>
where
    R: AsyncBufRead + Unpin,
    L: JobListener + ?Sized,
{
    let mut lines = input.lines();
    let mut line_number = 0usize;
    let mut dispatched = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = match serde_json::from_str::<UpstreamEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("job feed line {}: ignoring malformed event: {}", line_number, e);
                continue;
            }
        };

        match event {
            UpstreamEvent::Nonce1(nonce1) => {
                info!("upstream: nonce1 {}", nonce1);
                for listener in listeners {
                    listener.set_nonce1(nonce1.clone());
                }
            }
            UpstreamEvent::Job(job) => {
                info!("upstream: job {}", job.job_id);
                for listener in listeners {
                    listener.new_job(job.clone(), on_share.clone());
                }
            }
        }
        dispatched += 1;
    }

    Ok(dispatched)
}

#[cfg(test)]
mod job_feed_tests {
    use std::sync::Mutex;

    use assert2::let_assert;
    use tokio_test::io::Builder;

    use super::*;
    use crate::models::share::Share;
    use crate::tests::shared::job_with_target;

    #[derive(Debug, Default)]
    struct RecordingListener {
        events: Mutex<Vec<UpstreamEvent>>,
    }

    impl JobListener for RecordingListener {
        fn set_nonce1(&self, nonce1: Nonce1) {
            self.events.lock().unwrap().push(UpstreamEvent::Nonce1(nonce1));
        }

        fn new_job(&self, job: Job, _on_share: OnShare) {
            self.events.lock().unwrap().push(UpstreamEvent::Job(job));
        }
    }

    fn ignore_shares() -> OnShare {
        Arc::new(|_: Share| {})
    }

    fn job_line(job: &Job) -> String {
        format!(
            r#"{{"job": {{"job_id": "{}", "version": {}, "prev_hash": "{}", "merkle_root": "{}", "reserved": "{}", "time": {}, "bits": {}, "target": "{}"}}}}"#,
            job.job_id,
            job.version,
            hex::encode(job.prev_hash),
            hex::encode(job.merkle_root),
            hex::encode(job.reserved),
            job.time,
            job.bits,
            hex::encode(job.target),
        )
    }

    #[tokio::test]
    async fn dispatches_events_to_every_listener_in_order() {
        let job = job_with_target("1a", [0x0f; 32]);
        let feed = format!(
            "# upstream session\n{}\n\n{}\n",
            r#"{"nonce1": "f000000f"}"#,
            job_line(&job)
        );
        let listeners = vec![
            Arc::new(RecordingListener::default()),
            Arc::new(RecordingListener::default()),
        ];

        let dispatched = run_job_feed(feed.as_bytes(), &listeners, ignore_shares())
            .await
            .unwrap();

        assert_eq!(2, dispatched);
        for listener in &listeners {
            assert_eq!(
                vec![
                    UpstreamEvent::Nonce1(Nonce1::from(vec![0xf0, 0, 0, 0x0f])),
                    UpstreamEvent::Job(job.clone()),
                ],
                *listener.events.lock().unwrap()
            );
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let feed = "not json\n{\"nonce1\": \"zz\"}\n{\"unknown\": 1}\n{\"nonce1\": \"00\"}\n";
        let listeners = vec![Arc::new(RecordingListener::default())];

        let dispatched = run_job_feed(feed.as_bytes(), &listeners, ignore_shares())
            .await
            .unwrap();

        assert_eq!(1, dispatched);
        assert_eq!(
            vec![UpstreamEvent::Nonce1(Nonce1::from(vec![0]))],
            *listeners[0].events.lock().unwrap()
        );
    }

    #[tokio::test]
    async fn read_error_ends_the_feed() {
        let input = Builder::new()
            .read(b"{\"nonce1\": \"00\"}\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream went away",
            ))
            .build();
        let listeners = vec![Arc::new(RecordingListener::default())];

        let_assert!(
            Err(JobFeedError::Io(e)) =
                run_job_feed(tokio::io::BufReader::new(input), &listeners, ignore_shares()).await
        );
        assert_eq!(std::io::ErrorKind::ConnectionReset, e.kind());
        assert_eq!(1, listeners[0].events.lock().unwrap().len());
    }

    #[test]
    fn clean_jobs_defaults_to_false() {
        let job = job_with_target("1a", [0; 32]);
        let event: UpstreamEvent = serde_json::from_str(&job_line(&job)).unwrap();
        assert_eq!(UpstreamEvent::Job(job), event);
    }
}
