//! Background appends for the overflow blocks of pages created in
//! create-only mode. Jobs run on one worker thread while later batches keep
//! going; every job reports back so partial pages are visible in the run
//! summary.

use std::thread::{Scope, ScopedJoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use serde::Serialize;

use crate::blocks::RemoteBlock;
use crate::notion::{MAX_BLOCKS_PER_CALL, NotionApi, append_in_batches};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredAppend {
    pub title: String,
    pub page_id: String,
    pub blocks: Vec<RemoteBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverflowReport {
    pub title: String,
    pub page_id: String,
    pub requested: usize,
    pub appended: usize,
    pub error: Option<String>,
}

impl OverflowReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.appended == self.requested
    }
}

pub struct DeferredAppender<'scope> {
    jobs: Option<Sender<DeferredAppend>>,
    reports: Receiver<OverflowReport>,
    worker: ScopedJoinHandle<'scope, ()>,
}

impl<'scope> DeferredAppender<'scope> {
    pub fn spawn<'env>(scope: &'scope Scope<'scope, 'env>, api: &'env dyn NotionApi) -> Self {
        let (job_tx, job_rx) = unbounded::<DeferredAppend>();
        let (report_tx, report_rx) = unbounded::<OverflowReport>();
        let worker = scope.spawn(move || {
            for job in job_rx.iter() {
                let report = run_job(api, job);
                if report_tx.send(report).is_err() {
                    break;
                }
            }
        });
        Self {
            jobs: Some(job_tx),
            reports: report_rx,
            worker,
        }
    }

    pub fn submit(&self, job: DeferredAppend) {
        debug!(
            "queued {} overflow blocks for {}",
            job.blocks.len(),
            job.title
        );
        let Some(jobs) = &self.jobs else {
            return;
        };
        if let Err(error) = jobs.send(job) {
            warn!("overflow worker is gone; dropped job for {}", error.0.title);
        }
    }

    /// Close the queue, wait for queued jobs, and collect their reports.
    pub fn finish(mut self) -> Vec<OverflowReport> {
        self.jobs.take();
        if self.worker.join().is_err() {
            warn!("overflow worker panicked");
        }
        self.reports.try_iter().collect()
    }
}

fn run_job(api: &dyn NotionApi, job: DeferredAppend) -> OverflowReport {
    let requested = job.blocks.len();
    let (appended, error) =
        match append_in_batches(api, &job.page_id, &job.blocks, MAX_BLOCKS_PER_CALL) {
            Ok(appended) => (appended, None),
            Err(error) => {
                warn!("overflow append failed for {}: {error:#}", job.title);
                (0, Some(format!("{error:#}")))
            }
        };
    OverflowReport {
        title: job.title,
        page_id: job.page_id,
        requested,
        appended,
        error,
    }
}
