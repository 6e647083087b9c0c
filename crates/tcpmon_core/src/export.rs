//! Concurrent exporter.
//!
//! Decodes and renders scanned records on a pool of worker threads.
//!
//! ## Pipeline
//!
//! ```text
//! producer ──► bounded queue ──► worker 1 ─┐
//!  (ranges)                  ├─► worker 2 ─┼─► Mutex<sink>
//!                            └─► worker N ─┘
//! ```
//!
//! The producer enqueues every range and then drops the sender. Workers
//! receive until the queue is closed and empty, so no queued job is ever
//! abandoned. The first worker error raises a cancel flag: the producer
//! stops enqueueing, the remaining jobs are drained without processing,
//! and the error is returned. Output already written stays written.

use crate::error::{CoreError, CoreResult};
use crate::reader::ScannedFile;
use crate::types::RecordRange;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tcpmon_codec::{Metric, Renderer, Timestamp};
use tracing::{debug, info};

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Export options.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Only export when this time falls inside the exported range.
    pub target: Option<Timestamp>,
    /// Report the range bounds without exporting.
    pub show_only: bool,
    /// Host tag passed to the renderer.
    pub hostname: String,
    /// Worker count; `None` picks one less than the available cores.
    pub workers: Option<usize>,
    /// Job queue capacity.
    pub queue_capacity: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            target: None,
            show_only: false,
            hostname: String::new(),
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ExportOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target time.
    #[must_use]
    pub fn target(mut self, target: Timestamp) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets show-only mode.
    #[must_use]
    pub fn show_only(mut self, value: bool) -> Self {
        self.show_only = value;
        self
    }

    /// Sets the host tag.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the job queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Returns the number of workers to spawn for `jobs` records.
    #[must_use]
    pub fn worker_count(&self, jobs: usize) -> usize {
        let wanted = self.workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
        });
        wanted.clamp(1, jobs.max(1))
    }
}

/// What an export did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    /// Earliest bound of the range, if it had records.
    pub start: Option<Timestamp>,
    /// Latest bound of the range, if it had records.
    pub end: Option<Timestamp>,
    /// Records rendered to the sink.
    pub records: u64,
    /// True if only the bounds were reported.
    pub shown_only: bool,
}

/// Exports scanned records through a [`Renderer`].
pub struct Exporter<'a> {
    renderer: &'a dyn Renderer,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    /// Creates an exporter.
    #[must_use]
    pub fn new(renderer: &'a dyn Renderer, options: ExportOptions) -> Self {
        Self { renderer, options }
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Exports the records of `files`, treated as one logical range.
    ///
    /// The range bounds come from decoding only the first and the last
    /// record. Output order across records is not guaranteed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TimePointNotIncluded`] if a target is set and
    /// lies outside `[start, end)`; nothing is written in that case. Any
    /// read, decode, render or sink error stops the export and is returned.
    pub fn export<W: Write + Send>(
        &self,
        files: &[Arc<ScannedFile>],
        sink: &mut W,
    ) -> CoreResult<ExportSummary> {
        let jobs: usize = files.iter().map(|f| f.ranges().len()).sum();
        let Some((start, end)) = self.bounds(files)? else {
            return Ok(ExportSummary {
                shown_only: self.options.show_only,
                ..ExportSummary::default()
            });
        };

        if self.options.show_only {
            info!(%start, %end, records = jobs, "Export range");
            return Ok(ExportSummary {
                start: Some(start),
                end: Some(end),
                records: 0,
                shown_only: true,
            });
        }

        if let Some(target) = self.options.target {
            if target < start || target >= end {
                return Err(CoreError::TimePointNotIncluded { target, start, end });
            }
        }

        let records = self.run(files, jobs, sink)?;
        Ok(ExportSummary {
            start: Some(start),
            end: Some(end),
            records,
            shown_only: false,
        })
    }

    fn bounds(&self, files: &[Arc<ScannedFile>]) -> CoreResult<Option<(Timestamp, Timestamp)>> {
        let mut ranges = files
            .iter()
            .flat_map(|file| file.ranges().iter().map(move |range| (file, range)));
        let Some((first_file, first)) = ranges.next() else {
            return Ok(None);
        };
        let (last_file, last) = ranges.last().unwrap_or((first_file, first));

        let start = decode(first_file, first)?.timestamp();
        let end = decode(last_file, last)?.timestamp();
        Ok(Some(if start <= end { (start, end) } else { (end, start) }))
    }

    fn run<W: Write + Send>(
        &self,
        files: &[Arc<ScannedFile>],
        jobs: usize,
        sink: &mut W,
    ) -> CoreResult<u64> {
        let workers = self.options.worker_count(jobs);
        let (tx, rx) = mpsc::sync_channel::<(usize, RecordRange)>(self.options.queue_capacity);
        let rx = Mutex::new(rx);
        let sink = Mutex::new(sink);
        let cancel = AtomicBool::new(false);
        let first_error: Mutex<Option<CoreError>> = Mutex::new(None);
        let processed = AtomicU64::new(0);

        debug!(workers, jobs, "Starting export");
        thread::scope(|scope| {
            for id in 0..workers {
                let ctx = WorkerContext {
                    id,
                    files,
                    rx: &rx,
                    sink: &sink,
                    cancel: &cancel,
                    first_error: &first_error,
                    processed: &processed,
                };
                scope.spawn(move || self.work(ctx));
            }

            'produce: for (idx, file) in files.iter().enumerate() {
                for range in file.ranges() {
                    if cancel.load(Ordering::Acquire) || tx.send((idx, *range)).is_err() {
                        break 'produce;
                    }
                }
            }
            drop(tx);
        });

        let flushed = sink.into_inner().flush();
        if let Some(e) = first_error.into_inner() {
            return Err(e);
        }
        flushed?;
        Ok(processed.into_inner())
    }

    fn work<S: Write + Send>(&self, ctx: WorkerContext<'_, S>) {
        debug!(worker = ctx.id, "Export worker started");
        let mut done = 0u64;

        loop {
            let job = ctx.rx.lock().recv();
            let Ok((idx, range)) = job else {
                break;
            };
            if ctx.cancel.load(Ordering::Acquire) {
                continue;
            }

            match self.process(&ctx.files[idx], &range, ctx.sink) {
                Ok(()) => {
                    done += 1;
                    ctx.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    let mut slot = ctx.first_error.lock();
                    if slot.is_none() {
                        debug!(worker = ctx.id, error = %e, "Export worker failed");
                        *slot = Some(e);
                    }
                    ctx.cancel.store(true, Ordering::Release);
                }
            }
        }

        debug!(worker = ctx.id, records = done, "Export worker finished");
    }

    fn process<S: Write>(
        &self,
        file: &ScannedFile,
        range: &RecordRange,
        sink: &Mutex<S>,
    ) -> CoreResult<()> {
        let metric = decode(file, range)?;
        let rendered = self.renderer.render(&metric, &self.options.hostname)?;
        if rendered.is_empty() {
            return Ok(());
        }
        sink.lock().write_all(rendered.as_bytes())?;
        Ok(())
    }
}

struct WorkerContext<'s, S> {
    id: usize,
    files: &'s [Arc<ScannedFile>],
    rx: &'s Mutex<mpsc::Receiver<(usize, RecordRange)>>,
    sink: &'s Mutex<S>,
    cancel: &'s AtomicBool,
    first_error: &'s Mutex<Option<CoreError>>,
    processed: &'s AtomicU64,
}

fn decode(file: &ScannedFile, range: &RecordRange) -> CoreResult<Metric> {
    let body = file.read_body(range)?;
    Ok(Metric::decode(&body)?)
}
