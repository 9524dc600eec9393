// THEORY:
// Batch runs measure many panoramas, and each one is independent of every
// other. The parallel pipeline spreads them over a fixed pool of workers:
//
// 1.  **Dispatcher**: a single task receives every submitted panorama and
//     hands it to the workers round-robin.
// 2.  **Workers**: each worker owns a clone of the `GreenViewPipeline` and the
//     shared `TileSource`. Classification is CPU-bound, so the actual
//     measurement runs on tokio's blocking pool and the worker only awaits it.
// 3.  **Replies**: every task carries a `oneshot` sender, so results flow back
//     to exactly the caller that submitted them, and the batch API can return
//     reports in request order regardless of completion order.
//
// A batch never fails as a whole. A panorama whose worker dies or whose reply
// is lost is reported with the failure sentinel like any other failed
// panorama.
//
// Deduplication is the caller's concern: `process_batch` consults the
// caller-owned `PanoramaLedger` before submitting anything, and records an ID
// there only once a report for it exists.

use crate::config::PipelineConfig;
use crate::error::{GreenViewError, Result};
use crate::panorama::{PanoramaLedger, PanoramaReport, TileSource, measure_panorama};
use crate::pipeline::GreenViewPipeline;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub struct PanoramaTask {
    pub pano_id: String,
    pub result_sender: oneshot::Sender<Result<PanoramaReport>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<PanoramaTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers on the current runtime.
    pub fn new(pipeline: GreenViewPipeline, source: Arc<dyn TileSource>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<PanoramaTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<PanoramaTask>())
            .unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    let _ = task
                        .result_sender
                        .send(Err(GreenViewError::worker_pool("worker stopped")));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_pipeline = pipeline.clone();
            let worker_source = Arc::clone(&source);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    debug!(worker_id, pano_id = %task.pano_id, "measuring panorama");
                    let pipeline = worker_pipeline.clone();
                    let source = Arc::clone(&worker_source);
                    let pano_id = task.pano_id;

                    let result = tokio::task::spawn_blocking(move || {
                        measure_panorama(&pipeline, source.as_ref(), &pano_id)
                    })
                    .await
                    .map_err(|e| GreenViewError::worker_pool(format!("measurement task failed: {e}")));

                    let _ = task.result_sender.send(result);
                }
            });

            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submits one panorama and waits for its report.
    pub async fn measure(&self, pano_id: String) -> Result<PanoramaReport> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = PanoramaTask {
            pano_id,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| GreenViewError::worker_pool("Failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| GreenViewError::worker_pool("Failed to receive result from worker"))?
    }

    /// Closes the queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Measures batches of panoramas on a `WorkerPool`.
pub struct ParallelPipeline {
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig, source: Arc<dyn TileSource>) -> Result<Self> {
        let workers = config.workers();
        let pipeline = GreenViewPipeline::new(config)?;
        info!(workers, "starting worker pool");
        Ok(Self {
            worker_pool: WorkerPool::new(pipeline, source, workers),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Measures every panorama not yet in `ledger`, in request order.
    ///
    /// IDs already in the ledger, and repeats within `pano_ids`, are skipped.
    /// Every submitted ID yields exactly one report and is then recorded.
    pub async fn process_batch(
        &self,
        pano_ids: Vec<String>,
        ledger: &mut PanoramaLedger,
    ) -> Vec<PanoramaReport> {
        if !ledger.is_empty() {
            debug!(already_measured = ledger.len(), "resuming with a seeded ledger");
        }

        let mut seen = HashSet::new();
        let submitted: Vec<String> = pano_ids
            .into_iter()
            .filter(|pano_id| {
                let fresh = !ledger.contains(pano_id) && seen.insert(pano_id.clone());
                if !fresh {
                    debug!(pano_id = %pano_id, "skipping panorama already measured");
                }
                fresh
            })
            .collect();

        let results = join_all(
            submitted
                .iter()
                .map(|pano_id| self.worker_pool.measure(pano_id.clone())),
        )
        .await;

        let reports: Vec<PanoramaReport> = submitted
            .into_iter()
            .zip(results)
            .map(|(pano_id, result)| {
                result.unwrap_or_else(|err| {
                    error!(pano_id = %pano_id, error = %err, "panorama lost by worker pool; reporting sentinel");
                    PanoramaReport::failed(pano_id, None, err.to_string())
                })
            })
            .collect();

        for report in &reports {
            ledger.claim(&report.pano_id);
        }
        reports
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationMethod;
    use crate::core_modules::aggregator::AreaPolicy;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::pixel_array::PixelArray;
    use crate::panorama::{FAILURE_SENTINEL, GreenView};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Green tiles for IDs starting with "g", black otherwise. "missing" has no
    /// tiles, "malformed" yields a shape error and "panic" brings the task down.
    struct SyntheticSource {
        fetches: AtomicUsize,
    }

    impl TileSource for SyntheticSource {
        fn fetch(&self, pano_id: &str, heading: u32) -> Result<PixelArray> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if pano_id == "missing" {
                return Err(GreenViewError::TileUnavailable {
                    pano_id: pano_id.to_string(),
                    heading,
                    reason: "no imagery".to_string(),
                });
            }
            if pano_id == "malformed" {
                return Err(GreenViewError::invalid_shape(400, 400, 0));
            }
            if pano_id == "panic" {
                panic!("tile decoder crashed");
            }
            let pixel = if pano_id.starts_with('g') {
                Pixel::new(0.1, 0.6, 0.1)
            } else {
                Pixel::new(0.0, 0.0, 0.0)
            };
            PixelArray::filled(4, 4, pixel)
        }
    }

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            area_policy: AreaPolicy::ActualDimensions,
            segmentation: SegmentationMethod::Identity,
            worker_count: Some(workers),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_request_order() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(3), source).unwrap();
        assert_eq!(pipeline.worker_count(), 3);

        let ids = ["g1", "b1", "g2", "b2", "g3"].map(String::from).to_vec();
        let mut ledger = PanoramaLedger::new();
        let reports = pipeline.process_batch(ids, &mut ledger).await;

        let values: Vec<(String, f64)> = reports
            .iter()
            .map(|r| (r.pano_id.clone(), r.green_view.value()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("g1".to_string(), 100.0),
                ("b1".to_string(), 0.0),
                ("g2".to_string(), 100.0),
                ("b2".to_string(), 0.0),
                ("g3".to_string(), 100.0),
            ]
        );
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_batch_skips_duplicates_across_calls() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(2), source.clone()).unwrap();
        let mut ledger = PanoramaLedger::new();

        let first = pipeline
            .process_batch(["g1", "g1", "b1"].map(String::from).to_vec(), &mut ledger)
            .await;
        assert_eq!(first.len(), 2);

        let second = pipeline
            .process_batch(["b1", "g2"].map(String::from).to_vec(), &mut ledger)
            .await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].pano_id, "g2");

        // Three distinct panoramas, six headings each.
        assert_eq!(source.fetches.load(Ordering::SeqCst), 18);
        assert_eq!(ledger.len(), 3);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_panorama_does_not_abort_batch() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(2), source).unwrap();
        let mut ledger = PanoramaLedger::new();

        let reports = pipeline
            .process_batch(["missing", "g1"].map(String::from).to_vec(), &mut ledger)
            .await;

        assert!(matches!(reports[0].green_view, GreenView::Failed { heading: Some(0), .. }));
        assert_eq!(reports[0].green_view.value(), FAILURE_SENTINEL);
        assert_eq!(reports[1].green_view, GreenView::Measured(100.0));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_panorama_keeps_rest_of_batch() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(2), source.clone()).unwrap();
        let mut ledger = PanoramaLedger::new();

        let reports = pipeline
            .process_batch(["g1", "malformed", "b1"].map(String::from).to_vec(), &mut ledger)
            .await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].green_view, GreenView::Measured(100.0));
        assert!(matches!(reports[1].green_view, GreenView::Failed { heading: Some(0), .. }));
        assert_eq!(reports[2].green_view, GreenView::Measured(0.0));
        assert_eq!(ledger.len(), 3);

        // Every ID already has a report, so a retry measures nothing new.
        let fetches = source.fetches.load(Ordering::SeqCst);
        let retry = pipeline
            .process_batch(["g1", "malformed"].map(String::from).to_vec(), &mut ledger)
            .await;
        assert!(retry.is_empty());
        assert_eq!(source.fetches.load(Ordering::SeqCst), fetches);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_source_reports_sentinel() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(1), source).unwrap();
        let mut ledger = PanoramaLedger::new();

        let reports = pipeline
            .process_batch(["panic", "g1"].map(String::from).to_vec(), &mut ledger)
            .await;

        assert!(matches!(reports[0].green_view, GreenView::Failed { heading: None, .. }));
        assert_eq!(reports[0].green_view.value(), FAILURE_SENTINEL);
        assert_eq!(reports[1].green_view, GreenView::Measured(100.0));
        assert!(ledger.contains("panic"));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_seeded_ledger_skips_earlier_reports() {
        let source = Arc::new(SyntheticSource {
            fetches: AtomicUsize::new(0),
        });
        let pipeline = ParallelPipeline::new(config(2), source).unwrap();
        let earlier = "panoID: g1, greenview: 100\n";
        let mut ledger = PanoramaLedger::from_report_lines(earlier.as_bytes()).unwrap();

        let reports = pipeline
            .process_batch(["g1", "g2"].map(String::from).to_vec(), &mut ledger)
            .await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].pano_id, "g2");
        assert_eq!(ledger.len(), 2);
        pipeline.shutdown().await;
    }
}
