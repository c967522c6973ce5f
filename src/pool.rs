//! Worker pool for off-thread query execution.

use std::num::NonZeroUsize;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, Builder as ThreadBuilder};

use tracing::info;

use crate::Error;
use crate::geojson::FeatureCollection;
use crate::geometry::GeoPoint;
use crate::query::{self, QueryOptions};
use crate::tile::TileData;

/// Completion callback invoked with the query outcome.
type Completion = Box<dyn FnOnce(Result<FeatureCollection, Error>) + Send>;

/// Queued query together with its completion callback.
struct Job {
    tiles: Vec<TileData>,
    lnglat: GeoPoint,
    options: QueryOptions,
    completion: Completion,
}

/// Shared pool of query worker threads.
///
/// Every submitted query runs to completion on a single worker; queries on
/// different workers share no mutable state. Dropping the pool closes the
/// queue and workers shut down once the queued jobs have drained.
pub struct QueryPool {
    job_tx: mpsc::Sender<Job>,
}

impl QueryPool {
    /// Spawn a pool with one worker per available CPU.
    pub fn new() -> Result<Self, Error> {
        let threads = thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
        Self::with_threads(threads)
    }

    /// Spawn a pool with a fixed number of workers.
    pub fn with_threads(threads: usize) -> Result<Self, Error> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for index in 0..threads.max(1) {
            let job_rx = job_rx.clone();
            ThreadBuilder::new()
                .name(format!("tilequery-worker-{index}"))
                .spawn(move || Self::listen(&job_rx))?;
        }

        Ok(Self { job_tx })
    }

    /// Submit a query for execution.
    ///
    /// Invalid arguments are reported synchronously without scheduling
    /// anything. Otherwise the completion is invoked on a worker thread with
    /// either the feature collection or the first error encountered.
    pub fn submit<F>(
        &self,
        tiles: Vec<TileData>,
        lnglat: GeoPoint,
        options: QueryOptions,
        completion: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Result<FeatureCollection, Error>) + Send + 'static,
    {
        query::validate_request(tiles.len(), lnglat, &options)?;

        let job = Job { tiles, lnglat, options, completion: Box::new(completion) };
        self.job_tx.send(job).map_err(|_| Error::PoolShutdown)
    }

    /// Run queries until the pool is dropped.
    fn listen(job_rx: &Mutex<Receiver<Job>>) {
        info!("Starting query worker");

        loop {
            // Hold the lock only while waiting for a job, never while
            // executing one.
            let job = match job_rx.lock() {
                Ok(job_rx) => job_rx.recv(),
                Err(_) => break,
            };
            let job = match job {
                Ok(job) => job,
                Err(_) => break,
            };

            let buffers: Vec<_> = job.tiles.iter().map(TileData::buffer).collect();
            let result = query::query(&buffers, job.lnglat, &job.options);
            (job.completion)(result);
        }

        info!("Shutting down query worker");
    }
}
