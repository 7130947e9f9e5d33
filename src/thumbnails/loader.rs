//! Priority-aware image loader.
//!
//! - Two lanes, each its own multi-thread tokio runtime with named workers
//! - `UserInteractive`/`UserInitiated` requests run on the interactive lane,
//!   everything else on the background lane
//! - Every request holds a [`TaskLimiter`] permit for the resolve + fetch
//! - The fetch itself runs on the lane's blocking pool
//! - Callback completions are posted to the [`MainContext`] with the
//!   request's priority

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::fetcher::{ContentMode, ImageFetcher, TargetSize, Thumbnail};
use super::limiter::TaskLimiter;
use crate::config::GalleryConfig;
use crate::dispatch::{MainContext, Priority};
use crate::models::MediaReference;
use crate::scanner::MediaResolver;

/// Callback invoked on the main context with the loaded image.
pub type LoadCompletion = Box<dyn FnOnce(Option<Thumbnail>) + Send + 'static>;

/// A request to load one image.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub reference: MediaReference,
    pub target: TargetSize,
    pub mode: ContentMode,
    pub priority: Priority,
}

impl LoadRequest {
    pub fn new(reference: MediaReference, target: TargetSize) -> Self {
        Self {
            reference,
            target,
            mode: ContentMode::AspectFill,
            priority: Priority::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_mode(mut self, mode: ContentMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One execution lane.
struct Lane {
    name: &'static str,
    runtime: Option<Runtime>,
}

impl Lane {
    fn new(name: &'static str, threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name(format!("photogrid-{}", name))
            .enable_all()
            .build()
            .with_context(|| format!("Failed to start {} loader lane", name))?;

        debug!(lane = name, threads, "Started loader lane");
        Ok(Self {
            name,
            runtime: Some(runtime),
        })
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(future);
            }
            None => trace!(lane = self.name, "Lane stopped, request dropped"),
        }
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        // The loader may be dropped from inside an async context, where a
        // blocking runtime shutdown would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(lane = self.name, "Stopped loader lane");
        }
    }
}

/// Delivers `None` if the request is dropped before it completes.
struct CompletionGuard {
    callback: Option<LoadCompletion>,
    priority: Priority,
    main: MainContext,
}

impl CompletionGuard {
    fn complete(mut self, image: Option<Thumbnail>) {
        self.deliver(image);
    }

    fn deliver(&mut self, image: Option<Thumbnail>) {
        if let Some(callback) = self.callback.take() {
            self.main.post(self.priority, move || callback(image));
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.deliver(None);
    }
}

struct LoaderInner {
    interactive: Lane,
    background: Lane,
    limiter: TaskLimiter,
    fetcher: Arc<dyn ImageFetcher>,
    resolver: Arc<dyn MediaResolver>,
    main: MainContext,
}

impl LoaderInner {
    fn lane_for(&self, priority: Priority) -> &Lane {
        if priority.is_interactive() {
            &self.interactive
        } else {
            &self.background
        }
    }

    /// The work for one request. Captures clones, never the loader itself.
    fn job(&self, request: LoadRequest) -> impl Future<Output = Option<Thumbnail>> + Send + 'static {
        let limiter = self.limiter.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let resolver = Arc::clone(&self.resolver);

        async move {
            let _permit = match limiter.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Failed to acquire decode permit");
                    return None;
                }
            };

            let identifier = request.reference.identifier.clone();
            match tokio::task::spawn_blocking(move || {
                fetch_final(fetcher.as_ref(), resolver.as_ref(), &request)
            })
            .await
            {
                Ok(image) => image,
                Err(e) => {
                    warn!(identifier = %identifier, error = %e, "Image fetch task failed");
                    None
                }
            }
        }
    }
}

/// Cloneable handle to the two-lane loader.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl ImageLoader {
    pub fn new(
        config: &GalleryConfig,
        fetcher: Arc<dyn ImageFetcher>,
        resolver: Arc<dyn MediaResolver>,
        main: MainContext,
    ) -> Result<Self> {
        let inner = LoaderInner {
            interactive: Lane::new("interactive", config.interactive_threads)?,
            background: Lane::new("background", config.background_threads)?,
            limiter: TaskLimiter::new(config.max_concurrent_tasks),
            fetcher,
            resolver,
            main,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Loads an image and waits for it. `None` on any failure.
    pub async fn load(&self, request: LoadRequest) -> Option<Thumbnail> {
        let (tx, rx) = oneshot::channel();
        let priority = request.priority;
        let job = self.inner.job(request);
        self.inner.lane_for(priority).spawn(async move {
            let _ = tx.send(job.await);
        });
        // A dropped sender means the lane shut down mid-flight.
        rx.await.ok().flatten()
    }

    pub async fn load_image(
        &self,
        reference: MediaReference,
        target: TargetSize,
        priority: Priority,
    ) -> Option<Thumbnail> {
        self.load(LoadRequest::new(reference, target).with_priority(priority))
            .await
    }

    /// Loads an image and runs `completion` on the main context.
    ///
    /// The completion runs exactly once, with `None` on failure or when the
    /// loader shuts down first.
    pub fn request<F>(&self, request: LoadRequest, completion: F)
    where
        F: FnOnce(Option<Thumbnail>) + Send + 'static,
    {
        let guard = CompletionGuard {
            callback: Some(Box::new(completion)),
            priority: request.priority,
            main: self.inner.main.clone(),
        };
        let priority = request.priority;
        let job = self.inner.job(request);
        self.inner.lane_for(priority).spawn(async move {
            guard.complete(job.await);
        });
    }

    pub fn request_image<F>(
        &self,
        reference: MediaReference,
        target: TargetSize,
        priority: Priority,
        completion: F,
    ) where
        F: FnOnce(Option<Thumbnail>) + Send + 'static,
    {
        self.request(
            LoadRequest::new(reference, target).with_priority(priority),
            completion,
        );
    }

    pub fn limiter(&self) -> &TaskLimiter {
        &self.inner.limiter
    }

    pub fn main_context(&self) -> &MainContext {
        &self.inner.main
    }
}

/// Resolves and fetches, keeping only the first final delivery.
fn fetch_final(
    fetcher: &dyn ImageFetcher,
    resolver: &dyn MediaResolver,
    request: &LoadRequest,
) -> Option<Thumbnail> {
    let identifier = request.reference.identifier.as_str();
    let Some(handle) = resolver.resolve(identifier) else {
        debug!(identifier, "Media no longer resolves");
        return None;
    };

    let mut accepted: Option<Thumbnail> = None;
    let result = fetcher.fetch(&handle, request.target, request.mode, &mut |delivery| {
        if delivery.degraded {
            trace!(identifier, "Ignoring degraded delivery");
        } else if accepted.is_none() {
            accepted = Some(delivery.image);
        }
    });

    if let Err(e) = result {
        warn!(identifier, error = %e, "Failed to fetch image");
        return None;
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaHandle, MediaKind};
    use crate::thumbnails::FetchDelivery;
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn resolve_any(identifier: &str) -> Option<MediaHandle> {
        (identifier != "missing").then(|| {
            MediaHandle::new(
                MediaReference::new(identifier, 0, MediaKind::Image),
                PathBuf::from(identifier),
            )
        })
    }

    fn reference(identifier: &str) -> MediaReference {
        MediaReference::new(identifier, 0, MediaKind::Image)
    }

    fn loader_with(fetcher: Arc<dyn ImageFetcher>, permits: usize) -> ImageLoader {
        let config = GalleryConfig::new()
            .max_concurrent_tasks(permits)
            .lane_threads(2, 2);
        ImageLoader::new(&config, fetcher, Arc::new(resolve_any), MainContext::new()).unwrap()
    }

    fn image(side: u32) -> Thumbnail {
        Thumbnail::new(RgbaImage::new(side, side))
    }

    /// Runs main-context jobs until `done` or the deadline passes.
    fn pump_until(main: &MainContext, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            main.run_pending();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Preview, then two finals; only the first final counts.
    struct LayeredFetcher;

    impl ImageFetcher for LayeredFetcher {
        fn fetch(
            &self,
            _handle: &MediaHandle,
            _target: TargetSize,
            _mode: ContentMode,
            deliver: &mut dyn FnMut(FetchDelivery),
        ) -> Result<()> {
            deliver(FetchDelivery {
                image: image(1),
                degraded: true,
            });
            deliver(FetchDelivery {
                image: image(5),
                degraded: false,
            });
            deliver(FetchDelivery {
                image: image(7),
                degraded: false,
            });
            Ok(())
        }
    }

    struct FailingFetcher;

    impl ImageFetcher for FailingFetcher {
        fn fetch(
            &self,
            _handle: &MediaHandle,
            _target: TargetSize,
            _mode: ContentMode,
            _deliver: &mut dyn FnMut(FetchDelivery),
        ) -> Result<()> {
            anyhow::bail!("decode failed")
        }
    }

    /// Records the thread name of each fetch and the peak concurrency.
    #[derive(Default)]
    struct RecordingFetcher {
        threads: Mutex<Vec<String>>,
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl ImageFetcher for RecordingFetcher {
        fn fetch(
            &self,
            _handle: &MediaHandle,
            _target: TargetSize,
            _mode: ContentMode,
            deliver: &mut dyn FnMut(FetchDelivery),
        ) -> Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let name = std::thread::current().name().unwrap_or("").to_string();
            self.threads.lock().push(name);
            std::thread::sleep(self.delay);
            self.current.fetch_sub(1, Ordering::SeqCst);
            deliver(FetchDelivery {
                image: image(2),
                degraded: false,
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_degraded_deliveries_ignored() {
        let loader = loader_with(Arc::new(LayeredFetcher), 4);
        let image = loader
            .load_image(reference("/a.jpg"), TargetSize::square(64), Priority::UserInitiated)
            .await
            .unwrap();
        assert_eq!(image.width(), 5);
    }

    #[tokio::test]
    async fn test_failures_yield_none() {
        let loader = loader_with(Arc::new(FailingFetcher), 4);
        let result = loader
            .load_image(reference("/a.jpg"), TargetSize::square(64), Priority::Utility)
            .await;
        assert!(result.is_none());

        let loader = loader_with(Arc::new(LayeredFetcher), 4);
        let result = loader
            .load_image(reference("missing"), TargetSize::square(64), Priority::Utility)
            .await;
        assert!(result.is_none());
        assert_eq!(loader.limiter().available(), 4);
    }

    #[tokio::test]
    async fn test_priority_selects_lane() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let loader = loader_with(fetcher.clone(), 4);

        loader
            .load_image(reference("/a.jpg"), TargetSize::square(8), Priority::UserInteractive)
            .await
            .unwrap();
        loader
            .load_image(reference("/b.jpg"), TargetSize::square(8), Priority::Background)
            .await
            .unwrap();

        let threads = fetcher.threads.lock().clone();
        assert_eq!(threads.len(), 2);
        assert!(threads[0].contains("interactive"), "got {}", threads[0]);
        assert!(threads[1].contains("background"), "got {}", threads[1]);
    }

    #[tokio::test]
    async fn test_limiter_bounds_both_lanes() {
        let fetcher = Arc::new(RecordingFetcher {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let loader = loader_with(fetcher.clone(), 1);

        let mut loads = Vec::new();
        for i in 0..8 {
            let priority = if i % 2 == 0 {
                Priority::UserInitiated
            } else {
                Priority::Utility
            };
            let loader = loader.clone();
            loads.push(tokio::spawn(async move {
                loader
                    .load_image(reference(&format!("/{}.jpg", i)), TargetSize::square(8), priority)
                    .await
            }));
        }
        for load in loads {
            assert!(load.await.unwrap().is_some());
        }

        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.threads.lock().len(), 8);
    }

    #[test]
    fn test_callback_runs_on_main_context() {
        let loader = loader_with(Arc::new(LayeredFetcher), 4);
        let main = loader.main_context().clone();
        let result = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&result);
        loader.request_image(
            reference("/a.jpg"),
            TargetSize::square(16),
            Priority::UserInitiated,
            move |image| *slot.lock() = Some(image.map(|i| i.width())),
        );

        // Nothing is delivered until the main context runs.
        std::thread::sleep(Duration::from_millis(50));
        assert!(result.lock().is_none());

        pump_until(&main, || result.lock().is_some());
        assert_eq!(*result.lock(), Some(Some(5)));
    }

    #[test]
    fn test_dropped_loader_completes_with_none() {
        let fetcher = Arc::new(RecordingFetcher {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let loader = loader_with(fetcher, 1);
        let main = loader.main_context().clone();
        let results = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let results = Arc::clone(&results);
            loader.request_image(
                reference(&format!("/{}.jpg", i)),
                TargetSize::square(8),
                Priority::Background,
                move |image| results.lock().push(image.is_some()),
            );
        }
        drop(loader);

        pump_until(&main, || results.lock().len() == 3);
        assert_eq!(*results.lock(), vec![false, false, false]);
    }
}
