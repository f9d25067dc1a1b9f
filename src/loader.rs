use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::{Condvar, Mutex};

use crate::cache::LruCache;
use crate::error::{PapercutError, Result};

pub const DEFAULT_CAPACITY: usize = 10;

/// Threads reserved for fetching and decoding, apart from the global pool used for rendering.
pub const IO_THREADS: usize = 4;

/// Where encoded image bytes come from. Implementations may block; they are only ever called
/// from the loader's worker threads.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Resolves keys as paths relative to `root` (absolute keys are used as-is).
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }
}

impl ImageSource for FileSource {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        std::fs::read(&path).map_err(|source| PapercutError::Io {
            key: key.to_owned(),
            source,
        })
    }
}

/// Serves encoded images held in memory, such as uploads.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }
}

impl ImageSource for MemorySource {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| PapercutError::Io {
                key: key.to_owned(),
                source: std::io::ErrorKind::NotFound.into(),
            })
    }
}

#[derive(Debug, Clone)]
pub enum ImageState {
    Pending,
    Ready(Arc<RgbaImage>),
    /// Fetching or decoding failed. Consumers fall back to their default fill.
    Unavailable,
}

/// A decode that is either still running or finished.
#[derive(Debug)]
pub struct PendingImage {
    key: String,
    state: Mutex<ImageState>,
    resolved: Condvar,
}

impl PendingImage {
    fn new(key: &str) -> Self {
        PendingImage {
            key: key.to_owned(),
            state: Mutex::new(ImageState::Pending),
            resolved: Condvar::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> ImageState {
        self.state.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), ImageState::Pending)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(*self.state.lock(), ImageState::Unavailable)
    }

    /// Blocks until the decode finishes. `None` means the image is unavailable.
    pub fn wait(&self) -> Option<Arc<RgbaImage>> {
        let mut state = self.state.lock();
        while matches!(*state, ImageState::Pending) {
            self.resolved.wait(&mut state);
        }
        match &*state {
            ImageState::Ready(image) => Some(Arc::clone(image)),
            _ => None,
        }
    }

    fn resolve(&self, outcome: ImageState) {
        *self.state.lock() = outcome;
        self.resolved.notify_all();
    }
}

/// Handles by key. A handle that is still pending stays in `in_flight` even if the LRU evicts
/// it, so a key never has two decodes running at once.
struct Entries {
    cache: LruCache<String, Arc<PendingImage>>,
    in_flight: HashMap<String, Arc<PendingImage>>,
}

impl Entries {
    fn insert(&mut self, key: String, handle: Arc<PendingImage>) {
        if let Some((evicted, _)) = self.cache.put(key, handle) {
            log::debug!("evicted image {:?} from cache", evicted);
        }
    }
}

pub struct ImageLoader {
    source: Arc<dyn ImageSource>,
    entries: Arc<Mutex<Entries>>,
    pool: rayon::ThreadPool,
}

impl ImageLoader {
    pub fn new(source: impl ImageSource + 'static) -> Result<Self> {
        Self::with_capacity(source, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(source: impl ImageSource + 'static, capacity: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(IO_THREADS)
            .thread_name(|i| format!("papercut-io-{}", i))
            .build()?;
        Ok(ImageLoader {
            source: Arc::new(source),
            entries: Arc::new(Mutex::new(Entries {
                cache: LruCache::new(capacity),
                in_flight: HashMap::new(),
            })),
            pool,
        })
    }

    /// Returns the handle for `key`, starting a fetch and decode only if no usable handle exists.
    /// An unavailable handle is replaced, so failed loads can be retried.
    pub fn request(&self, key: &str) -> Arc<PendingImage> {
        let handle = {
            // Lookup and insertion happen under one lock: two racing requests can't both miss.
            let mut entries = self.entries.lock();
            let key = key.to_owned();
            if let Some(handle) = entries.cache.get(&key) {
                if !handle.is_unavailable() {
                    return Arc::clone(handle);
                }
                log::debug!("retrying unavailable image {:?}", key);
            } else if let Some(handle) = entries.in_flight.get(&key).cloned() {
                entries.insert(key, Arc::clone(&handle));
                return handle;
            }
            let handle = Arc::new(PendingImage::new(&key));
            entries.in_flight.insert(key.clone(), Arc::clone(&handle));
            entries.insert(key, Arc::clone(&handle));
            handle
        };

        let source = Arc::clone(&self.source);
        let entries = Arc::clone(&self.entries);
        let job = Arc::clone(&handle);
        self.pool.spawn(move || {
            let outcome = match load(source.as_ref(), job.key()) {
                Ok(image) => {
                    log::debug!(
                        "decoded {:?} ({}x{})",
                        job.key(),
                        image.width(),
                        image.height()
                    );
                    ImageState::Ready(Arc::new(image))
                }
                Err(err) => {
                    log::warn!("image unavailable: {}", err);
                    ImageState::Unavailable
                }
            };
            let mut entries = entries.lock();
            job.resolve(outcome);
            if entries
                .in_flight
                .get(job.key())
                .is_some_and(|h| Arc::ptr_eq(h, &job))
            {
                entries.in_flight.remove(job.key());
            }
        });
        handle
    }

    /// Number of cached handles, pending ones included.
    pub fn cached(&self) -> usize {
        self.entries.lock().cache.len()
    }

    /// Number of decodes still running.
    pub fn in_flight(&self) -> usize {
        self.entries.lock().in_flight.len()
    }
}

fn load(source: &dyn ImageSource, key: &str) -> Result<RgbaImage> {
    let bytes = source.fetch(key)?;
    let image = image::load_from_memory(&bytes).map_err(|source| PapercutError::Decode {
        key: key.to_owned(),
        source,
    })?;
    Ok(image.into_rgba8())
}
