use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::fetch::Fetch;

/// Failure observed by every awaiter of a resource that could not be fetched or
/// decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load resource '{path}': {reason}")]
pub struct ResourceLoadError {
    pub path: String,
    pub reason: String,
}

impl ResourceLoadError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Turns fetched bytes into the payload a resource exposes.
pub trait Decode: Sized + Send + Sync + 'static {
    const KIND: &'static str;

    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

impl Decode for String {
    const KIND: &'static str = "text";

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        String::from_utf8(bytes).context("resource is not valid UTF-8")
    }
}

impl Decode for RgbaImage {
    const KIND: &'static str = "image";

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        let image = image::load_from_memory(&bytes).context("failed to decode image")?;
        Ok(image.to_rgba8())
    }
}

pub type TextResource = Resource<String>;
pub type ImageResource = Resource<RgbaImage>;

/// Outcome sent to subscribers once a resource settles.
pub(crate) type Settled = (String, Result<(), ResourceLoadError>);

enum Slot<T> {
    Idle,
    Loading(Vec<Sender<Settled>>),
    Loaded(Arc<T>),
    Failed(ResourceLoadError),
}

/// A single asset, shared by every pass that asked for its path.
pub struct Resource<T> {
    path: String,
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Resource<T> {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            slot: Mutex::new(Slot::Idle),
            settled: Condvar::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// A resource that has not been issued yet reports `Loading`, matching the
    /// state it will be in once the loader picks it up.
    pub fn state(&self) -> LoadState {
        match &*self.lock() {
            Slot::Idle | Slot::Loading(_) => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
            Slot::Failed(_) => LoadState::Failed,
        }
    }

    /// Returns the payload without blocking; errors if it has not been loaded.
    pub fn data(&self) -> Result<Arc<T>, ResourceLoadError> {
        match &*self.lock() {
            Slot::Loaded(data) => Ok(Arc::clone(data)),
            Slot::Failed(err) => Err(err.clone()),
            Slot::Idle | Slot::Loading(_) => Err(ResourceLoadError::new(
                self.path.clone(),
                "resource has not finished loading",
            )),
        }
    }

    /// Blocks until the fetch settles. Must only be called after the resource was
    /// issued, otherwise it reports a failure instead of waiting forever.
    pub fn wait(&self) -> Result<Arc<T>, ResourceLoadError> {
        let mut slot = self.lock();
        loop {
            match &*slot {
                Slot::Loaded(data) => return Ok(Arc::clone(data)),
                Slot::Failed(err) => return Err(err.clone()),
                Slot::Idle => {
                    return Err(ResourceLoadError::new(
                        self.path.clone(),
                        "resource was never issued to the loader",
                    ))
                }
                Slot::Loading(_) => {
                    slot = self
                        .settled
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the outcome to `sender` once the resource settles, or right away
    /// when it already has.
    pub(crate) fn subscribe(&self, sender: Sender<Settled>) {
        let outcome = match &mut *self.lock() {
            Slot::Loading(subscribers) => {
                subscribers.push(sender);
                return;
            }
            Slot::Loaded(_) => Ok(()),
            Slot::Failed(err) => Err(err.clone()),
            Slot::Idle => Err(ResourceLoadError::new(
                self.path.clone(),
                "resource was never issued to the loader",
            )),
        };
        // the receiver may already have returned on another failure
        let _ = sender.send((self.path.clone(), outcome));
    }

    fn settle(&self, outcome: Slot<T>) {
        let notice = match &outcome {
            Slot::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        };
        let previous = std::mem::replace(&mut *self.lock(), outcome);
        self.settled.notify_all();
        if let Slot::Loading(subscribers) = previous {
            for subscriber in subscribers {
                let _ = subscriber.send((self.path.clone(), notice.clone()));
            }
        }
    }
}

impl<T: Decode> Resource<T> {
    /// Issues the fetch on a worker thread unless it was already issued. Returns
    /// whether this call started it.
    pub(crate) fn issue(self: &Arc<Self>, fetcher: Arc<dyn Fetch>) -> bool {
        {
            let mut slot = self.lock();
            if !matches!(*slot, Slot::Idle) {
                return false;
            }
            *slot = Slot::Loading(Vec::new());
        }

        debug!(path = %self.path, kind = T::KIND, "issuing resource fetch");
        let resource = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("resource:{}", self.path))
            .spawn(move || {
                let fetched = panic::catch_unwind(AssertUnwindSafe(|| {
                    fetcher.fetch(&resource.path).and_then(T::decode)
                }));
                let outcome = match fetched {
                    Ok(result) => result.map_err(|err| {
                        ResourceLoadError::new(resource.path.clone(), format!("{err:#}"))
                    }),
                    Err(payload) => Err(ResourceLoadError::new(
                        resource.path.clone(),
                        format!("loader panicked: {}", panic_message(&*payload)),
                    )),
                };
                match outcome {
                    Ok(data) => {
                        debug!(path = %resource.path, kind = T::KIND, "resource loaded");
                        resource.settle(Slot::Loaded(Arc::new(data)));
                    }
                    Err(err) => {
                        warn!(path = %resource.path, error = %err, "resource failed to load");
                        resource.settle(Slot::Failed(err));
                    }
                }
            });

        if let Err(err) = spawned {
            self.settle(Slot::Failed(ResourceLoadError::new(
                self.path.clone(),
                format!("failed to spawn loader thread: {err}"),
            )));
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
