use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::unbounded;
use tracing::{debug, info};

use crate::fetch::Fetch;
use crate::resource::{Decode, ImageResource, Resource, ResourceLoadError, TextResource};

/// Registry of every resource requested by path. Text and images live in separate
/// namespaces, so the same path may be requested as both.
pub struct ResourceLoader {
    fetcher: Arc<dyn Fetch>,
    text: Mutex<HashMap<String, Arc<TextResource>>>,
    images: Mutex<HashMap<String, Arc<ImageResource>>>,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            text: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
        }
    }

    pub fn text_resource(&self, path: &str) -> Arc<TextResource> {
        lookup(&self.text, path)
    }

    pub fn image_resource(&self, path: &str) -> Arc<ImageResource> {
        lookup(&self.images, path)
    }

    /// Where resources are fetched from.
    pub fn describe(&self) -> String {
        self.fetcher.describe()
    }

    /// Number of distinct resources requested so far, across both categories.
    pub fn registered(&self) -> usize {
        lock(&self.text).len() + lock(&self.images).len()
    }

    /// Requests a text resource and waits for it.
    pub fn load_text(&self, path: &str) -> Result<Arc<String>, ResourceLoadError> {
        self.load(&self.text_resource(path))
    }

    pub fn load_image(&self, path: &str) -> Result<Arc<image::RgbaImage>, ResourceLoadError> {
        self.load(&self.image_resource(path))
    }

    pub fn load<T: Decode>(
        &self,
        resource: &Arc<Resource<T>>,
    ) -> Result<Arc<T>, ResourceLoadError> {
        resource.issue(Arc::clone(&self.fetcher));
        resource.wait()
    }

    /// Issues every registered resource at once, then waits for all of them.
    /// Returns as soon as any of them fails, without waiting for the rest.
    pub fn load_all(&self) -> Result<(), ResourceLoadError> {
        let text: Vec<_> = lock(&self.text).values().cloned().collect();
        let images: Vec<_> = lock(&self.images).values().cloned().collect();
        let total = text.len() + images.len();

        let (sender, receiver) = unbounded();
        let mut issued = 0;
        for resource in &text {
            issued += usize::from(resource.issue(Arc::clone(&self.fetcher)));
            resource.subscribe(sender.clone());
        }
        for resource in &images {
            issued += usize::from(resource.issue(Arc::clone(&self.fetcher)));
            resource.subscribe(sender.clone());
        }
        drop(sender);
        debug!(issued, total, base = %self.fetcher.describe(), "waiting for resources");

        for _ in 0..total {
            let (path, outcome) = receiver.recv().map_err(|_| {
                ResourceLoadError::new("<loader>", "resource workers exited without reporting")
            })?;
            outcome?;
            debug!(%path, "resource settled");
        }
        info!(
            text = text.len(),
            images = images.len(),
            "all resources loaded"
        );
        Ok(())
    }
}

fn lookup<T>(map: &Mutex<HashMap<String, Arc<Resource<T>>>>, path: &str) -> Arc<Resource<T>> {
    Arc::clone(
        lock(map)
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Resource::new(path))),
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
