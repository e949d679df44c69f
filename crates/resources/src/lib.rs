//! Asynchronous, de-duplicating loader for the text and image assets the
//! post-processing passes need before they can be built.
//!
//! Types:
//!
//! - `ResourceLoader` hands out one shared descriptor per path and category and
//!   issues every pending fetch at once via `load_all`.
//! - `Resource<T>` tracks `Loading | Loaded | Failed` and shares the decoded payload
//!   read-only once it arrives; `TextResource` and `ImageResource` are its two uses.
//! - `Fetch` abstracts where bytes come from (`FsFetcher`, `HttpFetcher`).
//!
//! A fetch runs exactly once per descriptor. Every caller that waits on it, now or
//! later, observes the same `Arc` payload or the same `ResourceLoadError`.

mod fetch;
mod loader;
mod resource;

pub use fetch::{fetcher_for_base, Fetch, FsFetcher, HttpFetcher};
pub use loader::ResourceLoader;
pub use resource::{Decode, ImageResource, LoadState, Resource, ResourceLoadError, TextResource};
