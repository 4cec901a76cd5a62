//! `transform(source_key, directive)`: the entry point a serving layer calls.
//!
//! Ties the pieces together: parse and validate the directive, fetch the
//! source from the [`BlobStore`], then run the pipeline through the render
//! cache. The service holds no per-request state; one instance can serve
//! any number of threads.

use crate::cache::{self, CacheStats, RenderCache};
use crate::config::ServiceConfig;
use crate::directive;
use crate::imaging::{ImageBackend, Quality, RustBackend};
use crate::pipeline::{self, PipelineError, Rendered, Request};
use crate::store::{BlobStore, FsStore, StoreError};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Cache unavailable: {0}")]
    Cache(#[from] std::io::Error),
}

pub struct ImageService<S, B> {
    store: S,
    backend: B,
    cache: Option<RenderCache>,
    default_quality: Quality,
}

impl ImageService<FsStore, RustBackend> {
    /// Filesystem store, `image` backend and (unless disabled) a render cache,
    /// all as configured.
    pub fn from_config(config: &ServiceConfig, use_cache: bool) -> Result<Self, ServiceError> {
        let quality = config.default_quality();
        let service = Self::new(
            FsStore::new(&config.source_root),
            RustBackend::with_default_quality(quality),
            quality,
        );
        if use_cache && config.cache.enabled {
            Ok(service.with_cache(RenderCache::open(&config.cache_dir)?))
        } else {
            Ok(service)
        }
    }
}

impl<S: BlobStore, B: ImageBackend> ImageService<S, B> {
    /// Service without a render cache.
    pub fn new(store: S, backend: B, default_quality: Quality) -> Self {
        Self {
            store,
            backend,
            cache: None,
            default_quality,
        }
    }

    /// Attach a render cache.
    pub fn with_cache(mut self, cache: RenderCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(RenderCache::stats)
    }

    /// Render `directive` against the asset at `source_key`.
    ///
    /// An empty or unrecognised directive returns the source bytes unchanged.
    /// Unsupported interfaces and modes fail before the source is fetched.
    pub fn transform(&self, source_key: &str, directive: &str) -> Result<Rendered, ServiceError> {
        let parsed = directive::parse(directive);
        let request = Request::from_directive(parsed.as_ref())?;
        let bytes = self.store.fetch(source_key)?;

        if request == Request::Passthrough {
            debug!("{source_key}: no directive, passing through");
            return Ok(pipeline::run(&self.backend, source_key, &bytes, &request)?);
        }

        let render = || pipeline::run(&self.backend, source_key, &bytes, &request);
        let rendered = match &self.cache {
            Some(cache) => {
                // The key suffix picks the output format when no override is
                // given, so it is part of the render identity.
                let identity = format!("{}\0{source_key}", cache::hash_bytes(&bytes));
                let key = cache::render_key(&identity, directive, self.default_quality.value());
                cache.get_or_render(&key, render)?
            }
            None => render()?,
        };
        Ok(rendered)
    }
}
