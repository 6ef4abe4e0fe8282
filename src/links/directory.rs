//! Cache-aside access to links.
//!
//! Reads go to the popularity cache first and fall back to the link store.
//! Cache bookkeeping (admission on create, usage counting on a store hit)
//! runs on detached tasks and only ever logs its failures.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, warn};

use crate::cache::PopularityCache;
use crate::error::{ShortenerError, ShortenerResult};
use crate::links::{CodeGenerator, RandomCodeGenerator};
use crate::models::{Link, NewLink};
use crate::storage::LinkStore;

pub struct LinkDirectory {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn PopularityCache>,
    generator: Arc<dyn CodeGenerator>,
    code_length: usize,
    max_generation_attempts: Option<u32>,
}

impl LinkDirectory {
    pub fn new(
        store: Arc<dyn LinkStore>,
        cache: Arc<dyn PopularityCache>,
        code_length: usize,
    ) -> Self {
        Self {
            store,
            cache,
            generator: Arc::new(RandomCodeGenerator),
            code_length,
            max_generation_attempts: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Cap the number of candidates drawn per create; `None` retries forever
    pub fn with_max_generation_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_generation_attempts = attempts;
        self
    }

    /// Persist a new link, generating a free short code when none was given.
    ///
    /// An explicit code that is already taken fails with
    /// [`ShortenerError::AlreadyExists`]; it is never replaced by a generated one.
    pub async fn create(&self, mut link: NewLink) -> ShortenerResult<Link> {
        if link.source_url.trim().is_empty() {
            return Err(ShortenerError::Validation(
                "source_url must not be empty".to_string(),
            ));
        }

        if link.short_code.is_empty() {
            link.short_code = self.generate_unique_code().await?;
        }

        let created = self.store.create(&link).await?;

        if self.cache.min_uses_before_caching() < 1 {
            let cache = Arc::clone(&self.cache);
            let cached = created.clone();
            tokio::spawn(async move {
                if let Err(err) = cache.save(&cached).await {
                    error!(short_code = %cached.short_code, error = %err, "failed to cache created link");
                }
            });
        }

        Ok(created)
    }

    /// Resolve a short code, preferring the cache
    pub async fn resolve(&self, short_code: &str) -> ShortenerResult<Link> {
        match self.cache.get(short_code).await {
            Ok(Some(link)) => return Ok(link),
            Ok(None) => {}
            Err(err) => {
                warn!(short_code = %short_code, error = %err, "cache lookup failed, reading from store");
            }
        }

        let link = self
            .store
            .get(short_code)
            .await
            .with_context(|| format!("failed to load link '{short_code}'"))
            .map_err(ShortenerError::StoreUnavailable)?
            .ok_or(ShortenerError::NotFound)?;

        let cache = Arc::clone(&self.cache);
        let promoted = link.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.increment_usage(&promoted, 1).await {
                error!(short_code = %promoted.short_code, error = %err, "failed to update link popularity");
            }
        });

        Ok(link)
    }

    /// Check the store (never the cache) for a short code
    pub async fn exists(&self, short_code: &str) -> ShortenerResult<bool> {
        self.store
            .exists(short_code)
            .await
            .with_context(|| format!("failed to check link '{short_code}'"))
            .map_err(ShortenerError::StoreUnavailable)
    }

    /// Every stored link, newest first
    pub async fn list(&self) -> ShortenerResult<Vec<Link>> {
        self.store
            .get_all()
            .await
            .context("failed to list links")
            .map_err(ShortenerError::StoreUnavailable)
    }

    async fn generate_unique_code(&self) -> ShortenerResult<String> {
        let mut attempts = 0u32;
        loop {
            if let Some(max) = self.max_generation_attempts {
                if attempts >= max {
                    return Err(ShortenerError::GenerationExhausted { attempts });
                }
            }
            attempts += 1;

            let candidate = self.generator.generate(self.code_length);
            match self.exists(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => debug!(candidate = %candidate, attempts, "generated short code is taken"),
                Err(err) => {
                    error!(candidate = %candidate, error = %err, "failed to check generated short code")
                }
            }
        }
    }
}
