//! The builder: cached, single-flight access to raw and compiled cards.
//!
//! Raw cards come from a [`Realm`]; compiled cards come from the
//! [`Compiler`], which reaches other cards back through the builder. Both
//! sit behind a [`CacheStore`]. A cache miss for a URL runs at most once at
//! a time: concurrent callers for the same URL wait on the first caller's
//! attempt and share its result. A failed attempt caches nothing.
//!
//! Every module defined while compiling is recorded against the card being
//! compiled. The builder undefines a card's modules when that card's compile
//! fails, when the card is evicted, and on [`Builder::cleanup`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use card_cache::{CacheError, CacheStore, DiskCache, DiskModuleRegistry, MemoryCache, ModuleRegistry};
use card_common::{CardUrl, ModuleRef, ModuleSource};
use card_compiler::{CompileError, CompileHost, CompiledCard, Compiler, CompilerOptions, RawCard};
use card_config::CardsConfig;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::BuilderError;
use crate::realm::{FsRealm, Realm, RealmSet};

/// Subdirectory of the cache directory holding compiled-card artifacts.
pub const COMPILED_SUBDIR: &str = "compiled";

type Slots<V> = Mutex<HashMap<CardUrl, Arc<OnceCell<Arc<V>>>>>;

/// Counters describing what the builder has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Fetches issued to the realm.
    pub raw_fetches: u64,
    /// Compiles started.
    pub compiles: u64,
    /// Compiled-card requests answered from the cache.
    pub compiled_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    raw_fetches: AtomicU64,
    compiles: AtomicU64,
    compiled_hits: AtomicU64,
}

/// Runs `init` unless another caller is already resolving `url`, in which
/// case the result of that caller is awaited instead.
async fn single_flight<V, F, Fut>(
    slots: &Slots<V>,
    url: &CardUrl,
    init: F,
) -> Result<Arc<V>, CompileError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<V>, CompileError>>,
{
    let slot = slots
        .lock()
        .entry(url.clone())
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone();
    let result = slot.get_or_try_init(init).await.cloned();

    let mut slots = slots.lock();
    if let Some(current) = slots.get(url) {
        // A failed slot stays while others still wait on it; one of them
        // retries.
        let settled = result.is_ok() || Arc::strong_count(&slot) == 2;
        if settled && Arc::ptr_eq(current, &slot) {
            slots.remove(url);
        }
    }
    result
}

/// Cached, single-flight access to raw and compiled cards.
pub struct Builder {
    realm: Arc<dyn Realm>,
    registry: Arc<dyn ModuleRegistry>,
    raw_cache: Arc<dyn CacheStore<RawCard>>,
    compiled_cache: Arc<dyn CacheStore<CompiledCard>>,
    compiler: Compiler,
    raw_inflight: Slots<RawCard>,
    compile_inflight: Slots<CompiledCard>,
    /// Modules this builder defined, by the card whose compile defined them.
    owned: Mutex<BTreeMap<CardUrl, BTreeSet<ModuleRef>>>,
    counters: Counters,
}

impl Builder {
    /// Creates a builder with in-memory caches.
    pub fn new(realm: Arc<dyn Realm>, registry: Arc<dyn ModuleRegistry>) -> Self {
        Self::with_caches(
            realm,
            registry,
            Arc::new(MemoryCache::<RawCard>::new()),
            Arc::new(MemoryCache::<CompiledCard>::new()),
        )
    }

    /// Creates a builder over the given caches.
    pub fn with_caches(
        realm: Arc<dyn Realm>,
        registry: Arc<dyn ModuleRegistry>,
        raw_cache: Arc<dyn CacheStore<RawCard>>,
        compiled_cache: Arc<dyn CacheStore<CompiledCard>>,
    ) -> Self {
        Self {
            realm,
            registry,
            raw_cache,
            compiled_cache,
            compiler: Compiler::default(),
            raw_inflight: Mutex::new(HashMap::new()),
            compile_inflight: Mutex::new(HashMap::new()),
            owned: Mutex::new(BTreeMap::new()),
            counters: Counters::default(),
        }
    }

    /// Replaces the compiler.
    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Creates a builder from project configuration.
    ///
    /// Realm and cache paths are resolved against `root`. The cache directory
    /// must already hold a valid manifest whose module prefix matches the
    /// configuration.
    pub fn from_config(config: &CardsConfig, root: &Path) -> Result<Self, BuilderError> {
        let cache_dir = root.join(&config.builder.cache_dir);
        let packaging = |source: CacheError| BuilderError::Packaging {
            path: cache_dir.clone(),
            source,
        };

        let registry = DiskModuleRegistry::open(&cache_dir).map_err(packaging)?;
        if registry.prefix() != config.builder.module_prefix {
            return Err(packaging(CacheError::InvalidPackaging {
                path: card_cache::CacheManifest::path(&cache_dir),
                reason: format!(
                    "module prefix `{}` does not match configured `{}`",
                    registry.prefix(),
                    config.builder.module_prefix
                ),
            }));
        }

        let mut realms = RealmSet::new();
        for (name, realm) in &config.realms {
            debug!(realm = %name, url = %realm.url, "registering realm");
            realms.push(Arc::new(FsRealm::new(realm.url.clone(), root.join(&realm.path))));
        }

        info!(cache_dir = %cache_dir.display(), realms = realms.len(), "builder ready");
        Ok(Self::with_caches(
            Arc::new(realms),
            Arc::new(registry),
            Arc::new(MemoryCache::<RawCard>::new()),
            Arc::new(DiskCache::<CompiledCard>::new(&cache_dir, COMPILED_SUBDIR)),
        )
        .with_compiler(Compiler::new(CompilerOptions {
            inline_threshold: config.builder.inline_threshold,
        })))
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> BuilderStats {
        BuilderStats {
            raw_fetches: self.counters.raw_fetches.load(Ordering::SeqCst),
            compiles: self.counters.compiles.load(Ordering::SeqCst),
            compiled_hits: self.counters.compiled_hits.load(Ordering::SeqCst),
        }
    }

    /// Returns every module currently owned by this builder.
    pub fn owned_modules(&self) -> Vec<ModuleRef> {
        self.owned.lock().values().flatten().cloned().collect()
    }

    // ===== Reads =====

    /// Returns the raw card for `url`, fetching it from the realm on a miss.
    ///
    /// Realm errors propagate unchanged and are never cached.
    pub async fn get_raw_card(&self, url: &CardUrl) -> Result<Arc<RawCard>, CompileError> {
        if let Some(hit) = self.raw_cache.get(url) {
            return Ok(hit);
        }
        single_flight(&self.raw_inflight, url, || async move {
            if let Some(hit) = self.raw_cache.get(url) {
                return Ok(hit);
            }
            self.counters.raw_fetches.fetch_add(1, Ordering::SeqCst);
            debug!(card = %url, "fetching raw card");
            let raw = Arc::new(self.realm.fetch_raw_card(url).await?);
            store(&*self.raw_cache, url, &raw);
            Ok::<_, CompileError>(raw)
        })
        .await
    }

    /// Returns the compiled card for `url`, compiling it on a miss.
    ///
    /// Concurrent calls for the same uncached URL share one compile and
    /// observe the same instance.
    pub async fn get_compiled_card(&self, url: &CardUrl) -> Result<Arc<CompiledCard>, CompileError> {
        if let Some(hit) = self.compiled_cache.get(url) {
            self.counters.compiled_hits.fetch_add(1, Ordering::SeqCst);
            return Ok(hit);
        }
        single_flight(&self.compile_inflight, url, || async move {
            if let Some(hit) = self.compiled_cache.get(url) {
                return Ok(hit);
            }
            let raw = self.get_raw_card(url).await?;
            self.counters.compiles.fetch_add(1, Ordering::SeqCst);
            match self.compiler.compile(self, &raw).await {
                Ok(card) => {
                    let card = Arc::new(card);
                    store(&*self.compiled_cache, url, &card);
                    Ok(card)
                }
                Err(e) => {
                    warn!(card = %url, error = %e, "compile failed");
                    self.release(url);
                    Err(e)
                }
            }
        })
        .await
    }

    // ===== Cache mutation =====

    /// Stores a raw card, replacing any cached one.
    pub fn set_raw_card(&self, url: &CardUrl, raw: RawCard) -> Result<(), BuilderError> {
        Ok(self.raw_cache.set(url, Arc::new(raw))?)
    }

    /// Replaces a cached raw card. Returns the previous one, or `None` if
    /// nothing was cached (in which case nothing is stored).
    pub fn update_raw_card(
        &self,
        url: &CardUrl,
        raw: RawCard,
    ) -> Result<Option<Arc<RawCard>>, BuilderError> {
        Ok(self.raw_cache.update(url, Arc::new(raw))?)
    }

    /// Removes a cached raw card.
    pub fn delete_raw_card(&self, url: &CardUrl) -> Result<Option<Arc<RawCard>>, BuilderError> {
        Ok(self.raw_cache.delete(url)?)
    }

    /// Stores a compiled card, replacing any cached one. Modules of the
    /// replaced card that the new one does not reuse are undefined.
    pub fn set_compiled_card(&self, url: &CardUrl, card: CompiledCard) -> Result<(), BuilderError> {
        let card = Arc::new(card);
        let previous = self.compiled_cache.get(url);
        self.compiled_cache.set(url, card.clone())?;
        if let Some(previous) = previous {
            self.evict(url, &previous, &card.modules)?;
        }
        Ok(())
    }

    /// Replaces a cached compiled card and returns the previous one. Modules
    /// of the previous card that the new one does not reuse are undefined.
    /// Nothing is stored when `url` is not cached.
    pub fn update_compiled_card(
        &self,
        url: &CardUrl,
        card: CompiledCard,
    ) -> Result<Option<Arc<CompiledCard>>, BuilderError> {
        let card = Arc::new(card);
        let previous = self.compiled_cache.update(url, card.clone())?;
        if let Some(previous) = &previous {
            self.evict(url, previous, &card.modules)?;
        }
        Ok(previous)
    }

    /// Removes a cached compiled card and undefines its modules.
    pub fn delete_compiled_card(
        &self,
        url: &CardUrl,
    ) -> Result<Option<Arc<CompiledCard>>, BuilderError> {
        let previous = self.compiled_cache.delete(url)?;
        if let Some(previous) = &previous {
            self.evict(url, previous, &[])?;
        }
        Ok(previous)
    }

    /// Drops both the raw and the compiled entry of `url`.
    ///
    /// Cards that adopt from or contain `url` keep their cached compiled
    /// form; invalidating them is up to the caller.
    pub fn invalidate(&self, url: &CardUrl) -> Result<(), BuilderError> {
        self.delete_raw_card(url)?;
        self.delete_compiled_card(url)?;
        info!(card = %url, "invalidated card");
        Ok(())
    }

    // ===== Module ownership =====

    /// Undefines every module this builder defined and drops the compiled
    /// cards that referenced them. Calling it again does nothing.
    ///
    /// Every module is attempted even if some fail; the first failure is
    /// returned.
    pub fn cleanup(&self) -> Result<(), BuilderError> {
        let owned = std::mem::take(&mut *self.owned.lock());
        let mut first_error = None;
        let mut released = 0usize;

        for (url, modules) in owned {
            for module in modules {
                match self.registry.undefine(&module) {
                    Ok(()) => released += 1,
                    Err(e) => {
                        warn!(module = %module, error = %e, "failed to undefine module");
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Err(e) = self.compiled_cache.delete(&url) {
                first_error.get_or_insert(e);
            }
        }

        info!(modules = released, "builder cleaned up");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Undefines the owned modules of an evicted card, except those in `keep`.
    fn evict(
        &self,
        url: &CardUrl,
        previous: &CompiledCard,
        keep: &[ModuleRef],
    ) -> Result<(), CacheError> {
        let doomed: Vec<ModuleRef> = {
            let mut owned = self.owned.lock();
            let Some(modules) = owned.get_mut(url) else {
                return Ok(());
            };
            let doomed = previous
                .modules
                .iter()
                .filter(|m| !keep.contains(m) && modules.remove(*m))
                .cloned()
                .collect();
            if modules.is_empty() {
                owned.remove(url);
            }
            doomed
        };
        for module in &doomed {
            self.registry.undefine(module)?;
        }
        debug!(card = %url, undefined = doomed.len(), "evicted compiled card");
        Ok(())
    }

    /// Undefines everything a card's failed compile defined.
    fn release(&self, url: &CardUrl) {
        let Some(modules) = self.owned.lock().remove(url) else {
            return;
        };
        for module in modules {
            if let Err(e) = self.registry.undefine(&module) {
                warn!(module = %module, error = %e, "failed to undefine module");
            }
        }
    }
}

/// Caches a freshly produced value. A failed write only costs a later miss.
fn store<V>(cache: &dyn CacheStore<V>, url: &CardUrl, value: &Arc<V>) {
    if let Err(e) = cache.set(url, value.clone()) {
        warn!(card = %url, error = %e, "failed to cache card");
    }
}

#[async_trait]
impl CompileHost for Builder {
    async fn raw_card(&self, url: &CardUrl) -> Result<Arc<RawCard>, CompileError> {
        self.get_raw_card(url).await
    }

    async fn compiled_card(&self, url: &CardUrl) -> Result<Arc<CompiledCard>, CompileError> {
        self.get_compiled_card(url).await
    }

    fn is_compiled(&self, url: &CardUrl) -> bool {
        self.compiled_cache.get(url).is_some()
    }

    fn define(&self, module: ModuleSource) -> Result<ModuleRef, CompileError> {
        let id = self.registry.define(&module)?;
        self.owned
            .lock()
            .entry(module.card_url)
            .or_default()
            .insert(id.clone());
        Ok(id)
    }
}
