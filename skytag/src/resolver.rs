//! The resolution engine: dictionary lookup, indirection walking, template
//! expansion, remote fallback, and usage logging.

use std::collections::HashSet;
use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{LoadError, ResolveError};
use crate::fetch::RemoteFetcher;
use crate::logger::UsageLogger;
use crate::profile::ProfileGate;
use crate::record::{LoadContext, LoadStats, RecordObserver};
use crate::store::{Dictionary, Entry, Resolution};
use crate::template::{expand, split_params, SubstMode};

/// Bound on indirection hops within one resolution.
const MAX_INDIRECTION_HOPS: usize = 16;
/// Bound on recursive template/fetch resolution depth.
const MAX_RECURSION_DEPTH: u8 = 6;

/// Per-resolution state threaded through recursive calls: remaining depth,
/// tags already walked (cycle detection), and the tag the caller asked for
/// (diagnostics).
struct ResolveCtx {
    depth: u8,
    visited: HashSet<String>,
    origin: String,
}

impl ResolveCtx {
    fn new(origin: &str) -> Self {
        Self {
            depth: MAX_RECURSION_DEPTH,
            visited: HashSet::new(),
            origin: origin.to_string(),
        }
    }
}

/// The tag resolution engine. Constructed once at startup and shared by
/// handle; all consumers resolve through it.
///
/// Construct on a Tokio runtime: the usage logger spawns its worker task
/// at build time when a log site is configured.
pub struct Resolver {
    dict: Dictionary,
    gate: ProfileGate,
    expected_domain: Option<String>,
    network: bool,
    fetcher: Option<RemoteFetcher>,
    logger: UsageLogger,
    observers: Vec<Arc<dyn RecordObserver>>,
    baseline: Option<PathBuf>,
    overrides: Vec<PathBuf>,
    pub(crate) client: reqwest::Client,
    pub(crate) probe_timeout: Duration,
}

impl Resolver {
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let fetcher = config
            .remote_site
            .clone()
            .map(|site| RemoteFetcher::new(client.clone(), site, config.fetch_timeout));
        let logger = UsageLogger::new(client.clone(), config.log_site.clone(), config.log_queue);

        Ok(Self {
            dict: Dictionary::new(),
            gate: ProfileGate::new(config.version, config.flags.clone()),
            expected_domain: config.expected_domain.clone(),
            network: config.network,
            fetcher,
            logger,
            observers: Vec::new(),
            baseline: config.baseline.clone(),
            overrides: config.overrides.clone(),
            client,
            probe_timeout: config.probe_timeout,
        })
    }

    /// Register a consumer of committed records. Call before loading.
    pub fn register_observer(&mut self, observer: Arc<dyn RecordObserver>) {
        self.observers.push(observer);
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn logger(&self) -> &UsageLogger {
        &self.logger
    }

    /// Feed one record stream into the dictionary.
    pub fn load_reader<R: BufRead>(&self, reader: R, overwrite: bool) -> Result<LoadStats, LoadError> {
        let ctx = LoadContext {
            dict: &self.dict,
            gate: &self.gate,
            expected_domain: self.expected_domain.as_deref(),
            observers: &self.observers,
            overwrite,
        };
        ctx.load(reader)
    }

    pub fn load_file(&self, path: &Path, overwrite: bool) -> Result<LoadStats, LoadError> {
        let file = std::fs::File::open(path)?;
        self.load_reader(std::io::BufReader::new(file), overwrite)
    }

    /// Load the configured sources in lifecycle order: baseline, overrides,
    /// then the remote catalog merged without overwrite. A catalog fetch
    /// failure is non-fatal (catch-up only); file errors propagate.
    pub async fn load_sources(&self) -> Result<LoadStats, LoadError> {
        let mut stats = LoadStats::default();
        if let Some(path) = &self.baseline {
            stats += self.load_file(path, true)?;
        }
        for path in &self.overrides {
            stats += self.load_file(path, true)?;
        }
        if self.network {
            if let Some(fetcher) = &self.fetcher {
                match fetcher.fetch_catalog().await {
                    Ok(body) => match self.load_reader(Cursor::new(body), false) {
                        Ok(s) => stats += s,
                        Err(e) => warn!(error = %e, "remote catalog parse failed"),
                    },
                    Err(e) => warn!(error = %e, "remote catalog fetch failed"),
                }
            }
        }
        info!(
            entries = self.dict.len(),
            records = stats.records,
            committed = stats.committed,
            "dictionary loaded"
        );
        Ok(stats)
    }

    /// Discard the dictionary and rebuild it from the configured sources.
    pub async fn reload(&self) -> Result<LoadStats, LoadError> {
        self.dict.clear();
        self.load_sources().await
    }

    /// Resolve `tag` against `params` (whitespace-separated, double quotes
    /// group) into a final URL or command string.
    pub async fn resolve(
        &self,
        tag: &str,
        params: &str,
        already_encoded: bool,
    ) -> Result<String, ResolveError> {
        self.resolve_entrypoint(tag, params, already_encoded, 1, true).await
    }

    /// Resolve through an explicit indirection alternative (1-based).
    pub async fn resolve_mirror(
        &self,
        tag: &str,
        params: &str,
        already_encoded: bool,
        mirror_index: usize,
    ) -> Result<String, ResolveError> {
        self.resolve_entrypoint(tag, params, already_encoded, mirror_index, true)
            .await
    }

    /// Resolution without a usage-log event (mirror probing).
    pub(crate) async fn resolve_quiet(
        &self,
        tag: &str,
        params: &str,
        already_encoded: bool,
    ) -> Result<String, ResolveError> {
        self.resolve_entrypoint(tag, params, already_encoded, 1, false).await
    }

    async fn resolve_entrypoint(
        &self,
        tag: &str,
        params: &str,
        already_encoded: bool,
        mirror_index: usize,
        log: bool,
    ) -> Result<String, ResolveError> {
        let mut ctx = ResolveCtx::new(tag);
        let result = self
            .resolve_ctx(tag, params, already_encoded, mirror_index, &mut ctx)
            .await;
        match &result {
            Ok(resolved) => debug!(tag, resolved = %resolved, "tag resolved"),
            Err(e) if e.is_authoring_defect() => warn!(tag, error = %e, "resolution failed"),
            Err(e) => debug!(tag, error = %e, "resolution failed"),
        }
        // Successful or attempted, the event is notified either way.
        if log {
            self.logger.log(tag, params);
        }
        result
    }

    fn resolve_ctx<'a>(
        &'a self,
        tag: &'a str,
        params: &'a str,
        already_encoded: bool,
        mirror_index: usize,
        ctx: &'a mut ResolveCtx,
    ) -> BoxFuture<'a, Result<String, ResolveError>> {
        Box::pin(async move {
            if ctx.depth == 0 {
                warn!(tag, origin = %ctx.origin, "resolution recursion exhausted");
                return Err(ResolveError::CycleExhausted(tag.to_string()));
            }

            let mut entry = self
                .lookup_or_fetch(tag)
                .await
                .ok_or_else(|| ResolveError::NotFound(tag.to_string()))?;

            let mut current = tag.to_string();
            let mut index = mirror_index;
            let mut hops = 0;
            while let Resolution::Indirection(alts) = &entry.resolution {
                hops += 1;
                if hops > MAX_INDIRECTION_HOPS {
                    warn!(tag, origin = %ctx.origin, "indirection bound exceeded");
                    return Err(ResolveError::CycleExhausted(current));
                }
                let alt = index
                    .checked_sub(1)
                    .and_then(|i| alts.get(i))
                    .ok_or(ResolveError::NoSuchMirror {
                        tag: current.clone(),
                        index,
                    })?;
                let next = alt.tag.clone();
                if !ctx.visited.insert(next.clone()) {
                    warn!(tag = %next, origin = %ctx.origin, "indirection cycle detected");
                    return Err(ResolveError::CycleExhausted(next));
                }
                // The explicit mirror index applies to the first hop only.
                index = 1;
                entry = self
                    .lookup_or_fetch(&next)
                    .await
                    .ok_or_else(|| ResolveError::NotFound(next.clone()))?;
                current = next;
            }

            let Resolution::Template(template) = &entry.resolution else {
                unreachable!("indirection loop only exits on a template");
            };
            let mode = if already_encoded {
                SubstMode::Encoded
            } else {
                SubstMode::Url
            };
            let expanded = expand(template, &split_params(params), mode);

            // At most one embedded resolvable reference per result.
            if let Some(embed) = find_embedded(&expanded) {
                ctx.depth -= 1;
                let inner = self
                    .resolve_ctx(
                        &embed.tag,
                        &embed.params,
                        embed.encoded || already_encoded,
                        1,
                        ctx,
                    )
                    .await?;
                let mut spliced = String::with_capacity(expanded.len() + inner.len());
                spliced.push_str(&expanded[..embed.start]);
                spliced.push_str(&inner);
                spliced.push_str(&expanded[embed.end..]);
                return Ok(spliced);
            }
            Ok(expanded)
        })
    }

    /// Local lookup with the one-shot remote fetch fallback on a miss.
    async fn lookup_or_fetch(&self, tag: &str) -> Option<Entry> {
        if let Some(entry) = self.dict.get(tag) {
            return Some(entry);
        }
        if !self.network {
            debug!(tag, "network disabled, unknown tag stays unresolved");
            return None;
        }
        let fetcher = self.fetcher.as_ref()?;
        match fetcher.fetch_record(tag).await {
            Ok(body) => match self.load_reader(Cursor::new(body), true) {
                Ok(stats) => debug!(tag, committed = stats.committed, "remote record merged"),
                Err(e) => warn!(tag, error = %e, "remote record parse failed"),
            },
            Err(e) => debug!(tag, error = %e, "remote record fetch failed"),
        }
        self.dict.get(tag)
    }
}

struct Embedded {
    start: usize,
    end: usize,
    tag: String,
    params: String,
    encoded: bool,
}

/// Locate the first `<&tag[,opts] params>` marker.
fn find_embedded(s: &str) -> Option<Embedded> {
    let start = s.find("<&")?;
    let close = s[start..].find('>')? + start;
    let inner = &s[start + 2..close];
    let (head, params) = match inner.find(char::is_whitespace) {
        Some(pos) => (&inner[..pos], inner[pos..].trim()),
        None => (inner, ""),
    };
    let (tag, opts) = match head.split_once(',') {
        Some((t, o)) => (t, o),
        None => (head, ""),
    };
    if tag.is_empty() {
        return None;
    }
    Some(Embedded {
        start,
        end: close + 1,
        tag: tag.to_string(),
        params: params.to_string(),
        encoded: opts.contains('n'),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_marker_parses() {
        let e = find_embedded("http://host/doc?u=<&Inner,n M 31>&x=1").unwrap();
        assert_eq!(e.tag, "Inner");
        assert_eq!(e.params, "M 31");
        assert!(e.encoded);
        assert_eq!(&"http://host/doc?u=<&Inner,n M 31>&x=1"[e.start..e.end], "<&Inner,n M 31>");

        let e = find_embedded("<&Plain>").unwrap();
        assert_eq!(e.tag, "Plain");
        assert_eq!(e.params, "");
        assert!(!e.encoded);

        assert!(find_embedded("no marker here").is_none());
        assert!(find_embedded("<& >").is_none());
    }
}
