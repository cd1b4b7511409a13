//! Latency probing of indirection alternatives.
//!
//! Probes run sequentially within one call; calls for different tags may
//! run concurrently with each other and with ongoing resolutions. A probe
//! failure is never fatal, it just scores worst latency.

use std::time::Instant;

use rand::Rng;
use tracing::{debug, info};

use crate::resolver::Resolver;
use crate::store::{Alternative, Resolution, TestSpec};

/// Worst latency score: probe failed or response did not satisfy the test.
const UNREACHABLE: u64 = u64::MAX;

impl Resolver {
    /// Probe every alternative of `tag` and rewrite the stored order so the
    /// fastest leads. Returns whether at least one alternative existed.
    ///
    /// Latency rounds down to the nearest 100 ms plus 0–99 ms of jitter, so
    /// repeated runs do not pathologically favor one of several mirrors
    /// that are statistically tied.
    pub async fn probe_and_reorder(&self, tag: &str, suffix: Option<&str>) -> bool {
        let Some(entry) = self.dictionary().get(tag) else {
            return false;
        };
        let Resolution::Indirection(alts) = &entry.resolution else {
            return false;
        };
        if alts.is_empty() {
            return false;
        }

        let mut best: Option<(usize, u64)> = None;
        for (i, alt) in alts.iter().enumerate() {
            let latency = self.probe_alternative(alt, entry.test.as_ref(), suffix).await;
            debug!(tag, mirror = %alt.tag, latency, "mirror probed");
            if best.map_or(true, |(_, b)| latency < b) {
                best = Some((i, latency));
            }
        }

        if let Some((winner, latency)) = best {
            if winner > 0
                && latency != UNREACHABLE
                && self.dictionary().promote(tag, &alts[winner].tag)
            {
                info!(tag, mirror = %alts[winner].tag, latency_ms = latency, "fastest mirror promoted");
            }
        }
        true
    }

    async fn probe_alternative(
        &self,
        alt: &Alternative,
        record_test: Option<&TestSpec>,
        suffix: Option<&str>,
    ) -> u64 {
        // TestSpec priority: inline with the alternative, then the
        // alternative's own record, then the indirection record.
        let entry_test = self.dictionary().get(&alt.tag).and_then(|e| e.test);
        let spec = alt.test.as_ref().or(entry_test.as_ref()).or(record_test);
        let (params, encoded) = spec
            .map(|s| (s.params.as_str(), s.encoded))
            .unwrap_or(("", false));

        let target = match self.resolve_quiet(&alt.tag, params, encoded).await {
            Ok(t) => t,
            Err(e) => {
                debug!(mirror = %alt.tag, error = %e, "probe target did not resolve");
                return UNREACHABLE;
            }
        };
        let url = match suffix {
            Some(s) => format!("{target}{s}"),
            None => target,
        };

        let started = Instant::now();
        let body = match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(mirror = %alt.tag, error = %e, "probe response unreadable");
                    return UNREACHABLE;
                }
            },
            Err(e) => {
                debug!(mirror = %alt.tag, error = %e, "probe request failed");
                return UNREACHABLE;
            }
        };

        if let Some(pattern) = spec.and_then(|s| s.pattern.as_ref()) {
            if !pattern.matches(&body) {
                debug!(mirror = %alt.tag, "probe response did not match test pattern");
                return UNREACHABLE;
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        elapsed / 100 * 100 + rand::rng().random_range(0..100)
    }
}
