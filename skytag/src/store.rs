//! Dictionary store: the in-memory tag to resolution map.

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::record::CandidateRecord;

/// Pattern a probe response must satisfy.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Body must contain this substring.
    Literal(String),
    /// Body must match this expression (`/…/` in record syntax).
    Regex(regex::Regex),
}

impl Pattern {
    pub fn matches(&self, body: &str) -> bool {
        match self {
            Pattern::Literal(needle) => body.contains(needle),
            Pattern::Regex(re) => re.is_match(body),
        }
    }
}

/// Probe descriptor attached to an alternative or to a whole record.
#[derive(Debug, Clone, Default)]
pub struct TestSpec {
    /// Pattern to require in the probe response; `None` means any readable
    /// response counts as a latency measurement.
    pub pattern: Option<Pattern>,
    /// Parameters to substitute when resolving the probe target.
    pub params: String,
    /// Whether `params` is already URL-encoded.
    pub encoded: bool,
}

/// One alternative of an indirection list.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub tag: String,
    /// Explicit priority; unranked alternatives sort after ranked ones.
    pub metric: Option<u32>,
    /// TestSpec declared inline with this alternative.
    pub test: Option<TestSpec>,
}

/// The value a tag resolves to.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A template string with `$1`, `$2`, … placeholders.
    Template(String),
    /// Ordered alternative tags; order encodes preference.
    Indirection(Vec<Alternative>),
}

/// Store value: the resolution plus the record-level TestSpec, consulted
/// when this tag is probed as somebody's alternative.
#[derive(Debug, Clone)]
pub struct Entry {
    pub resolution: Resolution,
    pub test: Option<TestSpec>,
}

/// Outcome of committing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Written under every declared alias.
    Stored,
    /// Non-overwrite mode and an alias already existed; the whole record
    /// was discarded.
    SkippedExisting,
    /// The record carried no template and no indirection; nothing to store
    /// (observers still see it).
    NoResolution,
}

/// Concurrent tag dictionary. Per-entry guarding only; reads stay cheap
/// while loads and mirror reorders write individual entries.
#[derive(Debug, Default)]
pub struct Dictionary {
    entries: DashMap<String, Entry>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional insert/overwrite.
    pub fn put(&self, tag: impl Into<String>, entry: Entry) {
        self.entries.insert(tag.into(), entry);
    }

    /// Cloned lookup. Entries are small; cloning keeps callers free of map
    /// guards across await points.
    pub fn get(&self, tag: &str) -> Option<Entry> {
        self.entries.get(tag).map(|e| e.value().clone())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Write one finalized record under all of its aliases.
    ///
    /// With `overwrite` off, a single pre-existing alias discards the whole
    /// record; there is no partial write.
    pub fn commit_record(&self, rec: &CandidateRecord, overwrite: bool) -> CommitOutcome {
        let Some(resolution) = rec.resolution() else {
            return CommitOutcome::NoResolution;
        };

        if !overwrite {
            if let Some(existing) = rec.aliases.iter().find(|a| self.contains(a)) {
                trace!(tag = %existing, "record discarded: alias already present and overwrite is off");
                return CommitOutcome::SkippedExisting;
            }
        }

        for alias in &rec.aliases {
            self.put(
                alias.clone(),
                Entry {
                    resolution: resolution.clone(),
                    test: rec.record_test.clone(),
                },
            );
        }
        trace!(tags = ?rec.aliases, "record committed");
        CommitOutcome::Stored
    }

    /// Move the named alternative of `tag` to the front, keeping the other
    /// alternatives in their previous relative order. Returns false when the
    /// entry vanished or is not an indirection anymore (last-writer-wins
    /// with concurrent reloads).
    pub fn promote(&self, tag: &str, alt_tag: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(tag) else {
            return false;
        };
        let Resolution::Indirection(alts) = &mut entry.resolution else {
            return false;
        };
        let Some(pos) = alts.iter().position(|a| a.tag == alt_tag) else {
            return false;
        };
        if pos > 0 {
            let alt = alts.remove(pos);
            alts.insert(0, alt);
            debug!(tag, mirror = alt_tag, "mirror promoted to front");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBuilder;

    fn indirection_record(aliases: &[&str], alts: &[(&str, Option<u32>)]) -> CandidateRecord {
        let mut b = RecordBuilder::new();
        b.field("A", &aliases.join(" "));
        for (tag, metric) in alts {
            match metric {
                Some(m) => b.field("I", &format!("{tag}:{m}")),
                None => b.field("I", tag),
            }
        }
        b.finish()
    }

    #[test]
    fn metric_ordering_ranked_before_unranked() {
        let rec = indirection_record(
            &["Bar"],
            &[("M1", Some(5)), ("M2", None), ("M3", Some(2)), ("M4", Some(5))],
        );
        let Some(Resolution::Indirection(alts)) = rec.resolution() else {
            panic!("expected indirection");
        };
        let order: Vec<&str> = alts.iter().map(|a| a.tag.as_str()).collect();
        // Ascending by metric, declaration order on ties, unranked last.
        assert_eq!(order, vec!["M3", "M1", "M4", "M2"]);
    }

    #[test]
    fn non_overwrite_discards_whole_record() {
        let dict = Dictionary::new();
        let mut first = RecordBuilder::new();
        first.field("A", "Foo");
        first.field("U", "http://a/$1");
        assert_eq!(dict.commit_record(&first.finish(), true), CommitOutcome::Stored);

        // Redeclares Foo plus a brand-new alias; both must be dropped.
        let mut second = RecordBuilder::new();
        second.field("A", "Foo Fresh");
        second.field("U", "http://b/$1");
        assert_eq!(
            dict.commit_record(&second.finish(), false),
            CommitOutcome::SkippedExisting
        );

        assert!(!dict.contains("Fresh"));
        match dict.get("Foo").unwrap().resolution {
            Resolution::Template(t) => assert_eq!(t, "http://a/$1"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn overwrite_replaces() {
        let dict = Dictionary::new();
        let mut first = RecordBuilder::new();
        first.field("A", "Foo");
        first.field("U", "http://a/$1");
        dict.commit_record(&first.finish(), true);

        let mut second = RecordBuilder::new();
        second.field("A", "Foo");
        second.field("U", "http://b/$1");
        assert_eq!(dict.commit_record(&second.finish(), true), CommitOutcome::Stored);

        match dict.get("Foo").unwrap().resolution {
            Resolution::Template(t) => assert_eq!(t, "http://b/$1"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn aliases_share_one_resolution() {
        let dict = Dictionary::new();
        let mut b = RecordBuilder::new();
        b.field("A", "Foo Foo.alias");
        b.field("U", "http://a/$1");
        dict.commit_record(&b.finish(), true);
        assert!(dict.contains("Foo"));
        assert!(dict.contains("Foo.alias"));
    }

    #[test]
    fn promote_preserves_relative_order() {
        let dict = Dictionary::new();
        let rec = indirection_record(&["Bar"], &[("M1", None), ("M2", None), ("M3", None)]);
        dict.commit_record(&rec, true);

        assert!(dict.promote("Bar", "M3"));
        let Resolution::Indirection(alts) = dict.get("Bar").unwrap().resolution else {
            panic!("expected indirection");
        };
        let order: Vec<&str> = alts.iter().map(|a| a.tag.as_str()).collect();
        assert_eq!(order, vec!["M3", "M1", "M2"]);

        // Promoting the current leader is a no-op.
        assert!(dict.promote("Bar", "M3"));
        assert!(!dict.promote("Bar", "M9"));
        assert!(!dict.promote("Nope", "M1"));
    }
}
