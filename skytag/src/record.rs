//! Line-oriented record parser and the dictionary load pipeline.
//!
//! A record source is a stream of `%Name value` field lines. A value ending
//! in a backslash continues on the next line (the continuation's leading
//! whitespace is kept verbatim). Blank lines and `#` comments are skipped.
//! An `A`/`ActionName` field starts a new record and finalizes the previous
//! one; end of stream finalizes the last.

use std::io::{self, BufRead};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::error::LoadError;
use crate::profile::ProfileGate;
use crate::store::{Alternative, CommitOutcome, Dictionary, Pattern, Resolution, TestSpec};

/// One parsed `%Name value` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub value: String,
}

/// Receives the full field list of every eligible record, opaque fields
/// included. Catalog builders register one of these; the engine itself only
/// interprets the field families it knows.
pub trait RecordObserver: Send + Sync {
    fn on_record(&self, fields: &[(String, String)]);
}

/// Pulls `%Name value` fields off a line stream, reassembling continuations.
pub struct FieldReader<R> {
    inner: R,
    line: String,
}

impl<R: BufRead> FieldReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
        }
    }

    /// Next field, `Ok(None)` at clean end of stream. A read error aborts
    /// the stream; fields already returned stand.
    pub fn next_field(&mut self) -> io::Result<Option<RawField>> {
        loop {
            let Some(()) = self.read_line()? else {
                return Ok(None);
            };
            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix('%') else {
                trace!(line, "skipping line outside record syntax");
                continue;
            };
            let (name, value) = match rest.find(char::is_whitespace) {
                Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
                None => (rest, ""),
            };
            if name.is_empty() {
                trace!(line, "skipping field with empty name");
                continue;
            }
            let name = name.to_string();
            let mut value = value.to_string();
            while value.ends_with('\\') {
                value.pop();
                match self.read_line()? {
                    Some(()) => value.push_str(self.line.trim_end_matches(['\n', '\r'])),
                    None => break,
                }
            }
            return Ok(Some(RawField { name, value }));
        }
    }

    fn read_line(&mut self) -> io::Result<Option<()>> {
        self.line.clear();
        if self.inner.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(()))
    }
}

/// Accumulates the fields of one record; constructed fresh per record and
/// converted into an immutable [`CandidateRecord`] at the boundary.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    aliases: Vec<String>,
    template: Option<String>,
    alternatives: Vec<Alternative>,
    record_test: Option<TestSpec>,
    profile: Option<String>,
    domain: Option<String>,
    fields: Vec<(String, String)>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, name: &str, value: &str) {
        self.fields.push((name.to_string(), value.to_string()));
        match name {
            "A" | "ActionName" => {
                self.aliases
                    .extend(value.split_whitespace().map(ToString::to_string));
            }
            "U" | "Url" | "L" | "FullTextResult" => {
                // First template field wins.
                if self.template.is_none() {
                    self.template = Some(value.to_string());
                }
            }
            "I" | "SeeAction" => {
                if let Some(alt) = parse_alternative(value) {
                    self.alternatives.push(alt);
                } else {
                    trace!(value, "skipping empty indirection field");
                }
            }
            "T" | "Test" => {
                let spec = parse_test_spec(value);
                match self.alternatives.iter_mut().rev().next() {
                    // A test following an indirection field attaches to it.
                    Some(alt) if alt.test.is_none() => alt.test = Some(spec),
                    _ if self.record_test.is_none() => self.record_test = Some(spec),
                    _ => trace!(value, "extra test field ignored"),
                }
            }
            "Z" | "DistribDomain" => self.domain = Some(value.trim().to_string()),
            "Profile" => match &mut self.profile {
                Some(existing) => {
                    existing.push(' ');
                    existing.push_str(value);
                }
                None => self.profile = Some(value.to_string()),
            },
            // Opaque field: kept in `fields` for observers only.
            _ => {}
        }
    }

    pub fn finish(mut self) -> CandidateRecord {
        // Ranked alternatives ascending, declaration order on ties,
        // unranked after ranked.
        self.alternatives
            .sort_by_key(|a| (a.metric.is_none(), a.metric.unwrap_or(0)));
        CandidateRecord {
            aliases: self.aliases,
            template: self.template,
            alternatives: self.alternatives,
            record_test: self.record_test,
            profile: self.profile,
            domain: self.domain,
            fields: self.fields,
        }
    }
}

/// A finalized record, ready for gating and commit.
#[derive(Debug)]
pub struct CandidateRecord {
    pub aliases: Vec<String>,
    pub template: Option<String>,
    pub alternatives: Vec<Alternative>,
    pub record_test: Option<TestSpec>,
    pub profile: Option<String>,
    pub domain: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl CandidateRecord {
    /// The resolution this record declares: an indirection when any
    /// `I`/`SeeAction` field is present, else the template, else none.
    pub fn resolution(&self) -> Option<Resolution> {
        if !self.alternatives.is_empty() {
            Some(Resolution::Indirection(self.alternatives.clone()))
        } else {
            self.template.clone().map(Resolution::Template)
        }
    }
}

fn parse_alternative(value: &str) -> Option<Alternative> {
    let mut parts = value.split_whitespace();
    let head = parts.next()?;
    let (tag, mut metric) = match head.rsplit_once(':') {
        Some((t, m)) if !t.is_empty() => match m.parse::<u32>() {
            Ok(m) => (t.to_string(), Some(m)),
            Err(_) => (head.to_string(), None),
        },
        _ => (head.to_string(), None),
    };
    for tok in parts {
        if let Some(v) = tok.strip_prefix("availability=") {
            metric = v.parse().ok();
        }
    }
    Some(Alternative {
        tag,
        metric,
        test: None,
    })
}

static LONG_FORM_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(pattern|option|param)="([^"]*)""#).unwrap());

/// Parse a `T`/`Test` field, short form `pattern:options:params` or long
/// form `pattern="…" option="…" param="…"`.
fn parse_test_spec(value: &str) -> TestSpec {
    let mut pattern_text = String::new();
    let mut options = String::new();
    let mut params = String::new();

    let mut long_form = false;
    for caps in LONG_FORM_KEY.captures_iter(value) {
        long_form = true;
        match &caps[1] {
            "pattern" => pattern_text = caps[2].to_string(),
            "option" => options = caps[2].to_string(),
            "param" => params = caps[2].to_string(),
            _ => unreachable!(),
        }
    }

    if !long_form {
        // Short form. A `/regex/` pattern may contain colons and slashes,
        // so peel it off up to the last `/` that closes the delimiter
        // (followed by `:` or end of value) before splitting the remainder.
        let rest = if value.starts_with('/') {
            let close = value
                .match_indices('/')
                .skip(1)
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .find(|&i| i + 1 == value.len() || value[i + 1..].starts_with(':'));
            match close {
                Some(end) => {
                    pattern_text = value[..=end].to_string();
                    value[end + 1..].strip_prefix(':').unwrap_or("")
                }
                None => value,
            }
        } else {
            value
        };
        if pattern_text.is_empty() {
            let mut it = rest.splitn(3, ':');
            pattern_text = it.next().unwrap_or("").to_string();
            options = it.next().unwrap_or("").to_string();
            params = it.next().unwrap_or("").to_string();
        } else {
            let mut it = rest.splitn(2, ':');
            options = it.next().unwrap_or("").to_string();
            params = it.next().unwrap_or("").to_string();
        }
    }

    let pattern = parse_pattern(&pattern_text);
    TestSpec {
        pattern,
        params,
        encoded: options.contains('n'),
    }
}

fn parse_pattern(text: &str) -> Option<Pattern> {
    if text.is_empty() {
        return None;
    }
    if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
        let body = &text[1..text.len() - 1];
        match Regex::new(body) {
            Ok(re) => return Some(Pattern::Regex(re)),
            Err(e) => {
                warn!(pattern = body, error = %e, "invalid test regex, matching literally");
                return Some(Pattern::Literal(body.to_string()));
            }
        }
    }
    Some(Pattern::Literal(text.to_string()))
}

/// Counts for one load pass.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct LoadStats {
    pub records: usize,
    pub committed: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.records += other.records;
        self.committed += other.committed;
        self.skipped += other.skipped;
    }
}

/// Drives a record stream into the dictionary: grouping, gating, commit,
/// observer notification, in file order.
pub struct LoadContext<'a> {
    pub dict: &'a Dictionary,
    pub gate: &'a ProfileGate,
    pub expected_domain: Option<&'a str>,
    pub observers: &'a [Arc<dyn RecordObserver>],
    pub overwrite: bool,
}

impl LoadContext<'_> {
    pub fn load<R: BufRead>(&self, reader: R) -> Result<LoadStats, LoadError> {
        let mut stats = LoadStats::default();
        let mut fields = FieldReader::new(reader);
        let mut builder: Option<RecordBuilder> = None;

        loop {
            match fields.next_field() {
                Ok(Some(field)) => {
                    if matches!(field.name.as_str(), "A" | "ActionName") {
                        if let Some(b) = builder.take() {
                            self.finalize(b, &mut stats);
                        }
                        builder = Some(RecordBuilder::new());
                    }
                    match builder.as_mut() {
                        Some(b) => b.field(&field.name, &field.value),
                        None => trace!(name = %field.name, "field before first record ignored"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Committed records stay; the caller learns the load failed.
                    warn!(error = %e, committed = stats.committed, "record stream aborted");
                    return Err(LoadError::Io(e));
                }
            }
        }
        if let Some(b) = builder.take() {
            self.finalize(b, &mut stats);
        }
        Ok(stats)
    }

    fn finalize(&self, builder: RecordBuilder, stats: &mut LoadStats) {
        let rec = builder.finish();
        stats.records += 1;

        if rec.aliases.is_empty() {
            trace!("record without a tag ignored");
            stats.skipped += 1;
            return;
        }
        if let (Some(domain), Some(expected)) = (rec.domain.as_deref(), self.expected_domain) {
            if domain != expected {
                debug!(tags = ?rec.aliases, domain, expected, "record outside distribution domain");
                stats.skipped += 1;
                return;
            }
        }
        if let Some(profile) = rec.profile.as_deref() {
            if !self.gate.eval(profile) {
                debug!(tags = ?rec.aliases, profile, "record profile predicate rejected");
                stats.skipped += 1;
                return;
            }
        }

        match self.dict.commit_record(&rec, self.overwrite) {
            CommitOutcome::Stored => {
                stats.committed += 1;
                self.notify(&rec);
            }
            CommitOutcome::NoResolution => self.notify(&rec),
            CommitOutcome::SkippedExisting => stats.skipped += 1,
        }
    }

    fn notify(&self, rec: &CandidateRecord) {
        for obs in self.observers {
            obs.on_record(&rec.fields);
        }
    }
}
