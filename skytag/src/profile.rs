//! Profile predicate evaluation: version/feature gating of records.

use std::collections::HashSet;

/// Flag tokens this build understands. Bare tokens outside this list are
/// ignored so records never lose eligibility to unknown vocabulary.
const KNOWN_FLAGS: &[&str] = &["beta"];

/// Evaluates `%Profile` expressions against the process-wide version number
/// and enabled feature flags.
#[derive(Debug, Clone)]
pub struct ProfileGate {
    version: f64,
    flags: HashSet<String>,
}

impl ProfileGate {
    pub fn new(version: f64, flags: HashSet<String>) -> Self {
        Self { version, flags }
    }

    /// True when every token of the space-separated expression holds.
    ///
    /// `<X` `<=X` `>X` `>=X` `=X` compare against the configured version;
    /// a recognized flag token holds when that flag is enabled; anything
    /// else holds trivially.
    pub fn eval(&self, expr: &str) -> bool {
        expr.split_whitespace().all(|tok| self.eval_token(tok))
    }

    fn eval_token(&self, tok: &str) -> bool {
        for (op, cmp) in [
            (">=", Cmp::Ge),
            ("<=", Cmp::Le),
            (">", Cmp::Gt),
            ("<", Cmp::Lt),
            ("=", Cmp::Eq),
        ] {
            if let Some(rest) = tok.strip_prefix(op) {
                return match rest.parse::<f64>() {
                    Ok(bound) => cmp.holds(self.version, bound),
                    // Unparsable bound: ignore the token.
                    Err(_) => true,
                };
            }
        }
        if KNOWN_FLAGS.contains(&tok) {
            return self.flags.contains(tok);
        }
        true
    }
}

#[derive(Clone, Copy)]
enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Cmp {
    fn holds(self, version: f64, bound: f64) -> bool {
        match self {
            Cmp::Lt => version < bound,
            Cmp::Le => version <= bound,
            Cmp::Gt => version > bound,
            Cmp::Ge => version >= bound,
            Cmp::Eq => version == bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(version: f64, flags: &[&str]) -> ProfileGate {
        ProfileGate::new(version, flags.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn version_comparisons() {
        let g = gate(4.5, &[]);
        assert!(g.eval(">=4.3"));
        assert!(g.eval("<5.0"));
        assert!(!g.eval("<4.3"));
        assert!(!g.eval(">4.5"));
        assert!(g.eval(">=4.5 <5.0"));
        assert!(!g.eval(">=4.5 <4.4"));
    }

    #[test]
    fn beta_flag() {
        assert!(!gate(4.5, &[]).eval("beta"));
        assert!(gate(4.5, &["beta"]).eval("beta"));
        assert!(gate(4.5, &["beta"]).eval("beta >=4.0"));
    }

    #[test]
    fn unknown_tokens_ignored() {
        let g = gate(4.5, &[]);
        assert!(g.eval("wibble"));
        assert!(g.eval("wibble >=4.0"));
        assert!(g.eval(">not-a-number"));
        assert!(g.eval(""));
    }
}
