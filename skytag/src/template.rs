//! Positional-parameter template expansion with URL-encoding semantics.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Query-component encoding: everything but unreserved characters.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How parameter values are treated during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstMode {
    /// Building a URL from raw values: encoding activates at the first
    /// literal `?` and applies to values substituted after that point.
    Url,
    /// Building a URL from values the caller already encoded.
    Encoded,
    /// Plain textual substitution (command-line templates).
    Plain,
}

/// Expand `$1`, `$2`, … placeholders in `template` against `params`.
///
/// Empty or missing parameters elide their `name=` assignment rather than
/// emitting an empty one; a `$n*` placeholder splits the raw value on
/// whitespace and repeats the captured `&name=` prefix for each piece.
pub fn expand(template: &str, params: &[String], mode: SubstMode) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len() + 16);
    let mut encoding = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '$' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
            let mut j = i + 1;
            let mut index: usize = 0;
            while j < chars.len() && chars[j].is_ascii_digit() {
                index = index * 10 + chars[j].to_digit(10).unwrap_or(0) as usize;
                j += 1;
            }
            let multi = j < chars.len() && chars[j] == '*';
            if multi {
                j += 1;
            }
            let value = index
                .checked_sub(1)
                .and_then(|k| params.get(k))
                .map(String::as_str)
                .unwrap_or("");
            let at_value_end = j >= chars.len() || chars[j] == '&';
            let encode_now = encoding && mode == SubstMode::Url;
            substitute(&mut out, value, multi, at_value_end, encode_now);
            i = j;
            continue;
        }
        if c == '?' && mode == SubstMode::Url {
            encoding = true;
        }
        out.push(c);
        i += 1;
    }

    match mode {
        SubstMode::Plain => out,
        SubstMode::Url | SubstMode::Encoded => trim_url_seams(out),
    }
}

fn substitute(out: &mut String, value: &str, multi: bool, at_value_end: bool, encode: bool) {
    // The `name=` assignment this placeholder completes, if any.
    let seg_start = out.rfind(['&', '?']).map(|p| p + 1).unwrap_or(0);
    let assign = out.len() > seg_start && out.ends_with('=');

    if value.is_empty() {
        if assign && (at_value_end || multi) {
            elide_assignment(out, seg_start);
        }
        return;
    }

    if multi && assign {
        let prefix = out[seg_start..].to_string();
        let mut pieces = value.split_whitespace();
        if let Some(first) = pieces.next() {
            push_value(out, first, encode);
            for piece in pieces {
                out.push('&');
                out.push_str(&prefix);
                push_value(out, piece, encode);
            }
        } else {
            elide_assignment(out, seg_start);
        }
        return;
    }

    push_value(out, value, encode);
}

fn elide_assignment(out: &mut String, seg_start: usize) {
    if seg_start == 0 {
        out.clear();
    } else if out.as_bytes()[seg_start - 1] == b'&' {
        out.truncate(seg_start - 1);
    } else {
        // Keep the `?`; the seam cleanup collapses `?&` later.
        out.truncate(seg_start);
    }
}

fn push_value(out: &mut String, value: &str, encode: bool) {
    if encode {
        out.push_str(&utf8_percent_encode(value, QUERY_ENCODE).to_string());
    } else {
        out.push_str(value);
    }
}

fn trim_url_seams(mut out: String) -> String {
    while let Some(pos) = out.find("?&") {
        out.remove(pos + 1);
    }
    if out.ends_with('&') {
        out.pop();
    }
    if out.ends_with('?') {
        out.pop();
    }
    out
}

/// Split a caller-facing parameter string on whitespace outside double
/// quotes; quotes delimit one parameter and are dropped.
pub fn split_params(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quote = false;
    let mut started = false;

    for c in s.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                started = true;
            }
            c if c.is_whitespace() && !in_quote => {
                if started {
                    out.push(std::mem::take(&mut cur));
                    started = false;
                }
            }
            c => {
                cur.push(c);
                started = true;
            }
        }
    }
    if started {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(params: &[&str]) -> Vec<String> {
        params.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_assignment_elided() {
        assert_eq!(expand("&a=$1&b=$2", &p(&["", "x"]), SubstMode::Url), "&b=x");
        assert_eq!(expand("a=$1&b=$2", &p(&["", "x"]), SubstMode::Url), "&b=x");
        assert_eq!(expand("x?a=$1&b=$2", &p(&["", "v"]), SubstMode::Url), "x?b=v");
        assert_eq!(expand("x?a=$1", &p(&[""]), SubstMode::Url), "x");
    }

    #[test]
    fn multi_value_expansion() {
        assert_eq!(
            expand("&tag=$1*", &p(&["one two three"]), SubstMode::Url),
            "&tag=one&tag=two&tag=three"
        );
        assert_eq!(expand("&tag=$1*", &p(&["solo"]), SubstMode::Url), "&tag=solo");
        assert_eq!(expand("&tag=$1*", &p(&[""]), SubstMode::Url), "");
    }

    #[test]
    fn multi_value_encodes_each_piece() {
        assert_eq!(
            expand("x?tag=$1*", &p(&["a/b c&d"]), SubstMode::Url),
            "x?tag=a%2Fb&tag=c%26d"
        );
    }

    #[test]
    fn encoding_activates_at_query_start() {
        assert_eq!(
            expand("path$1?x=$2", &p(&["/a", "b c"]), SubstMode::Url),
            "path/a?x=b%20c"
        );
        // Already-encoded values pass through untouched.
        assert_eq!(
            expand("path$1?x=$2", &p(&["/a", "b%20c"]), SubstMode::Encoded),
            "path/a?x=b%20c"
        );
        // Plain mode never encodes and never trims.
        assert_eq!(
            expand("run $1 --opt=$2", &p(&["a b", "c?d"]), SubstMode::Plain),
            "run a b --opt=c?d"
        );
    }

    #[test]
    fn unresolved_placeholder_removed() {
        assert_eq!(expand("x?a=$1&b=$2", &p(&["v"]), SubstMode::Url), "x?a=v");
        assert_eq!(expand("http://x/$1?", &p(&["42"]), SubstMode::Url), "http://x/42");
    }

    #[test]
    fn trailing_question_mark_stripped() {
        assert_eq!(expand("http://x/q?", &p(&[]), SubstMode::Url), "http://x/q");
        assert_eq!(expand("http://x/q?", &p(&[]), SubstMode::Plain), "http://x/q?");
    }

    #[test]
    fn literal_text_untouched() {
        assert_eq!(expand("no placeholders", &p(&["x"]), SubstMode::Url), "no placeholders");
        assert_eq!(expand("cost $", &p(&[]), SubstMode::Url), "cost $");
        assert_eq!(expand("deep$1", &p(&["ñ é"]), SubstMode::Url), "deepñ é");
    }

    #[test]
    fn double_digit_index() {
        let params: Vec<String> = (1..=12).map(|n| format!("v{n}")).collect();
        assert_eq!(expand("&a=$12", &params, SubstMode::Url), "&a=v12");
    }

    #[test]
    fn params_split_honors_quotes() {
        assert_eq!(split_params("a b c"), vec!["a", "b", "c"]);
        assert_eq!(split_params(r#"a "b c" d"#), vec!["a", "b c", "d"]);
        assert_eq!(split_params(r#""one two three""#), vec!["one two three"]);
        assert_eq!(split_params(""), Vec::<String>::new());
        assert_eq!(split_params(r#""" x"#), vec!["", "x"]);
    }
}
