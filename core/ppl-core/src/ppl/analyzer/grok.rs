//! Grok pattern expansion: `%{PATTERN:name}` to a regex with named groups.

const PATTERNS: &[(&str, &str)] = &[
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s*"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("INT", r"[+-]?\d+"),
    ("NUMBER", r"[+-]?\d+(?:\.\d+)?"),
    ("BASE10NUM", r"[+-]?\d+(?:\.\d+)?"),
    ("POSINT", r"\b[1-9]\d*\b"),
    ("IPV4", r"(?:\d{1,3}\.){3}\d{1,3}"),
    ("IP", r"(?:\d{1,3}\.){3}\d{1,3}"),
    ("HOSTNAME", r"[0-9A-Za-z][0-9A-Za-z._-]*"),
    ("USERNAME", r"[a-zA-Z0-9._-]+"),
    ("USER", r"[a-zA-Z0-9._-]+"),
    ("EMAILADDRESS", r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+"),
    ("URIPATH", r"/[^\s?#]*"),
    ("QUOTEDSTRING", r#""[^"]*""#),
    ("LOGLEVEL", r"(?i:trace|debug|info|notice|warn(?:ing)?|error|crit(?:ical)?|fatal|severe)"),
    ("HTTPDATE", r"\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}"),
    (
        "TIMESTAMP_ISO8601",
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?",
    ),
];

fn lookup(name: &str) -> Option<&'static str> {
    PATTERNS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, regex)| *regex)
}

/// Expands every `%{NAME}` / `%{NAME:field}` reference. Text outside the
/// references is copied as regex source.
pub fn expand(pattern: &str) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated grok reference in {pattern:?}"));
        };
        let reference = &after[..end];
        let (name, field) = match reference.split_once(':') {
            Some((name, field)) => (name, Some(field)),
            None => (reference, None),
        };
        let Some(regex) = lookup(name) else {
            return Err(format!("unknown grok pattern %{{{name}}}"));
        };
        match field {
            Some(field) if !field.is_empty() => {
                out.push_str(&format!("(?P<{field}>{regex})"));
            }
            _ => out.push_str(&format!("(?:{regex})")),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
