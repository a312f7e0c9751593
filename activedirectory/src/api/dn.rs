//! Distinguished name helpers
//!
//! DNs are built in exactly one place per object kind and always compared
//! case-insensitively, component by component.

use unicase::UniCase;

/// `cn=<first> <last>,<ou>`
pub fn derive_user_dn(first_name: &str, last_name: &str, ou: &str) -> String {
    format!("{},{}", user_rdn(first_name, last_name), ou)
}

pub fn user_rdn(first_name: &str, last_name: &str) -> String {
    format!("cn={}", escape_rdn_value(&user_common_name(first_name, last_name)))
}

pub fn user_common_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name, last_name)
}

/// `cn=<name>,<base_ou>`
pub fn derive_group_dn(name: &str, base_ou: &str) -> String {
    format!("{},{}", group_rdn(name), base_ou)
}

pub fn group_rdn(name: &str) -> String {
    format!("cn={}", escape_rdn_value(name))
}

/// `example.com` becomes `dc=example,dc=com`.
pub fn domain_dn(domain: &str) -> String {
    domain
        .split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("dc={}", label))
        .collect::<Vec<_>>()
        .join(",")
}

/// Case-insensitive DN equality, ignoring whitespace around separators.
pub fn dn_eq(a: &str, b: &str) -> bool {
    let left = components(a);
    let right = components(b);
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(l, r)| UniCase::new(l.as_str()) == UniCase::new(r.as_str()))
}

/// Lowercased DN used as the external identifier of an object.
pub fn identity(dn: &str) -> String {
    components(dn).join(",").to_lowercase()
}

/// Everything after the first RDN, or `None` for a single-component DN.
pub fn parent_dn(dn: &str) -> Option<String> {
    let parts = split_unescaped(dn, ',');
    if parts.len() < 2 {
        return None;
    }
    Some(
        parts[1..]
            .iter()
            .map(|p| p.trim())
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// The first RDN of `dn`, trimmed.
pub fn leading_rdn(dn: &str) -> Option<String> {
    split_unescaped(dn, ',')
        .first()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// True when every comma-separated component has the `name=value` shape.
pub fn looks_like_dn(value: &str) -> bool {
    let parts = split_unescaped(value, ',');
    !parts.is_empty()
        && parts.iter().all(|part| {
            let pieces = split_unescaped(part, '=');
            pieces.len() >= 2 && !pieces[0].trim().is_empty() && !pieces[1].trim().is_empty()
        })
}

/// RFC 4514 escaping for an attribute value placed inside an RDN.
pub fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn components(dn: &str) -> Vec<String> {
    split_unescaped(dn, ',')
        .into_iter()
        .map(|rdn| {
            let pieces = split_unescaped(rdn, '=');
            match pieces.split_first() {
                Some((name, rest)) if !rest.is_empty() => {
                    format!("{}={}", name.trim(), rest.join("=").trim())
                }
                _ => rdn.trim().to_string(),
            }
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Splits at `separator` unless it is preceded by a backslash escape.
fn split_unescaped(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&value[start..i]);
            start = i + c.len_utf8();
        }
    }
    if start < value.len() || !parts.is_empty() {
        parts.push(&value[start..]);
    }
    parts
}
