//! Distinguished Name rendering, RFC 4514 escaping, and country-code
//! extraction (spec §4.1, §8 invariants 3 and 5).

use x509_parser::x509::X509Name;

/// Render an `X509Name` as a single RFC 2253 line, most-specific RDN first
/// (the order x509-parser and OpenSSL both use), joined by `,`.
pub fn render_dn_rfc2253(name: &X509Name) -> String {
    name.iter_rdn()
        .map(|rdn| {
            rdn.iter()
                .map(|atv| {
                    let key = short_attr_name(&atv.attr_type().to_id_string());
                    let value = atv.as_str().unwrap_or("").to_string();
                    format!("{}={}", key, escape_rdn_value(&value))
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Map a dotted OID string to its short attribute name where we recognize
/// it; otherwise fall back to `"UNKNOWN"` (OpenSSL falls back to the raw OID
/// for attributes outside its short-name table -- we keep the sentinel
/// since we never feed these back into another parser).
fn short_attr_name(oid: &str) -> &'static str {
    match oid {
        "2.5.4.3" => "CN",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.5" => "SERIALNUMBER",
        "1.2.840.113549.1.9.1" => "emailAddress",
        _ => "UNKNOWN",
    }
}

/// Escape an RDN attribute value per RFC 4514 §2.4: a leading `#` or space,
/// a trailing space, and the characters `,=+"<>;\` are backslash-escaped.
pub fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == chars.len() - 1;
        match c {
            ',' | '=' | '+' | '"' | '<' | '>' | ';' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '#' if is_first => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_first || is_last => {
                out.push('\\');
                out.push(c);
            }
            '\0' => {
                out.push_str("\\00");
            }
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_rdn_value`]: un-escape a backslash-escaped RDN value.
pub fn unescape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_hexdigit() {
                    let hi = chars.next().unwrap();
                    if let Some(&lo) = chars.peek() {
                        if lo.is_ascii_hexdigit() {
                            chars.next();
                            let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16).unwrap_or(0);
                            out.push(byte as char);
                            continue;
                        }
                    }
                    out.push(hi);
                    continue;
                }
                out.push(next);
                chars.next();
                continue;
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Extract an ISO 3166 country code from a rendered DN string. Matches
/// `C=` case-insensitively in both comma-separated (`CN=x,C=KR`) and
/// slash-separated (`/C=KR/CN=x`) forms. Returns `"XX"` on any miss --
/// never fails (spec §4.1, invariant 5).
pub fn extract_country_code(dn: &str) -> String {
    let separators: &[char] = if dn.contains('/') { &['/'] } else { &[','] };
    for part in dn.split(|c: char| separators.contains(&c)) {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim().eq_ignore_ascii_case("c") {
                let value = value.trim();
                if !value.is_empty() {
                    return value.to_uppercase();
                }
            }
        }
    }
    "XX".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_country_from_comma_separated_dn() {
        assert_eq!(extract_country_code("CN=CSCA,C=kr"), "KR");
        assert_eq!(extract_country_code("C=US,CN=CSCA"), "US");
    }

    #[test]
    fn extracts_country_from_slash_separated_dn() {
        assert_eq!(extract_country_code("/C=de/CN=CSCA"), "DE");
    }

    #[test]
    fn missing_country_yields_sentinel() {
        assert_eq!(extract_country_code("CN=CSCA,O=Some Org"), "XX");
        assert_eq!(extract_country_code(""), "XX");
    }

    #[test]
    fn escape_round_trips_specials() {
        let value = "Smith, John \"Jr.\" <jr@example.com>; next=1";
        let escaped = escape_rdn_value(value);
        assert_eq!(unescape_rdn_value(&escaped), value);
    }

    #[test]
    fn escapes_leading_and_trailing_space() {
        assert_eq!(escape_rdn_value(" leading"), "\\ leading");
        assert_eq!(escape_rdn_value("trailing "), "trailing\\ ");
    }

    proptest::proptest! {
        #[test]
        fn escape_unescape_round_trip(s in "[a-zA-Z0-9 ,=+\"<>;\\\\]{0,40}") {
            let escaped = escape_rdn_value(&s);
            proptest::prop_assert_eq!(unescape_rdn_value(&escaped), s);
        }
    }
}
