//! Streaming LDIF decoder (spec §4.6, C6).
//!
//! Entries are blank-line separated. `#` starts a comment line. A line
//! beginning with a single space is a continuation of the previous line
//! (including a continued `dn:` line). `::` marks a base64-encoded value;
//! the attribute name is annotated with `;binary` if it isn't already. The
//! parser is forgiving of a missing trailing blank line at EOF.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asn1::b64::decode_tolerant;
use crate::error::{PkdError, Result};

/// One parsed LDIF entry: its DN plus an ordered multimap of attribute name
/// to raw values (already base64-decoded for `::` values). Serializable so
/// the MANUAL processing strategy can stash a parsed document as its
/// between-stage intermediate artifact (spec §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LdifEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            AttributeValue::Text(s) => s.as_bytes().to_vec(),
            AttributeValue::Binary(b) => b.clone(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            AttributeValue::Text(s) => s.clone(),
            AttributeValue::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl LdifEntry {
    /// First value (in any encoding) of a named attribute, ignoring a
    /// trailing `;binary` suffix on the stored key.
    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| strip_binary_suffix(k).eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.first(name).is_some()
    }
}

fn strip_binary_suffix(name: &str) -> &str {
    name.strip_suffix(";binary").unwrap_or(name)
}

/// Parse a full LDIF document into an ordered sequence of entries.
///
/// Unfolds continuation lines first (a pure text-level transform), then
/// splits on blank lines, then parses each unfolded block into a DN plus
/// attribute map.
pub fn parse_entries(input: &str) -> Result<Vec<LdifEntry>> {
    let unfolded = unfold_continuations(input);

    let mut entries = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();

    for raw_line in unfolded.lines() {
        if raw_line.is_empty() {
            if !current_lines.is_empty() {
                entries.push(parse_block(&current_lines)?);
                current_lines.clear();
            }
            continue;
        }
        if raw_line.starts_with('#') {
            continue;
        }
        current_lines.push(raw_line);
    }
    if !current_lines.is_empty() {
        entries.push(parse_block(&current_lines)?);
    }

    Ok(entries)
}

/// Join any line beginning with a single space onto the previous line,
/// stripping the leading space. Comment and blank lines pass through
/// untouched so the blank-line entry separator still works afterward.
fn unfold_continuations(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(continued) = line.strip_prefix(' ') {
            out.push_str(continued);
        } else {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
    }
    out
}

fn parse_block(lines: &[&str]) -> Result<LdifEntry> {
    let mut entry = LdifEntry::default();
    let mut dn_set = false;

    for line in lines {
        let (name, value) = parse_attribute_line(line)?;
        if name.eq_ignore_ascii_case("dn") {
            entry.dn = value.as_text();
            dn_set = true;
            continue;
        }
        entry.attributes.entry(name).or_default().push(value);
    }

    if !dn_set {
        return Err(PkdError::InvalidLdif(
            "entry is missing a dn: line".to_string(),
        ));
    }

    Ok(entry)
}

/// Parse one logical (already-unfolded) attribute line of the form
/// `name: value`, `name:: base64value`, or `name;binary:: base64value`.
fn parse_attribute_line(line: &str) -> Result<(String, AttributeValue)> {
    let colon = line
        .find(':')
        .ok_or_else(|| PkdError::InvalidLdif(format!("line has no ':' separator: {line:?}")))?;

    let (raw_name, rest) = line.split_at(colon);
    let is_base64 = rest.starts_with("::");
    let value_start = if is_base64 { 2 } else { 1 };
    let raw_value = rest[value_start..].trim_start();

    if is_base64 {
        let decoded = decode_tolerant(raw_value);
        let name = ensure_binary_suffix(raw_name);
        Ok((name, AttributeValue::Binary(decoded)))
    } else {
        Ok((raw_name.to_string(), AttributeValue::Text(raw_value.to_string())))
    }
}

fn ensure_binary_suffix(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(";binary") {
        name.to_string()
    } else {
        format!("{name};binary")
    }
}
