//! Loader for the base properties resource.
//!
//! The resource uses the familiar `.properties` layout:
//!
//! ```text
//! # comment
//! ! also a comment
//! persistence.dialect = sqlite
//! persistence.pool.size: 4
//! persistence.dialect.name sqlite
//! persistence.cache.class.shop\:\:Order = read-write
//! persistence.description = a long value \
//!     continued here
//! ```
//!
//! Keys end at the first unescaped `=`, `:` or blank. Backslash escapes
//! (`\t`, `\n`, `\r`, `\f`, `\uXXXX`, and `\` before any other character)
//! are decoded in keys and values. Leading blanks of a value are skipped,
//! trailing ones are kept.
//!
//! A missing resource is not an error and yields an empty map.

use std::io::ErrorKind;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use super::ConfigMap;
use super::errors::ConfigError;

/// Load properties from `path`.
///
/// Returns an empty map when the file does not exist. Any other read failure,
/// or a malformed line, is a [`ConfigError`].
pub fn load_properties(path: impl AsRef<Path>) -> Result<ConfigMap, ConfigError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No properties resource, using empty base");
            return Ok(ConfigMap::new());
        }
        Err(source) => {
            return Err(ConfigError::PropertiesRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let properties = parse_properties(&contents).map_err(|(line, reason)| {
        ConfigError::MalformedProperties {
            path: path.to_path_buf(),
            line,
            reason,
        }
    })?;
    tracing::debug!(
        path = %path.display(),
        count = properties.len(),
        "Loaded properties resource"
    );
    Ok(properties)
}

/// Parse properties text. Errors carry the one-based line number and a reason.
pub(crate) fn parse_properties(contents: &str) -> Result<ConfigMap, (usize, String)> {
    let mut properties = ConfigMap::new();
    let mut logical = String::new();
    let mut continuing = false;
    let mut start_line = 0;

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim_start_matches(is_blank);
        if !continuing {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            start_line = index + 1;
        } else if line.is_empty() {
            // A blank line ends a pending continuation.
            continuing = false;
            insert_entry(&mut properties, &logical, start_line)?;
            logical.clear();
            continue;
        }

        // An odd run of trailing backslashes continues the logical line.
        let trailing = line.len() - line.trim_end_matches('\\').len();
        if trailing % 2 == 1 {
            logical.push_str(&line[..line.len() - 1]);
            continuing = true;
            continue;
        }

        logical.push_str(line);
        continuing = false;
        insert_entry(&mut properties, &logical, start_line)?;
        logical.clear();
    }

    // A continuation on the last line still ends the entry.
    if continuing {
        insert_entry(&mut properties, &logical, start_line)?;
    }

    Ok(properties)
}

fn insert_entry(
    properties: &mut ConfigMap,
    logical: &str,
    line: usize,
) -> Result<(), (usize, String)> {
    let (key, value) = parse_entry(logical).map_err(|reason| (line, reason))?;
    properties.insert(key, value);
    Ok(())
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

/// Split a logical line into key and value.
///
/// The key ends at the first unescaped `=`, `:` or blank. Blanks around the
/// separator are skipped, and a blank may itself be the separator.
fn parse_entry(line: &str) -> Result<(String, String), String> {
    let mut chars = line.chars().peekable();

    let mut key = String::new();
    while let Some(&c) = chars.peek() {
        if c == '=' || c == ':' || is_blank(c) {
            break;
        }
        chars.next();
        if c == '\\' {
            key.extend(unescape(&mut chars)?);
        } else {
            key.push(c);
        }
    }

    while chars.next_if(|&c| is_blank(c)).is_some() {}
    if chars.next_if(|&c| c == '=' || c == ':').is_some() {
        while chars.next_if(|&c| is_blank(c)).is_some() {}
    }

    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.extend(unescape(&mut chars)?);
        } else {
            value.push(c);
        }
    }

    if key.is_empty() {
        return Err(format!("missing key before separator in {line:?}"));
    }
    Ok((key, value))
}

/// Decode the character after a backslash.
fn unescape(chars: &mut Peekable<Chars<'_>>) -> Result<Option<char>, String> {
    let decoded = match chars.next() {
        None => return Ok(None),
        Some('t') => '\t',
        Some('n') => '\n',
        Some('r') => '\r',
        Some('f') => '\x0c',
        Some('u') => {
            let hex: String = chars.by_ref().take(4).collect();
            let code = (hex.len() == 4)
                .then(|| u32::from_str_radix(&hex, 16).ok())
                .flatten()
                .and_then(char::from_u32);
            code.ok_or_else(|| format!("malformed \\u escape \\u{hex}"))?
        }
        Some(other) => other,
    };
    Ok(Some(decoded))
}
