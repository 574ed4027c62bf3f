//! Metric and label name cleanup.
//!
//! cgroup directory names can carry systemd-style escapes (`system-foo\x2dbar.slice`),
//! so names are unescaped first and then squeezed down to the Prometheus name alphabet.

/// Turn an arbitrary string into a valid metric name fragment.
///
/// The result only contains `[A-Za-z0-9_:]`, never repeats `_` and never starts or ends
/// with `_`. The function is total: a string that cannot be unescaped is used as is.
pub fn sanitize_metric_name(name: &str) -> String {
    let unescaped = unescape(name).unwrap_or_else(|| name.to_string());

    let mut out = String::with_capacity(unescaped.len());
    for c in unescaped.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    out.trim_matches('_').to_string()
}

/// Decode C-style backslash escapes the way a double-quoted string literal would.
///
/// Returns `None` on an unknown or truncated escape, a bare `"` or a raw newline.
/// Decoded bytes that are not UTF-8 become U+FFFD.
pub fn unescape(input: &str) -> Option<String> {
    if !input.contains('\\') {
        if input.contains('"') || input.contains('\n') {
            return None;
        }
        return Some(input.to_string());
    }

    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => {}
            other => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                continue;
            }
        }

        let escape = chars.next()?;
        match escape {
            'a' => bytes.push(0x07),
            'b' => bytes.push(0x08),
            'f' => bytes.push(0x0c),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            't' => bytes.push(b'\t'),
            'v' => bytes.push(0x0b),
            '\\' => bytes.push(b'\\'),
            '"' => bytes.push(b'"'),
            '\'' => bytes.push(b'\''),
            'x' => {
                let value = take_hex(&mut chars, 2)?;
                bytes.push(value as u8);
            }
            'u' | 'U' => {
                let digits = if escape == 'u' { 4 } else { 8 };
                let ch = char::from_u32(take_hex(&mut chars, digits)?)?;
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            '0'..='7' => {
                let mut value = escape.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                if value > 0xff {
                    return None;
                }
                bytes.push(value as u8);
            }
            _ => return None,
        }
    }

    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn take_hex(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_clean(name: &str) -> bool {
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
            && !name.starts_with('_')
            && !name.ends_with('_')
            && !name.contains("__")
    }

    #[test]
    fn test_file_name_becomes_prefix() {
        assert_eq!(sanitize_metric_name("memory.pressure"), "memory_pressure");
        assert_eq!(sanitize_metric_name("memory.swap.current"), "memory_swap_current");
    }

    #[test]
    fn test_systemd_escape_is_decoded() {
        assert_eq!(
            sanitize_metric_name(r"system-getty\x2dstatic.slice"),
            "system_getty_static_slice"
        );
    }

    #[test]
    fn test_squeeze_and_trim_underscores() {
        assert_eq!(sanitize_metric_name("__a..b--c__"), "a_b_c");
        assert_eq!(sanitize_metric_name("/"), "");
        assert_eq!(sanitize_metric_name(""), "");
    }

    #[test]
    fn test_colons_survive() {
        assert_eq!(sanitize_metric_name("job:rate5m"), "job:rate5m");
    }

    #[test]
    fn test_bad_escape_falls_back_to_original() {
        assert_eq!(unescape(r"bad\qescape"), None);
        assert_eq!(sanitize_metric_name(r"bad\qescape"), "bad_qescape");
        assert_eq!(sanitize_metric_name(r"trailing\"), "trailing");
    }

    #[test]
    fn test_unescape_forms() {
        assert_eq!(unescape(r"a\x2db").as_deref(), Some("a-b"));
        assert_eq!(unescape(r"tab\there").as_deref(), Some("tab\there"));
        assert_eq!(unescape(r"oct\055al").as_deref(), Some("oct-al"));
        assert_eq!(unescape(r"été").as_deref(), Some("été"));
        assert_eq!(unescape("plain").as_deref(), Some("plain"));
        assert_eq!(unescape("quote\"inside"), None);
        assert_eq!(unescape(r"\xff").as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn test_invalid_utf8_escape_is_replaced() {
        assert_eq!(sanitize_metric_name(r"a\xffb"), "a_b");
        assert_eq!(sanitize_metric_name(r"\xfe\xffslice"), "slice");
    }

    #[test]
    fn test_non_ascii_is_replaced() {
        assert_eq!(sanitize_metric_name("café-01"), "caf_01");
    }

    #[test]
    fn test_idempotent_and_clean() {
        let inputs = [
            "memory.pressure",
            r"user\x2d1000.slice",
            "___",
            "a__b",
            "::x::",
            r"\\x2d",
            "weird name with spaces/and/slashes",
            "-._-._",
            "\u{1F600}emoji",
            r"\",
        ];
        for input in inputs {
            let once = sanitize_metric_name(input);
            assert!(is_clean(&once), "{input:?} -> {once:?}");
            assert_eq!(sanitize_metric_name(&once), once, "not idempotent for {input:?}");
        }
    }
}
