//! Transpiler from installer batch scripts to `.reg` files.
//!
//! Installers for Windows games often ship a `.cmd` that writes registry keys
//! with `REG ADD`. Running it needs `cmd.exe` semantics, so instead the narrow
//! dialect those scripts use is rewritten into a file `regedit /S` can import.
//! Only `SET` variable capture, `%var%` substitution, and
//! `REG ADD <key> /v <name> /t <type> /d <data> [/f]` are understood; every
//! other line is skipped.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::debug;

pub const REGEDIT_HEADER: &str = "Windows Registry Editor Version 5.00";

static SET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^set\s+"?([A-Za-z_][A-Za-z0-9_]*)=(.*?)"?\s*$"#).expect("valid regex")
});

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").expect("valid regex"));

static REG_ADD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^reg(?:\.exe)?\s+add\s+("[^"]*"|\S+)\s+/v\s+("[^"]*"|\S+)\s+/t\s+("[^"]*"|\S+)\s+/d\s+("[^"]*"|\S+)(?:\s+/f)?\s*$"#,
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum RegValue {
    String(String),
    Dword(u32),
    Binary(Vec<u8>),
}

impl RegValue {
    fn parse(kind: &str, data: &str) -> Option<Self> {
        match kind.to_ascii_uppercase().as_str() {
            "REG_SZ" | "REG_EXPAND_SZ" => Some(Self::String(data.to_owned())),
            "REG_DWORD" => parse_dword(data).map(Self::Dword),
            "REG_BINARY" => parse_binary(data).map(Self::Binary),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::String(s) => format!("\"{}\"", escape(s)),
            Self::Dword(v) => format!("dword:{v:08x}"),
            Self::Binary(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("hex:{}", hex.join(","))
            }
        }
    }
}

fn parse_dword(data: &str) -> Option<u32> {
    let data = data.trim();
    match data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => data.parse().ok(),
    }
}

fn parse_binary(data: &str) -> Option<Vec<u8>> {
    let digits: String = data
        .chars()
        .filter(|c| !matches!(c, ',' | ' '))
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

/// Key paths may be written with doubled separators inside quotes.
fn normalize_key(token: &str) -> String {
    let mut key = unquote(token).to_owned();
    while key.contains("\\\\") {
        key = key.replace("\\\\", "\\");
    }
    key.trim_end_matches('\\').to_owned()
}

fn is_ignored(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower == "rem"
        || lower.starts_with("rem ")
        || lower.starts_with("::")
        || lower.starts_with("@echo")
        || lower.starts_with("echo")
        || lower == "exit"
        || lower.starts_with("exit ")
}

/// Whitespace-separated tokens, keeping quoted runs together.
fn split_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        if c == '"' {
            quoted = !quoted;
        }
        if c.is_whitespace() && !quoted {
            if let Some(begin) = start.take() {
                tokens.push(&line[begin..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(begin) = start {
        tokens.push(&line[begin..]);
    }
    tokens
}

/// Expand `%var%` per token. A bare token whose expansion contains
/// whitespace is quoted so it still parses as one argument.
fn substitute(line: &str, vars: &HashMap<String, String>) -> String {
    split_tokens(line)
        .into_iter()
        .map(|token| {
            let expanded = VARIABLE
                .replace_all(token, |caps: &Captures<'_>| {
                    vars.get(&caps[1].to_ascii_lowercase())
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_owned())
                })
                .into_owned();
            if !token.contains('"') && expanded.contains(char::is_whitespace) {
                format!("\"{expanded}\"")
            } else {
                expanded
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rewrite a `REG ADD` batch script as `.reg` file text.
pub fn convert(script: &str) -> String {
    let mut out = String::from(REGEDIT_HEADER);
    out.push('\n');
    let mut vars: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    for raw in script.lines() {
        let line = raw.trim();
        if line.is_empty() || is_ignored(line) {
            continue;
        }
        if line.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("set ")) {
            if let Some(caps) = SET_LINE.captures(line) {
                let value = caps[2].trim().trim_matches('"').to_owned();
                vars.insert(caps[1].to_ascii_lowercase(), value);
            }
            continue;
        }

        let line = substitute(line, &vars);
        let Some(caps) = REG_ADD.captures(&line) else {
            debug!("skipping unsupported line: {line}");
            continue;
        };
        let key = normalize_key(&caps[1]);
        let name = unquote(&caps[2]);
        let Some(value) = RegValue::parse(unquote(&caps[3]), unquote(&caps[4])) else {
            debug!("skipping value {name} with unsupported type or data");
            continue;
        };

        if current_key.as_deref() != Some(key.as_str()) {
            let _ = write!(out, "\n[{key}]\n");
            current_key = Some(key);
        }
        let _ = writeln!(out, "\"{}\"={}", escape(name), value.render());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_variable_and_dword() {
        let script = r#"
@echo off
SET regpath="HKCU\\Software\\X"
REG ADD %regpath% /v "Val" /t REG_DWORD /d 10 /f
"#;
        assert_eq!(
            convert(script),
            "Windows Registry Editor Version 5.00\n\n[HKCU\\Software\\X]\n\"Val\"=dword:0000000a\n"
        );
    }

    #[test]
    fn strings_are_escaped() {
        let script = r#"reg add "HKLM\Software\Foo" /v "Path" /t REG_SZ /d "C:\Games\Foo" /f"#;
        let out = convert(script);
        assert!(out.contains("[HKLM\\Software\\Foo]\n"));
        assert!(out.contains(r#""Path"="C:\\Games\\Foo""#));
    }

    #[test]
    fn key_header_only_on_change() {
        let script = r"
REG ADD HKCU\Software\A /v One /t REG_DWORD /d 0x1F
REG ADD HKCU\Software\A /v Two /t REG_EXPAND_SZ /d %SystemRoot%
REG ADD HKCU\Software\B /v Blob /t REG_BINARY /d 0aff10
";
        let out = convert(script);
        assert_eq!(out.matches("[HKCU\\Software\\A]").count(), 1);
        assert!(out.contains("\"One\"=dword:0000001f\n"));
        // unknown variables are left alone
        assert!(out.contains("\"Two\"=\"%SystemRoot%\"\n"));
        assert!(out.contains("[HKCU\\Software\\B]\n\"Blob\"=hex:0a,ff,10\n"));
    }

    #[test]
    fn comments_and_noise_are_skipped() {
        let script = "REM set up keys\r\n:: another comment\r\necho hi\r\nSET /A n=1\r\ncd /d %~dp0\r\nexit /b 0\r\n";
        assert_eq!(convert(script), "Windows Registry Editor Version 5.00\n");
    }

    #[test]
    fn expanded_values_with_spaces_stay_one_argument() {
        let script = "SET key=HKCU\\Software\\My Game\r\nSET title=Space Game\r\n\
                      REG ADD %key%\\Settings /v Title /t REG_SZ /d %title% /f\r\n\
                      REG ADD \"%key%\" /v Lang /t REG_SZ /d en\r\n";
        let out = convert(script);
        assert!(out.contains("[HKCU\\Software\\My Game\\Settings]\n\"Title\"=\"Space Game\"\n"));
        assert!(out.contains("[HKCU\\Software\\My Game]\n\"Lang\"=\"en\"\n"));
    }

    #[test]
    fn quoted_tokens_keep_inner_spaces() {
        assert_eq!(
            split_tokens(r#"reg add "HKCU\A B" /v  "x y" /f"#),
            vec!["reg", "add", r#""HKCU\A B""#, "/v", r#""x y""#, "/f"]
        );
    }

    #[test]
    fn bad_data_is_skipped() {
        let script = r"
REG ADD HKCU\X /v A /t REG_DWORD /d notanumber /f
REG ADD HKCU\X /v B /t REG_MULTI_SZ /d a\0b /f
REG ADD HKCU\X /v C /t REG_BINARY /d abc /f
";
        assert_eq!(convert(script), "Windows Registry Editor Version 5.00\n");
    }

    #[test]
    fn case_insensitive_command_and_variables() {
        let script = "set Base=HKCU\\Software\\Game\nreg.exe ADD %BASE%\\Settings /V Lang /T reg_sz /D en\n";
        let out = convert(script);
        assert!(out.contains("[HKCU\\Software\\Game\\Settings]\n\"Lang\"=\"en\"\n"));
    }
}
