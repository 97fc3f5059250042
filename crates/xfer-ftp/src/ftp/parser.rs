//! LIST / MLSD response parser.
//!
//! Only decides which lines of a listing body are directory entries and
//! extracts their names. Recognised formats:
//! 1. **MLSD facts** (RFC 3659): `type=file;size=1234;modify=20260101120000; file.txt`
//! 2. **Unix-style** (`ls -l`): `-rwxr-xr-x 1 owner group 1234 Jan  1 12:00 file.txt`
//! 3. **DOS/IIS-style**: `01-01-26  12:00AM       1234 file.txt`
//!
//! Any other non-blank line still counts as one entry. `total N` headers,
//! `.`/`..` and the MLSD `cdir`/`pdir` self-references are not entries.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^(?P<perms>[dlcbps-][rwxsStT-]{9})[+@.]?\s+
        \d+\s+                              # link count
        \S+\s+                              # owner
        (?:\S+\s+)?                         # group
        \d+\s+                              # size
        \w{3}\s+\d{1,2}\s+[\d:]+\s+         # date
        (?P<name>.+)$
        "
    )
    .unwrap();
    static ref DOS_RE: Regex = Regex::new(
        r"(?x)
        ^\d{2}-\d{2}-\d{2,4}\s+             # date
        \d{1,2}:\d{2}(?:AM|PM)?\s+          # time
        (?:<DIR>|\d+)\s+                    # size or <DIR>
        (?P<name>.+)$
        "
    )
    .unwrap();
    static ref TOTAL_RE: Regex = Regex::new(r"^total\s+\d+$").unwrap();
}

/// Entry names of a full multi-line LIST or MLSD response body.
pub fn parse_listing(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !TOTAL_RE.is_match(l.trim()))
        .filter_map(entry_name)
        .filter(|name| *name != "." && *name != "..")
        .map(str::to_string)
        .collect()
}

fn entry_name(line: &str) -> Option<&str> {
    if let Some(name) = mlsd_name(line) {
        return name;
    }
    if let Some(caps) = UNIX_RE.captures(line) {
        let name = caps.name("name")?.as_str();
        // Symlinks read `name -> target`.
        if caps["perms"].starts_with('l') {
            return Some(name.split_once(" -> ").map_or(name, |(link, _)| link));
        }
        return Some(name);
    }
    if let Some(caps) = DOS_RE.captures(line) {
        return caps.name("name").map(|m| m.as_str());
    }
    Some(line.trim())
}

/// `Some(None)` marks a recognised MLSD line that is not an entry
/// (`cdir` / `pdir`); `None` means the line is not MLSD at all.
fn mlsd_name(line: &str) -> Option<Option<&str>> {
    let (facts, name) = line.split_once("; ")?;
    if !facts.contains('=') || name.is_empty() {
        return None;
    }
    let self_reference = facts
        .split(';')
        .filter_map(|fact| fact.trim().split_once('='))
        .any(|(key, value)| {
            key.eq_ignore_ascii_case("type")
                && (value.eq_ignore_ascii_case("cdir") || value.eq_ignore_ascii_case("pdir"))
        });
    Some((!self_reference).then_some(name))
}
