//! Windows shell link (`.lnk`) parsing.
//!
//! Only the parts needed to launch a shortcut's target are read: the header,
//! the optional ID list (skipped), the link info's local base path, and the
//! string data block. All integers are little-endian and every read is
//! bounds-checked, so truncated or hostile files never panic.

use serde::Serialize;

const HEADER_SIZE: u32 = 0x4C;
const LINK_CLSID: [u8; 16] = [
    0x01, 0x14, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
];

const HAS_LINK_TARGET_ID_LIST: u32 = 0x0000_0001;
const HAS_LINK_INFO: u32 = 0x0000_0002;
const HAS_NAME: u32 = 0x0000_0004;
const HAS_RELATIVE_PATH: u32 = 0x0000_0008;
const HAS_WORKING_DIR: u32 = 0x0000_0010;
const HAS_ARGUMENTS: u32 = 0x0000_0020;
const IS_UNICODE: u32 = 0x0000_0080;

const VOLUME_ID_AND_LOCAL_BASE_PATH: u32 = 0x0000_0001;
/// Link info headers at least this large carry Unicode path offsets.
const LINK_INFO_UNICODE_HEADER: u32 = 0x24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShortcutRecord {
    pub target: String,
    pub arguments: Option<String>,
    pub working_dir: Option<String>,
    pub description: Option<String>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Length-prefixed string data entry.
    fn counted_string(&mut self, unicode: bool) -> Option<String> {
        let count = usize::from(self.u16()?);
        if unicode {
            Some(decode_utf16(self.bytes(count.checked_mul(2)?)?))
        } else {
            Some(decode_ansi(self.bytes(count)?))
        }
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

// code-page strings are read as Latin-1, which round-trips ASCII paths
fn decode_ansi(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn nul_terminated_ansi(data: &[u8], start: usize) -> Option<String> {
    let tail = data.get(start..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(decode_ansi(&tail[..end]))
}

fn nul_terminated_utf16(data: &[u8], start: usize) -> Option<String> {
    let tail = data.get(start..)?;
    let end = tail.chunks_exact(2).position(|pair| pair == [0, 0])?;
    Some(decode_utf16(&tail[..end * 2]))
}

/// Local base path (plus common suffix) from a LinkInfo block.
fn local_base_path(info: &[u8]) -> Option<String> {
    let mut reader = Reader::at(info, 4);
    let header_size = reader.u32()?;
    let flags = reader.u32()?;
    let _volume_id_offset = reader.u32()?;
    let local_base_offset = reader.u32()? as usize;
    let _network_offset = reader.u32()?;
    let suffix_offset = reader.u32()? as usize;
    if flags & VOLUME_ID_AND_LOCAL_BASE_PATH == 0 {
        return None;
    }

    let (base, suffix) = if header_size >= LINK_INFO_UNICODE_HEADER {
        let base_unicode = reader.u32()? as usize;
        let suffix_unicode = reader.u32()? as usize;
        (
            nul_terminated_utf16(info, base_unicode)?,
            nul_terminated_utf16(info, suffix_unicode).unwrap_or_default(),
        )
    } else {
        (
            nul_terminated_ansi(info, local_base_offset)?,
            nul_terminated_ansi(info, suffix_offset).unwrap_or_default(),
        )
    };
    if base.is_empty() {
        return None;
    }
    if suffix.is_empty() {
        Some(base)
    } else if base.ends_with('\\') {
        Some(format!("{base}{suffix}"))
    } else {
        Some(format!("{base}\\{suffix}"))
    }
}

#[derive(Default)]
struct Extracted {
    local_path: Option<String>,
    name: Option<String>,
    relative_path: Option<String>,
    working_dir: Option<String>,
    arguments: Option<String>,
}

/// Walk the optional sections, recording what was read before the first
/// malformed one.
fn extract(data: &[u8], flags: u32, out: &mut Extracted) -> Option<()> {
    let mut reader = Reader::at(data, HEADER_SIZE as usize);

    if flags & HAS_LINK_TARGET_ID_LIST != 0 {
        let size = usize::from(reader.u16()?);
        reader.bytes(size)?;
    }

    if flags & HAS_LINK_INFO != 0 {
        let start = reader.pos;
        let size = Reader::at(data, start).u32()? as usize;
        let info = reader.bytes(size)?;
        out.local_path = local_base_path(info);
    }

    let unicode = flags & IS_UNICODE != 0;
    let mut next = |flag: u32| -> Option<Option<String>> {
        if flags & flag == 0 {
            return Some(None);
        }
        reader.counted_string(unicode).map(Some)
    };
    out.name = next(HAS_NAME)?;
    out.relative_path = next(HAS_RELATIVE_PATH)?;
    out.working_dir = next(HAS_WORKING_DIR)?;
    out.arguments = next(HAS_ARGUMENTS)?;
    Some(())
}

/// Parse a shell link. Returns `None` for anything that is not a shell link
/// or that names no target.
pub fn parse_shortcut(data: &[u8]) -> Option<ShortcutRecord> {
    let mut header = Reader::at(data, 0);
    if header.u32()? != HEADER_SIZE || header.bytes(16)? != LINK_CLSID {
        return None;
    }
    let flags = header.u32()?;
    if data.len() < HEADER_SIZE as usize {
        return None;
    }

    let mut extracted = Extracted::default();
    let _ = extract(data, flags, &mut extracted);

    let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
    let target = non_empty(extracted.local_path).or_else(|| non_empty(extracted.relative_path))?;
    Some(ShortcutRecord {
        target,
        arguments: non_empty(extracted.arguments),
        working_dir: non_empty(extracted.working_dir),
        description: non_empty(extracted.name),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn header(flags: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        out.extend_from_slice(&LINK_CLSID);
        out.extend_from_slice(&flags.to_le_bytes());
        out.resize(HEADER_SIZE as usize, 0);
        out
    }

    fn utf16_string(s: &str) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut out = u16::try_from(units.len()).unwrap().to_le_bytes().to_vec();
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    fn ansi_link_info(path: &str) -> Vec<u8> {
        let header_size: u32 = 0x1C;
        let base_offset = header_size;
        let suffix_offset = base_offset + path.len() as u32 + 1;
        let total = suffix_offset + 1;
        let mut out = Vec::new();
        for value in [total, header_size, VOLUME_ID_AND_LOCAL_BASE_PATH, 0, base_offset, 0, suffix_offset] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(path.as_bytes());
        out.push(0);
        out.push(0);
        out
    }

    /// Shortcut with only a Unicode relative path, as written by installers.
    pub(crate) fn relative_only(path: &str) -> Vec<u8> {
        let mut data = header(HAS_RELATIVE_PATH | IS_UNICODE);
        data.extend(utf16_string(path));
        data
    }

    #[test]
    fn relative_path_only_is_target() {
        let record = parse_shortcut(&relative_only(r".\Game\game.exe")).unwrap();
        assert_eq!(record.target, r".\Game\game.exe");
        assert_eq!(record.arguments, None);
        assert_eq!(record.description, None);
    }

    #[test]
    fn local_base_path_wins_over_relative_path() {
        let flags = HAS_LINK_TARGET_ID_LIST
            | HAS_LINK_INFO
            | HAS_NAME
            | HAS_RELATIVE_PATH
            | HAS_WORKING_DIR
            | HAS_ARGUMENTS
            | IS_UNICODE;
        let mut data = header(flags);
        // ID list: size then opaque bytes
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&[0xAA; 4]);
        data.extend(ansi_link_info(r"C:\Games\Foo\foo.exe"));
        data.extend(utf16_string("Play Foo"));
        data.extend(utf16_string(r"..\Foo\foo.exe"));
        data.extend(utf16_string(r"C:\Games\Foo"));
        data.extend(utf16_string("-windowed -nosound"));

        let record = parse_shortcut(&data).unwrap();
        assert_eq!(
            record,
            ShortcutRecord {
                target: r"C:\Games\Foo\foo.exe".to_owned(),
                arguments: Some("-windowed -nosound".to_owned()),
                working_dir: Some(r"C:\Games\Foo".to_owned()),
                description: Some("Play Foo".to_owned()),
            }
        );
    }

    #[test]
    fn ansi_string_data() {
        let mut data = header(HAS_RELATIVE_PATH | HAS_ARGUMENTS);
        for s in ["game.exe", "-x"] {
            data.extend_from_slice(&u16::try_from(s.len()).unwrap().to_le_bytes());
            data.extend_from_slice(s.as_bytes());
        }
        let record = parse_shortcut(&data).unwrap();
        assert_eq!(record.target, "game.exe");
        assert_eq!(record.arguments.as_deref(), Some("-x"));
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut data = relative_only("game.exe");
        data[0] = 0x4D;
        assert_eq!(parse_shortcut(&data), None);

        let mut data = relative_only("game.exe");
        data[4] = 0xFF;
        assert_eq!(parse_shortcut(&data), None);

        assert_eq!(parse_shortcut(&[]), None);
        assert_eq!(parse_shortcut(&header(0)[..40]), None);
    }

    #[test]
    fn truncated_string_data_stops_extraction() {
        let mut data = header(HAS_RELATIVE_PATH | HAS_ARGUMENTS | IS_UNICODE);
        data.extend(utf16_string("game.exe"));
        // arguments claim 50 characters but the file ends
        data.extend_from_slice(&50u16.to_le_bytes());
        data.extend_from_slice(&[0x41, 0x00]);
        let record = parse_shortcut(&data).unwrap();
        assert_eq!(record.target, "game.exe");
        assert_eq!(record.arguments, None);
    }

    #[test]
    fn no_target_yields_none() {
        let mut data = header(HAS_NAME | IS_UNICODE);
        data.extend(utf16_string("just a name"));
        assert_eq!(parse_shortcut(&data), None);
    }

    #[test]
    fn oversized_id_list_does_not_panic() {
        let mut data = header(HAS_LINK_TARGET_ID_LIST | HAS_RELATIVE_PATH);
        data.extend_from_slice(&u16::MAX.to_le_bytes());
        assert_eq!(parse_shortcut(&data), None);
    }
}
