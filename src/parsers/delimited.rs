use std::fs::File;
use std::path::Path;

use memchr::memchr_iter;
use memmap2::Mmap;

use super::{HeaderBlock, RawInput, RawTable, cell_value};
use crate::error::{IngestError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const COMMENT: u8 = b'#';

/// Read a comma-delimited vendor file with an optional `#` header block.
pub fn read(path: &Path) -> Result<RawInput> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    let len = file.metadata().map_err(|e| IngestError::io(path, e))?.len();
    if len == 0 {
        return Ok(RawInput {
            header: Some(HeaderBlock::default()),
            table: RawTable::default(),
        });
    }

    // mmap the file; the map is dropped before returning
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IngestError::io(path, e))?;
    let bytes = mmap.strip_prefix(UTF8_BOM).unwrap_or(&mmap[..]);

    let header = parse_header_block(bytes);
    let table = parse_table(bytes)?;
    Ok(RawInput {
        header: Some(header),
        table,
    })
}

/// Collect `# key = value` pairs from the leading comment lines.
///
/// Scanning stops at the first line that is not a comment. Comment lines
/// without `=` are skipped.
pub fn parse_header_block(bytes: &[u8]) -> HeaderBlock {
    let mut block = HeaderBlock::default();
    let mut start = 0usize;
    let ends = memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));

    for end in ends {
        if start > bytes.len() {
            break;
        }
        let line = String::from_utf8_lossy(&bytes[start..end]);
        start = end + 1;

        let line = line.trim_start_matches('\u{feff}').trim();
        let Some(body) = line.strip_prefix('#') else {
            break;
        };
        let body = body.trim_start_matches('#').trim();
        if let Some((key, value)) = body.split_once('=') {
            block.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    block
}

/// Parse the tabular part; `#` lines and blank lines are skipped.
pub fn parse_table(bytes: &[u8]) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(COMMENT))
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let columns = dedupe_names(reader.headers()?.iter());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(cell_value).collect());
    }
    Ok(RawTable::new(columns, rows))
}

/// Repeated header names become `name.1`, `name.2`, ...
fn dedupe_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut n = 0;
        while out.contains(&candidate) {
            n += 1;
            candidate = format!("{name}.{n}");
        }
        out.push(candidate);
    }
    out
}
