//! Request file reader.
//!
//! The file is a CSV table: a header row, a configurable number of calendar
//! metadata rows, then one row per staff member with the identity in the first
//! column and one column per day. An optional notes column is ignored.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::config::RequestFormat;
use crate::domain::{RequestTable, ShiftDomain};
use crate::error::RequestError;

const BOM: char = '\u{feff}';

/// Whether `cell` is a circled numeral ① to ⑳.
fn is_circled_numeral(cell: &str) -> bool {
    let mut chars = cell.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('\u{2460}'..='\u{2473}'), None)
    )
}

/// Maps a raw cell to a request symbol; circled numerals stand for rest.
fn decode_cell<'a>(cell: &'a str, rest_symbol: &'a str) -> Option<&'a str> {
    let cell = cell.trim();
    if cell.is_empty() {
        None
    } else if is_circled_numeral(cell) {
        Some(rest_symbol)
    } else {
        Some(cell)
    }
}

/// Reads the request file at `path`.
pub fn load_requests(
    path: impl AsRef<Path>,
    domain: &ShiftDomain,
    format: &RequestFormat,
) -> Result<RequestTable, RequestError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|err| RequestError::Csv {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    let table = parse_requests(file, domain, format).map_err(|source| RequestError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), requests = table.len(), "Loaded requests");
    Ok(table)
}

/// Parses request CSV from any reader.
///
/// ```
/// use shift_scheduling::config::RequestFormat;
/// use shift_scheduling::demo_data::DemoData;
/// use shift_scheduling::domain::ShiftDomain;
/// use shift_scheduling::requests::parse_requests;
///
/// let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
/// let csv = "name,1,2,3\nweekday,Mon,Tue,Wed\nholiday,,,\nann,,②,夜\n";
/// let table = parse_requests(csv.as_bytes(), &domain, &RequestFormat::default()).unwrap();
///
/// assert_eq!(table.get(0, 2), Some("休"));
/// assert_eq!(table.get(0, 3), Some("夜"));
/// assert_eq!(table.len(), 2);
/// ```
pub fn parse_requests<R: Read>(
    reader: R,
    domain: &ShiftDomain,
    format: &RequestFormat,
) -> Result<RequestTable, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let notes_column = headers
        .iter()
        .position(|h| h.trim_start_matches(BOM).trim() == format.notes_header);
    let day_columns: Vec<usize> = (1..headers.len())
        .filter(|&c| Some(c) != notes_column)
        .collect();
    if day_columns.len() > domain.num_days() as usize {
        debug!(
            columns = day_columns.len(),
            days = domain.num_days(),
            "Ignoring day columns beyond the period"
        );
    }

    let rest_symbol = domain.symbol(domain.roles.rest);
    let mut table = RequestTable::for_domain(domain);
    for result in reader.records().skip(format.metadata_rows) {
        let record = result?;
        let Some(id) = field(&record, 0) else {
            continue;
        };
        let Some(staff) = domain.staff_index(id) else {
            warn!(staff = id, "Request row for unknown staff, skipping");
            continue;
        };
        for (day, &column) in (1..=domain.num_days()).zip(&day_columns) {
            if let Some(symbol) = record.get(column).and_then(|c| decode_cell(c, rest_symbol)) {
                table.set(staff, day, symbol);
            }
        }
    }
    Ok(table)
}

fn field(record: &StringRecord, index: usize) -> Option<&str> {
    record
        .get(index)
        .map(|s| s.trim_start_matches(BOM).trim())
        .filter(|s| !s.is_empty())
}
