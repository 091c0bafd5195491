use std::fs;
use std::path::Path;

use crate::data::model::{Channel, Measurement};
use crate::error::{IngestError, Warning};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a delimited measurement file into an ordered `Measurement` sequence.
///
/// Encoding (UTF-8, then Latin-1) and delimiter (`,` / `;` / tab) are
/// detected; column roles are matched case-insensitively against the alias
/// table. Rows that fail to parse are skipped and reported as warnings, so a
/// single bad row never aborts the file; only a file with zero valid rows
/// fails.
pub fn load_file(path: &Path, aliases: &ColumnAliases) -> Result<Ingested, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, encoding) = decode(&bytes).ok_or_else(|| IngestError::Encoding {
        path: path.to_path_buf(),
    })?;

    let ingested = parse_text(&text, encoding, path, aliases)?;

    log::info!(
        "ingested {}: {} measurements, {} warnings ({:?}, delimiter {:?})",
        path.display(),
        ingested.measurements.len(),
        ingested.warnings.len(),
        encoding,
        ingested.delimiter as char,
    );
    Ok(ingested)
}

/// Result of a successful ingestion: the parsed sequence plus everything the
/// caller needs to report on how the file was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub measurements: Vec<Measurement>,
    pub warnings: Vec<Warning>,
    pub encoding: Encoding,
    pub delimiter: u8,
}

/// Encoding under which the file decoded, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

/// Recognised header spellings per column role, compared lowercased and
/// trimmed. Defaults cover the instrument export this tool grew up with
/// (`Identifier 1`, `d(18_16)Mean`, `d(D_H)Mean`, `Inj Nr`, `H2O_Mean`).
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    pub sample: Vec<String>,
    pub d18o: Vec<String>,
    pub d2h: Vec<String>,
    pub replicate: Vec<String>,
    pub water: Vec<String>,
    pub session: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        fn list(names: &[&str]) -> Vec<String> {
            names.iter().map(|n| n.to_string()).collect()
        }
        Self {
            sample: list(&["identifier 1", "identifier", "sample", "sample name"]),
            d18o: list(&["d(18_16)mean", "d18o", "d18om", "delta 18o", "delta18o"]),
            d2h: list(&["d(d_h)mean", "d2h", "d2hm", "delta 2h", "delta2h"]),
            replicate: list(&["inj nr", "injection", "replicate", "rep"]),
            water: list(&["h2o_mean", "h2o", "water"]),
            session: list(&["session", "block", "run"]),
        }
    }
}

/// Resolved header positions. `water` is recognised but its values are not
/// consumed: water content is not a calibrated channel.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    sample: usize,
    d18o: usize,
    d2h: usize,
    replicate: Option<usize>,
    #[allow(dead_code)]
    water: Option<usize>,
    session: Option<usize>,
}

// ---------------------------------------------------------------------------
// Encoding detection
// ---------------------------------------------------------------------------

/// Try the candidate encodings in priority order; first success wins.
///
/// Latin-1 maps every byte, so in practice only a pathological candidate list
/// leaves this returning `None`. The contract is still "first encoding that
/// decodes", not "Latin-1 always saves the day".
fn decode(bytes: &[u8]) -> Option<(String, Encoding)> {
    // UTF-8, tolerating a BOM (instrument software on Windows writes one).
    let stripped = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(stripped) {
        return Some((text.to_string(), Encoding::Utf8));
    }

    // Latin-1: every byte maps directly to the same code point.
    let text: String = stripped.iter().map(|&b| b as char).collect();
    Some((text, Encoding::Latin1))
}

// ---------------------------------------------------------------------------
// Delimiter detection and header mapping
// ---------------------------------------------------------------------------

const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Pick the delimiter whose header resolves the most required roles,
/// breaking ties by column count.
fn detect_delimiter(header_line: &str, aliases: &ColumnAliases) -> Option<u8> {
    let mut best: Option<(usize, usize, u8)> = None;
    for &delim in &CANDIDATE_DELIMITERS {
        let tokens: Vec<&str> = header_line.split(delim as char).collect();
        let roles = count_required_roles(&tokens, aliases);
        let candidate = (roles, tokens.len(), delim);
        if best.map_or(true, |b| (candidate.0, candidate.1) > (b.0, b.1)) {
            best = Some(candidate);
        }
    }
    // A single-token header means no candidate actually split anything.
    best.filter(|&(_, columns, _)| columns >= 2).map(|b| b.2)
}

fn count_required_roles(tokens: &[&str], aliases: &ColumnAliases) -> usize {
    [&aliases.sample, &aliases.d18o, &aliases.d2h]
        .iter()
        .filter(|list| find_column(tokens, list).is_some())
        .count()
}

fn find_column(tokens: &[&str], aliases: &[String]) -> Option<usize> {
    tokens.iter().position(|t| {
        let t = t.trim().to_lowercase();
        aliases.iter().any(|a| *a == t)
    })
}

fn map_columns(
    headers: &[&str],
    aliases: &ColumnAliases,
    path: &Path,
) -> Result<ColumnMap, IngestError> {
    let require = |list: &[String], role: &str| {
        find_column(headers, list).ok_or_else(|| IngestError::Schema {
            path: path.to_path_buf(),
            role: role.to_string(),
        })
    };
    Ok(ColumnMap {
        sample: require(&aliases.sample, "sample identifier")?,
        d18o: require(&aliases.d18o, "δ18O value")?,
        d2h: require(&aliases.d2h, "δ2H value")?,
        replicate: find_column(headers, &aliases.replicate),
        water: find_column(headers, &aliases.water),
        session: find_column(headers, &aliases.session),
    })
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// Parse decoded text. Split out from [`load_file`] so tests can feed
/// in-memory content without touching the filesystem.
pub fn parse_text(
    text: &str,
    encoding: Encoding,
    path: &Path,
    aliases: &ColumnAliases,
) -> Result<Ingested, IngestError> {
    let header_line = text.lines().next().filter(|l| !l.trim().is_empty()).ok_or_else(|| {
        IngestError::Format {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        }
    })?;

    let delimiter = detect_delimiter(header_line, aliases).ok_or_else(|| IngestError::Format {
        path: path.to_path_buf(),
        reason: "no delimiter yields a parseable header".to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    let columns = map_columns(&header_refs, aliases, path)?;

    let mut measurements = Vec::new();
    let mut warnings = Vec::new();

    for (row_no, record) in reader.records().enumerate() {
        let line = (row_no + 2) as u64; // 1-based, after the header
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warnings.push(Warning::SkippedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let sample = record.get(columns.sample).unwrap_or("").trim().to_string();
        if sample.is_empty() {
            warnings.push(Warning::SkippedRow {
                line,
                reason: "empty sample identifier".to_string(),
            });
            continue;
        }

        let replicate = columns
            .replicate
            .and_then(|i| record.get(i))
            .and_then(|s| s.trim().parse::<u32>().ok());
        let session = columns
            .session
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        for (channel, index) in [(Channel::Delta18O, columns.d18o), (Channel::Delta2H, columns.d2h)]
        {
            match parse_decimal(record.get(index).unwrap_or("")) {
                Some(value) => {
                    measurements.push(Measurement {
                        sample: sample.clone(),
                        channel,
                        value,
                        replicate,
                        session: session.clone(),
                    });
                }
                None => warnings.push(Warning::SkippedRow {
                    line,
                    reason: format!("unparseable {channel} value"),
                }),
            }
        }
    }

    if measurements.is_empty() {
        return Err(IngestError::Format {
            path: path.to_path_buf(),
            reason: "no valid measurement rows".to_string(),
        });
    }

    Ok(Ingested {
        measurements,
        warnings,
        encoding,
        delimiter,
    })
}

/// Parse a floating point field, accepting `,` as the decimal separator
/// (continental instrument exports). Non-finite values are rejected.
fn parse_decimal(field: &str) -> Option<f64> {
    let cleaned = field.trim().replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
