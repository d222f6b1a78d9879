// ============================================================
// Layer 4 — Report Loader
// ============================================================
// Loads the cleaned reports CSV using the csv crate.
//
// Expected layout (header row first):
//   [index,] uid, problems, findings, impression
//
// The leading index column is optional; the loader always takes
// the LAST four fields of each record.
//
// The `problems` cell is a list literal such as
//   ['Cardiomegaly', 'Pulmonary Congestion']
//   ["normal"]
//   []
// which is parsed by `parse_list` below.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::report::Report;
use crate::domain::traits::ReportSource;

/// Loads reports from a CSV file.
/// Implements the ReportSource trait from Layer 3.
pub struct CsvReportLoader {
    path: PathBuf,
}

impl CsvReportLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSource for CsvReportLoader {
    fn load_all(&self) -> Result<Vec<Report>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Cannot open reports CSV '{}'", self.path.display()))?;
        let reports = read_reports(file, &self.path)?;
        tracing::info!(
            "Loaded {} reports from '{}'",
            reports.len(),
            self.path.display()
        );
        Ok(reports)
    }
}

/// Parse reports from any reader. Reports are returned sorted by uid;
/// a uid seen twice keeps the later row.
fn read_reports<R: std::io::Read>(input: R, origin: &Path) -> Result<Vec<Report>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut by_uid: BTreeMap<String, Report> = BTreeMap::new();

    for (row, record) in reader.records().enumerate() {
        // +2: one for the header, one for 1-based line numbers
        let line = row + 2;
        let record = record
            .with_context(|| format!("Malformed CSV record at {}:{}", origin.display(), line))?;

        if record.len() < 4 {
            bail!(
                "{}:{}: expected at least 4 columns (uid, problems, findings, impression), got {}",
                origin.display(),
                line,
                record.len()
            );
        }

        let first = record.len() - 4;
        let uid        = record[first].trim().to_string();
        let problems   = parse_list(&record[first + 1])
            .with_context(|| format!("Bad problems list for uid '{uid}' at line {line}"))?;
        let findings   = record[first + 2].to_string();
        let impression = record[first + 3].to_string();

        if uid.is_empty() {
            tracing::warn!("Skipping line {}: empty uid", line);
            continue;
        }

        let report = Report::new(uid.clone(), problems, findings, impression);
        if by_uid.insert(uid.clone(), report).is_some() {
            tracing::warn!("Duplicate uid '{}' at line {} replaces earlier row", uid, line);
        }
    }

    Ok(by_uid.into_values().collect())
}

/// Parse a list literal of strings: `['a', "b"]`.
///
/// Accepts single- or double-quoted items separated by commas, with optional
/// whitespace and an optional trailing comma. Backslash escapes the next
/// character inside a quoted item. An empty cell parses as an empty list.
pub fn parse_list(input: &str) -> Result<Vec<String>> {
    let s = input.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }

    let inner = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .with_context(|| format!("list literal must be wrapped in [ ]: {s:?}"))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        // Skip whitespace before an item or the end
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else { break };
        if quote != '\'' && quote != '"' {
            bail!("expected a quoted string, found {quote:?} in {s:?}");
        }

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => item.push(escaped),
                    None => bail!("dangling escape in {s:?}"),
                },
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            bail!("unterminated string in {s:?}");
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(other) => bail!("expected ',' or ']', found {other:?} in {s:?}"),
        }
    }

    Ok(items)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_single_quotes() {
        let v = parse_list("['Cardiomegaly', 'Pulmonary Congestion']").unwrap();
        assert_eq!(v, vec!["Cardiomegaly", "Pulmonary Congestion"]);
    }

    #[test]
    fn test_parse_list_mixed_quotes_and_trailing_comma() {
        let v = parse_list(r#"[ "normal" , 'it\'s fine', ]"#).unwrap();
        assert_eq!(v, vec!["normal", "it's fine"]);
    }

    #[test]
    fn test_parse_list_empty() {
        assert!(parse_list("[]").unwrap().is_empty());
        assert!(parse_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_rejects_garbage() {
        assert!(parse_list("normal").is_err());
        assert!(parse_list("['unterminated]").is_err());
        assert!(parse_list("[normal]").is_err());
        assert!(parse_list("['a' 'b']").is_err());
    }

    #[test]
    fn test_read_reports_with_index_column() {
        let csv = "\
,uid,problems,findings,impression
0,CXR2,\"['normal']\",Heart size normal.,No acute disease.
1,CXR1,\"['Opacity', 'Atelectasis']\",Patchy opacity.,Left basilar atelectasis.
";
        let reports = read_reports(csv.as_bytes(), Path::new("mem.csv")).unwrap();
        assert_eq!(reports.len(), 2);
        // Sorted by uid
        assert_eq!(reports[0].uid, "CXR1");
        assert_eq!(reports[0].problems, vec!["Opacity", "Atelectasis"]);
        assert_eq!(reports[1].impression, "No acute disease.");
    }

    #[test]
    fn test_read_reports_without_index_and_duplicates() {
        let csv = "\
uid,problems,findings,impression
A,[],f1,first
A,\"['normal']\",f2,second
";
        let reports = read_reports(csv.as_bytes(), Path::new("mem.csv")).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].impression, "second");
    }

    #[test]
    fn test_read_reports_bad_list_is_error() {
        let csv = "uid,problems,findings,impression\nA,oops,f,i\n";
        let err = read_reports(csv.as_bytes(), Path::new("mem.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("uid 'A'"));
    }

    #[test]
    fn test_loader_reads_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.csv");
        std::fs::write(&path, "uid,problems,findings,impression\nX,\"['normal']\",f,i\n").unwrap();
        let reports = CsvReportLoader::new(&path).load_all().unwrap();
        assert_eq!(reports[0].uid, "X");
    }
}
