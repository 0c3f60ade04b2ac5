//! Append-only per-worker trial ledger.
//!
//! One CSV row per trial number: the suggested parameters, every metric the
//! training routine returned, and the pruned flag. Each write merges the
//! in-memory rows with whatever is already on disk (known columns only),
//! keeps the newest row per trial number, sorts ascending, and rewrites the
//! whole file. Concurrent workers must use distinct ledger files; the
//! adapter keys the file name on the worker id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::info;

use hs_types::{HsResult, ObjectiveError, ParameterValue};

/// In-memory ledger bound to one CSV file.
#[derive(Debug)]
pub struct TrialLedger {
    path: PathBuf,
    rows: BTreeMap<usize, HashMap<String, String>>,
    columns: BTreeSet<String>,
}

impl TrialLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rows: BTreeMap::new(),
            columns: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one trial's row in memory. A later append for the same trial
    /// number replaces the earlier one.
    pub fn append(
        &mut self,
        trial_number: usize,
        params: &HashMap<String, ParameterValue>,
        metrics: &HashMap<String, f64>,
        pruned: bool,
    ) {
        let mut row = HashMap::new();
        for (name, value) in params {
            row.insert(name.clone(), value.to_string());
            self.columns.insert(name.clone());
        }
        for (name, value) in metrics {
            row.insert(name.clone(), value.to_string());
            self.columns.insert(name.clone());
        }
        row.insert("pruned".to_string(), (pruned as u8).to_string());
        self.rows.insert(trial_number, row);
    }

    /// Merge the on-disk ledger and rewrite the file: in-memory rows win on
    /// trial-number conflicts, only columns this ledger knows are carried
    /// over, rows come out sorted by trial number.
    pub fn save(&mut self) -> HsResult<()> {
        if self.path.is_file() {
            self.merge_from_disk()?;
        }
        self.write()?;
        info!("Saved {} trial row(s) to {}", self.rows.len(), self.path.display());
        Ok(())
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["trial".to_string()];
        header.extend(self.columns.iter().cloned());
        header.push("pruned".to_string());
        header
    }

    fn merge_from_disk(&mut self) -> HsResult<()> {
        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|e| ObjectiveError::LedgerFailed {
                message: format!("reading {}: {e}", self.path.display()),
            })?;
        let headers = reader.headers()?.clone();

        for record in reader.records() {
            let record = record?;
            let mut fields: HashMap<&str, &str> = HashMap::new();
            for (name, value) in headers.iter().zip(record.iter()) {
                fields.insert(name, value);
            }

            let Some(number) = fields.get("trial").and_then(|v| v.parse::<usize>().ok()) else {
                continue;
            };
            // Newest write wins: skip trials the in-memory ledger already has.
            if self.rows.contains_key(&number) {
                continue;
            }

            let mut row = HashMap::new();
            for column in &self.columns {
                if let Some(value) = fields.get(column.as_str()) {
                    row.insert(column.clone(), (*value).to_string());
                }
            }
            if let Some(pruned) = fields.get("pruned") {
                row.insert("pruned".to_string(), (*pruned).to_string());
            }
            self.rows.insert(number, row);
        }
        Ok(())
    }

    fn write(&self) -> HsResult<()> {
        let mut writer =
            csv::Writer::from_path(&self.path).map_err(|e| ObjectiveError::LedgerFailed {
                message: format!("writing {}: {e}", self.path.display()),
            })?;

        let header = self.header();
        writer.write_record(&header)?;
        for (number, row) in &self.rows {
            let mut record = vec![number.to_string()];
            for column in &header[1..] {
                record.push(row.get(column).cloned().unwrap_or_default());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn params(x: f64) -> HashMap<String, ParameterValue> {
        let mut map = HashMap::new();
        map.insert("x".to_string(), ParameterValue::Float(x));
        map
    }

    fn metrics(loss: f64) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        map.insert("val_loss".to_string(), loss);
        map
    }

    #[test]
    fn rows_come_out_sorted_by_trial_number() {
        let dir = tempdir().unwrap();
        let mut ledger = TrialLedger::new(dir.path().join("results.csv"));
        ledger.append(2, &params(0.2), &metrics(0.9), false);
        ledger.append(0, &params(0.0), &metrics(0.5), false);
        ledger.append(1, &params(0.1), &metrics(0.7), true);
        ledger.save().unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "trial,val_loss,x,pruned");
        assert!(lines[1].starts_with("0,"));
        assert!(lines[2].starts_with("1,"));
        assert!(lines[3].starts_with("2,"));
        assert!(lines[2].ends_with(",1")); // pruned flag
    }

    #[test]
    fn rewrite_of_existing_trial_wins_over_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let mut first = TrialLedger::new(&path);
        first.append(1, &params(0.1), &metrics(0.7), false);
        first.append(2, &params(0.2), &metrics(0.8), false);
        first.append(3, &params(0.3), &metrics(0.9), false);
        first.save().unwrap();

        // A fresh ledger (new process) rewrites trial 2 with new values.
        let mut second = TrialLedger::new(&path);
        second.append(2, &params(0.25), &metrics(0.42), false);
        second.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4); // header + trials 1,2,3
        let trial2: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(trial2[0], "2");
        assert_eq!(trial2[1], "0.42");
        assert_eq!(trial2[2], "0.25");
    }

    #[test]
    fn unknown_disk_columns_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "trial,val_loss,x,stale,pruned\n0,0.5,0.1,junk,0\n").unwrap();

        let mut ledger = TrialLedger::new(&path);
        ledger.append(1, &params(0.2), &metrics(0.6), false);
        ledger.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.lines().count() == 3);
    }
}
