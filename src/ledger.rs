// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Append-only CSV ledgers: the audit log and the financial report

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::classifier::ClassificationResult;
use crate::config::Session;
use crate::Result;

pub const AUDIT_HEADERS: [&str; 5] = ["Time", "Original", "Category", "New Name", "Status"];
pub const FINANCE_HEADERS: [&str; 5] = ["Date", "Vendor", "Amount", "Category", "File"];

/// Terminal status of a processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Success,
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One row of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Original")]
    pub original: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "New Name")]
    pub new_name: String,
    #[serde(rename = "Status")]
    pub status: AuditStatus,
}

/// One row of the financial report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "File")]
    pub file: String,
}

impl FinanceRecord {
    /// Build a row from classifier metadata, filling the gaps with placeholders
    pub fn from_result(result: &ClassificationResult, file_name: &str) -> Self {
        fn or(value: &Option<String>, fallback: &str) -> String {
            value.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        }

        let category = if result.category.trim().is_empty() {
            "Expense".to_string()
        } else {
            result.category.clone()
        };

        Self {
            date: or(&result.date, "N/A"),
            vendor: or(&result.vendor, "Unknown"),
            amount: or(&result.amount, "0.00"),
            category,
            file: file_name.to_string(),
        }
    }
}

/// Writer for both ledgers of a session
///
/// Every write failure is logged and swallowed: a missing ledger row never
/// stops a file from being moved.
pub struct Ledger {
    audit_path: PathBuf,
    finance_path: PathBuf,
    audit_lock: Mutex<()>,
    finance_lock: Mutex<()>,
}

impl Ledger {
    /// Open the ledgers of a session, writing headers to new files
    pub fn new(session: &Session) -> Self {
        let ledger = Self {
            audit_path: session.audit_log.clone(),
            finance_path: session.finance_report.clone(),
            audit_lock: Mutex::new(()),
            finance_lock: Mutex::new(()),
        };

        for (path, headers) in [(&ledger.audit_path, AUDIT_HEADERS), (&ledger.finance_path, FINANCE_HEADERS)] {
            if let Err(e) = init_csv(path, &headers) {
                warn!("CSV init error for {:?}: {}", path, e);
            }
        }

        ledger
    }

    /// Append a terminal outcome to the audit log
    pub fn record_event(&self, original: &str, category: &str, final_name: &str, status: AuditStatus) {
        let record = AuditRecord {
            time: Local::now().format("%H:%M:%S").to_string(),
            original: original.to_string(),
            category: category.to_string(),
            new_name: final_name.to_string(),
            status,
        };

        let _guard = self.audit_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_row(&self.audit_path, &record) {
            warn!("Audit log write failed for {}: {}", original, e);
        }
    }

    /// Append a finance row if the result is financial; returns whether one was due
    pub fn record_finance(&self, result: &ClassificationResult, final_name: &str) -> bool {
        if !result.is_financial() {
            return false;
        }

        let record = FinanceRecord::from_result(result, final_name);

        let _guard = self.finance_lock.lock().unwrap_or_else(|e| e.into_inner());
        match append_row(&self.finance_path, &record) {
            Ok(()) => info!("FINANCES LOGGED: {} | ${}", record.vendor, record.amount),
            Err(e) => warn!("Financial report write failed for {}: {}", final_name, e),
        }
        true
    }
}

fn init_csv(path: &Path, headers: &[&str]) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    writer.flush()?;
    Ok(())
}

fn append_row<T: Serialize>(path: &Path, row: &T) -> Result<()> {
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

/// Read every audit row of a ledger file
pub fn read_audit(path: &Path) -> Result<Vec<AuditRecord>> {
    read_rows(path)
}

/// Read every finance row of a ledger file
pub fn read_finance(path: &Path) -> Result<Vec<FinanceRecord>> {
    read_rows(path)
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping malformed ledger row in {:?}: {}", path, e),
        }
    }
    Ok(rows)
}

/// Totals over a session's ledgers
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub per_category: BTreeMap<String, usize>,
    pub finance_rows: usize,
}

impl LedgerSummary {
    pub fn from_records(audit: &[AuditRecord], finance: &[FinanceRecord]) -> Self {
        let mut summary = Self { finance_rows: finance.len(), ..Self::default() };
        for record in audit {
            match record.status {
                AuditStatus::Success => {
                    summary.succeeded += 1;
                    *summary.per_category.entry(record.category.clone()).or_default() += 1;
                }
                AuditStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Summarize the ledgers of an existing session directory
    pub fn load(session: &Session) -> Result<Self> {
        let audit = read_audit(&session.audit_log)?;
        let finance = read_finance(&session.finance_report)?;
        Ok(Self::from_records(&audit, &finance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(dir: &Path) -> Session {
        Session::at(dir.to_path_buf(), Local::now())
    }

    fn aws_bill() -> ClassificationResult {
        ClassificationResult {
            category: "INVOICE".to_string(),
            new_filename: "Invoice_AWS_2025".to_string(),
            is_expense: true,
            vendor: Some("AWS".to_string()),
            amount: Some("450.00".to_string()),
            date: Some("2025-12-01".to_string()),
        }
    }

    #[test]
    fn test_headers_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        Ledger::new(&session).record_event("a.txt", "OTHER", "Doc.txt", AuditStatus::Success);
        Ledger::new(&session);

        let content = std::fs::read_to_string(&session.audit_log).unwrap();
        assert_eq!(content.matches("Time,Original,Category,New Name,Status").count(), 1);
        assert_eq!(
            std::fs::read_to_string(&session.finance_report).unwrap(),
            "Date,Vendor,Amount,Category,File\n"
        );
    }

    #[test]
    fn test_finance_row_for_expense() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let ledger = Ledger::new(&session);

        assert!(ledger.record_finance(&aws_bill(), "Invoice_AWS_2025.txt"));

        let rows = read_finance(&session.finance_report).unwrap();
        assert_eq!(rows, vec![FinanceRecord {
            date: "2025-12-01".to_string(),
            vendor: "AWS".to_string(),
            amount: "450.00".to_string(),
            category: "INVOICE".to_string(),
            file: "Invoice_AWS_2025.txt".to_string(),
        }]);
    }

    #[test]
    fn test_no_finance_row_for_plain_documents() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let ledger = Ledger::new(&session);

        assert!(!ledger.record_finance(&ClassificationResult::named("RESUME", "Resume_John"), "Resume_John.pdf"));
        assert!(read_finance(&session.finance_report).unwrap().is_empty());
    }

    #[test]
    fn test_finance_placeholders() {
        let mut result = ClassificationResult::named("", "Receipt");
        result.amount = Some("12".to_string());
        let record = FinanceRecord::from_result(&result, "Receipt.png");
        assert_eq!(record.date, "N/A");
        assert_eq!(record.vendor, "Unknown");
        assert_eq!(record.amount, "12");
        assert_eq!(record.category, "Expense");
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let ledger = Ledger::new(&session);

        ledger.record_event("report, final.txt", "OTHER", "Report.txt", AuditStatus::Failed);

        let rows = read_audit(&session.audit_log).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].original, "report, final.txt");
        assert_eq!(rows[0].status, AuditStatus::Failed);
    }

    #[test]
    fn test_write_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir.path().join("does-not-exist"));
        let ledger = Ledger::new(&session);

        ledger.record_event("a.txt", "OTHER", "Doc.txt", AuditStatus::Success);
        assert!(ledger.record_finance(&aws_bill(), "Invoice_AWS_2025.txt"));
        assert!(!session.audit_log.exists());
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let ledger = Ledger::new(&session);
        ledger.record_event("a.txt", "INVOICE", "A.txt", AuditStatus::Success);
        ledger.record_event("b.txt", "INVOICE", "B.txt", AuditStatus::Success);
        ledger.record_event("c.txt", "RESUME", "C.txt", AuditStatus::Success);
        ledger.record_event("d.txt", "OTHER", "D.txt", AuditStatus::Failed);
        ledger.record_finance(&aws_bill(), "A.txt");

        let summary = LedgerSummary::load(&session).unwrap();
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.per_category.get("INVOICE"), Some(&2));
        assert_eq!(summary.finance_rows, 1);
    }
}
