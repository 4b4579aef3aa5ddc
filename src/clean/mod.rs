//! Data reconciliation engine
//!
//! The external boards carry known quality issues: duplicate header
//! rows, mixed date formats, a cased typo in the billing status,
//! quantities with trailing units, and high null rates. Each pipeline
//! turns raw records into typed ones and reports what it changed.
//!
//! Every invocation returns its own [`CleanOutcome`]; there is no
//! shared cleaning log, so concurrent cleans cannot corrupt each other.

use crate::board::RawRecord;
use crate::config::{deal_cols, wo_cols};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Result of one cleaning invocation
#[derive(Debug, Clone)]
pub struct CleanOutcome<T> {
    pub records: Vec<T>,
    pub caveats: Vec<String>,
    pub cleaning_steps: Vec<String>,
}

/// A cleaned deal-pipeline record. Monetary fields are numeric or
/// absent — never a string.
#[derive(Debug, Clone, Serialize)]
pub struct Deal {
    pub item_id: String,
    pub name: String,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub sector: Option<String>,
    pub owner: Option<String>,
    pub closure_probability: Option<String>,
    pub value: Option<f64>,
    pub close_date: Option<String>,
    pub tentative_close: Option<String>,
    pub created: Option<String>,
}

/// A cleaned work-order record
#[derive(Debug, Clone, Serialize)]
pub struct WorkOrder {
    pub item_id: String,
    pub name: String,
    pub serial: Option<String>,
    pub deal_name: Option<String>,
    pub customer: Option<String>,
    pub sector: Option<String>,
    pub execution_status: Option<String>,
    pub nature_of_work: Option<String>,
    pub type_of_work: Option<String>,
    pub owner: Option<String>,
    pub wo_status: Option<String>,
    pub billing_status: Option<String>,
    pub qty_po: Option<f64>,
    pub qty_ops: Option<f64>,
    pub qty_balance: Option<f64>,
    pub amount_excl: Option<f64>,
    pub amount_incl: Option<f64>,
    pub billed_excl: Option<f64>,
    pub billed_incl: Option<f64>,
    pub collected: Option<f64>,
    pub to_bill_excl: Option<f64>,
    pub to_bill_incl: Option<f64>,
    pub receivable: Option<f64>,
}

/// Clean deals data: drop duplicate header rows, coerce values and
/// dates, trim categorical fields, then generate caveats.
pub fn clean_deals(raw: &[RawRecord]) -> CleanOutcome<Deal> {
    let mut cleaning_steps = Vec::new();
    let mut records = Vec::with_capacity(raw.len());
    let mut header_rows_removed = 0usize;

    for record in raw {
        if is_header_row(record) {
            header_rows_removed += 1;
            continue;
        }

        records.push(Deal {
            item_id: record.item_id.clone(),
            name: record.name.clone(),
            status: trimmed(record.field(deal_cols::STATUS)),
            stage: trimmed(record.field(deal_cols::STAGE)),
            sector: trimmed(record.field(deal_cols::SECTOR)),
            owner: trimmed(record.field(deal_cols::OWNER)),
            closure_probability: trimmed(record.field(deal_cols::PROBABILITY)),
            value: parse_number(record.field(deal_cols::VALUE)),
            close_date: record.field(deal_cols::CLOSE_DATE).and_then(parse_date),
            tentative_close: record
                .field(deal_cols::TENTATIVE_CLOSE)
                .and_then(parse_date),
            created: record.field(deal_cols::CREATED).and_then(parse_date),
        });
    }

    if header_rows_removed > 0 {
        cleaning_steps.push(format!(
            "Removed {} duplicate header row(s) from data",
            header_rows_removed
        ));
    }

    let caveats = deals_caveats(&records);

    CleanOutcome {
        records,
        caveats,
        cleaning_steps,
    }
}

/// Clean work-orders data: fix the billing-status typo, strip quantity
/// units, coerce financial fields, trim categorical fields.
pub fn clean_workorders(raw: &[RawRecord]) -> CleanOutcome<WorkOrder> {
    let mut cleaning_steps = Vec::new();
    let mut records = Vec::with_capacity(raw.len());
    let mut typo_fixes = 0usize;

    for record in raw {
        let billing_status = match record.field(wo_cols::BILLING_STATUS) {
            Some("BIlled") => {
                typo_fixes += 1;
                Some("Billed".to_string())
            }
            other => other.map(|s| s.to_string()),
        };

        records.push(WorkOrder {
            item_id: record.item_id.clone(),
            name: record.name.clone(),
            serial: record.field(wo_cols::SERIAL).map(|s| s.to_string()),
            deal_name: record.field(wo_cols::DEAL_NAME).map(|s| s.to_string()),
            customer: record.field(wo_cols::CUSTOMER).map(|s| s.to_string()),
            sector: trimmed(record.field(wo_cols::SECTOR)),
            execution_status: trimmed(record.field(wo_cols::EXECUTION_STATUS)),
            nature_of_work: record.field(wo_cols::NATURE).map(|s| s.to_string()),
            type_of_work: record.field(wo_cols::TYPE_OF_WORK).map(|s| s.to_string()),
            owner: record.field(wo_cols::OWNER).map(|s| s.to_string()),
            wo_status: record.field(wo_cols::WO_STATUS).map(|s| s.to_string()),
            billing_status,
            qty_po: record.field(wo_cols::QTY_PO).and_then(parse_quantity),
            qty_ops: record.field(wo_cols::QTY_OPS).and_then(parse_quantity),
            qty_balance: record.field(wo_cols::QTY_BALANCE).and_then(parse_quantity),
            amount_excl: parse_number(record.field(wo_cols::AMOUNT_EXCL)),
            amount_incl: parse_number(record.field(wo_cols::AMOUNT_INCL)),
            billed_excl: parse_number(record.field(wo_cols::BILLED_EXCL)),
            billed_incl: parse_number(record.field(wo_cols::BILLED_INCL)),
            collected: parse_number(record.field(wo_cols::COLLECTED)),
            to_bill_excl: parse_number(record.field(wo_cols::TO_BILL_EXCL)),
            to_bill_incl: parse_number(record.field(wo_cols::TO_BILL_INCL)),
            receivable: parse_number(record.field(wo_cols::RECEIVABLE)),
        });
    }

    if typo_fixes > 0 {
        cleaning_steps.push(format!("Fixed {} typo(s): 'BIlled' -> 'Billed'", typo_fixes));
    }

    let caveats = workorders_caveats(&records);

    CleanOutcome {
        records,
        caveats,
        cleaning_steps,
    }
}

/// Detect rows where values literally equal their own column titles
/// (an exported header re-imported as data). Two or more matches out
/// of four checked fields classifies the row as a header.
fn is_header_row(record: &RawRecord) -> bool {
    let checks = [
        deal_cols::STATUS,
        deal_cols::STAGE,
        deal_cols::SECTOR,
        deal_cols::OWNER,
    ];

    let matches = checks
        .iter()
        .filter(|title| {
            record
                .field(title)
                .map(|v| v.trim() == **title)
                .unwrap_or(false)
        })
        .count();

    matches >= 2
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(|s| s.trim().to_string())
}

/// Parse a value to a float, stripping thousands separators
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    let cleaned = value?.replace(',', "");
    cleaned.trim().parse::<f64>().ok()
}

/// Parse a date string to ISO calendar-date form, trying the known
/// mixed formats in order. Strings containing letters that do not
/// start with a 4-digit year prefix are rejected outright.
pub fn parse_date(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.chars().any(|c| c.is_alphabetic()) && !value.starts_with("20") {
        return None;
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y"];

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }

    None
}

/// Extract the numeric part from quantity strings like "5360 HA"
pub fn parse_quantity(value: &str) -> Option<f64> {
    let numeric: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok()
}

fn pct(count: usize, total: usize) -> f64 {
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Data quality caveats for the deals board. Advisory only.
fn deals_caveats(records: &[Deal]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No deal records returned from the query.".to_string()];
    }

    let total = records.len();
    let mut caveats = Vec::new();

    let null_values = records.iter().filter(|r| r.value.is_none()).count();
    if null_values > 0 {
        caveats.push(format!(
            "{}/{} deals ({}%) have no deal value. Monetary totals are based on {} valued deals only.",
            null_values,
            total,
            pct(null_values, total),
            total - null_values
        ));
    }

    let null_close = records.iter().filter(|r| r.close_date.is_none()).count();
    if null_close as f64 > total as f64 * 0.5 {
        caveats.push(format!(
            "{}/{} deals ({}%) have no actual close date.",
            null_close,
            total,
            pct(null_close, total)
        ));
    }

    let null_prob = records
        .iter()
        .filter(|r| r.closure_probability.is_none())
        .count();
    if null_prob as f64 > total as f64 * 0.5 {
        caveats.push(format!(
            "{}/{} deals ({}%) have no closure probability assigned.",
            null_prob,
            total,
            pct(null_prob, total)
        ));
    }

    let null_tentative = records
        .iter()
        .filter(|r| r.tentative_close.is_none())
        .count();
    if null_tentative as f64 > total as f64 * 0.1 {
        caveats.push(format!(
            "{}/{} deals ({}%) have no tentative close date.",
            null_tentative,
            total,
            pct(null_tentative, total)
        ));
    }

    caveats
}

/// Data quality caveats for the work-orders board
fn workorders_caveats(records: &[WorkOrder]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No work order records returned from the query.".to_string()];
    }

    let total = records.len();
    let mut caveats = Vec::new();

    let null_collected = records.iter().filter(|r| r.collected.is_none()).count();
    if null_collected > 0 {
        caveats.push(format!(
            "{}/{} work orders ({}%) have no collection data recorded.",
            null_collected,
            total,
            pct(null_collected, total)
        ));
    }

    let null_billed = records.iter().filter(|r| r.billed_excl.is_none()).count();
    if null_billed > 0 {
        caveats.push(format!(
            "{}/{} work orders ({}%) have no billed value recorded.",
            null_billed,
            total,
            pct(null_billed, total)
        ));
    }

    let null_billing = records
        .iter()
        .filter(|r| r.billing_status.is_none())
        .count();
    if null_billing as f64 > total as f64 * 0.5 {
        caveats.push(format!(
            "{}/{} work orders ({}%) have no billing status.",
            null_billing,
            total,
            pct(null_billing, total)
        ));
    }

    caveats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(name: &str, fields: Vec<(&str, Option<&str>)>) -> RawRecord {
        RawRecord {
            item_id: "1".to_string(),
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn deal_raw(status: Option<&str>, stage: Option<&str>, value: Option<&str>) -> RawRecord {
        raw(
            "Deal",
            vec![
                (deal_cols::STATUS, status),
                (deal_cols::STAGE, stage),
                (deal_cols::VALUE, value),
            ],
        )
    }

    #[test]
    fn header_row_with_two_matches_is_dropped() {
        let rows = vec![
            deal_raw(Some("Deal Status"), Some("Deal Stage"), None),
            deal_raw(Some("Won"), Some("G. Project Won"), Some("1,200")),
        ];
        let outcome = clean_deals(&rows);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].status.as_deref(), Some("Won"));
        assert_eq!(
            outcome.cleaning_steps,
            vec!["Removed 1 duplicate header row(s) from data".to_string()]
        );
    }

    #[test]
    fn row_with_single_header_match_is_kept() {
        let rows = vec![deal_raw(Some("Deal Status"), Some("F. Negotiations"), None)];
        let outcome = clean_deals(&rows);
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn deal_value_strips_thousands_separators() {
        let rows = vec![deal_raw(Some("Open"), None, Some("1,234,500"))];
        let outcome = clean_deals(&rows);
        assert_eq!(outcome.records[0].value, Some(1_234_500.0));
    }

    #[test]
    fn non_numeric_deal_value_becomes_null() {
        let rows = vec![deal_raw(Some("Open"), None, Some("TBD"))];
        let outcome = clean_deals(&rows);
        assert_eq!(outcome.records[0].value, None);
    }

    #[test]
    fn billed_typo_is_fixed_exactly() {
        let rows = vec![
            raw("WO1", vec![(wo_cols::BILLING_STATUS, Some("BIlled"))]),
            raw("WO2", vec![(wo_cols::BILLING_STATUS, Some("billed"))]),
            raw("WO3", vec![(wo_cols::BILLING_STATUS, Some("BIlled "))]),
        ];
        let outcome = clean_workorders(&rows);
        assert_eq!(outcome.records[0].billing_status.as_deref(), Some("Billed"));
        assert_eq!(outcome.records[1].billing_status.as_deref(), Some("billed"));
        assert_eq!(outcome.records[2].billing_status.as_deref(), Some("BIlled "));
        assert_eq!(
            outcome.cleaning_steps,
            vec!["Fixed 1 typo(s): 'BIlled' -> 'Billed'".to_string()]
        );
    }

    #[test]
    fn quantity_units_are_stripped() {
        assert_eq!(parse_quantity("5360 HA"), Some(5360.0));
        assert_eq!(parse_quantity("N/A"), None);
        assert_eq!(parse_quantity("12.5 km"), Some(12.5));
    }

    #[test]
    fn date_formats_normalize_to_iso() {
        assert_eq!(parse_date("2024-03-15"), Some("2024-03-15".to_string()));
        assert_eq!(parse_date("15/03/2024"), Some("2024-03-15".to_string()));
        assert_eq!(parse_date("15-03-2024"), Some("2024-03-15".to_string()));
        assert_eq!(
            parse_date("2024-03-15T10:30:00"),
            Some("2024-03-15".to_string())
        );
        assert_eq!(parse_date("March 15"), None);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn empty_deals_emit_single_no_records_caveat() {
        let outcome = clean_deals(&[]);
        assert_eq!(
            outcome.caveats,
            vec!["No deal records returned from the query.".to_string()]
        );
    }

    #[test]
    fn probability_caveat_fires_above_half_missing() {
        let mut rows: Vec<RawRecord> = (0..6)
            .map(|_| deal_raw(Some("Open"), None, Some("100")))
            .collect();
        rows.extend((0..4).map(|_| {
            raw(
                "Deal",
                vec![
                    (deal_cols::STATUS, Some("Open")),
                    (deal_cols::VALUE, Some("100")),
                    (deal_cols::PROBABILITY, Some("High")),
                ],
            )
        }));

        // 60% missing probability → caveat fires
        let outcome = clean_deals(&rows);
        assert!(outcome
            .caveats
            .iter()
            .any(|c| c.contains("closure probability")));
    }

    #[test]
    fn probability_caveat_quiet_at_ten_percent_missing() {
        let mut rows: Vec<RawRecord> = (0..9)
            .map(|_| {
                raw(
                    "Deal",
                    vec![
                        (deal_cols::STATUS, Some("Open")),
                        (deal_cols::VALUE, Some("100")),
                        (deal_cols::PROBABILITY, Some("High")),
                    ],
                )
            })
            .collect();
        rows.push(deal_raw(Some("Open"), None, Some("100")));

        let outcome = clean_deals(&rows);
        assert!(!outcome
            .caveats
            .iter()
            .any(|c| c.contains("closure probability")));
    }

    #[test]
    fn missing_deal_value_always_caveats() {
        let rows = vec![
            deal_raw(Some("Open"), None, None),
            deal_raw(Some("Open"), None, Some("500")),
        ];
        let outcome = clean_deals(&rows);
        assert!(outcome
            .caveats
            .iter()
            .any(|c| c.contains("1/2 deals (50%) have no deal value")));
    }
}
