//! Aggregation engine
//!
//! Pure functions over already-cleaned record collections. No I/O
//! happens here; callers fetch and clean first, then aggregate.

use crate::clean::{Deal, WorkOrder};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Round to one decimal place, the precision both rates are reported at
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Win rate = won / (won + dead) × 100. Open and On Hold deals are
/// excluded from the denominator entirely. `None` when nothing has
/// been decided — never reported as 100% by a zero denominator.
pub fn win_rate(won: u64, dead: u64) -> Option<f64> {
    let decided = won + dead;
    if decided == 0 {
        return None;
    }
    Some(round1(won as f64 / decided as f64 * 100.0))
}

/// Collection rate = collected / billed × 100; `None` when nothing billed
pub fn collection_rate(collected: f64, billed: f64) -> Option<f64> {
    if billed <= 0.0 {
        return None;
    }
    Some(round1(collected / billed * 100.0))
}

/// Null-safe sum: returns the total over present values and how many
/// records actually carried one (the denominator for averages).
pub fn sum_values<'a, I>(values: I) -> (f64, usize)
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut total = 0.0;
    let mut valued = 0;
    for v in values {
        if let Some(v) = v {
            total += v;
            valued += 1;
        }
    }
    (total, valued)
}

/// Group-by-count over an optional field; missing values group as "Unknown"
pub fn breakdown<T, F>(records: &[T], key: F) -> BTreeMap<String, u64>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut groups = BTreeMap::new();
    for record in records {
        let k = key(record).unwrap_or("Unknown").to_string();
        *groups.entry(k).or_insert(0) += 1;
    }
    groups
}

/// Group records by an optional field for per-group metrics
pub fn group_by<'a, T, F>(records: &'a [T], key: F) -> BTreeMap<String, Vec<&'a T>>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut groups: BTreeMap<String, Vec<&T>> = BTreeMap::new();
    for record in records {
        let k = key(record).unwrap_or("Unknown").to_string();
        groups.entry(k).or_default().push(record);
    }
    groups
}

//
// ================= Filtering =================
//

/// Exact-match filters for the deals board, plus an inclusive date
/// range on the tentative close date (records without one are skipped
/// by the range filter).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DealFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure_probability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl DealFilters {
    pub fn matches(&self, deal: &Deal) -> bool {
        let eq = |filter: &Option<String>, value: &Option<String>| match filter {
            Some(f) => value.as_deref() == Some(f.as_str()),
            None => true,
        };

        if !(eq(&self.status, &deal.status)
            && eq(&self.sector, &deal.sector)
            && eq(&self.stage, &deal.stage)
            && eq(&self.owner, &deal.owner)
            && eq(&self.closure_probability, &deal.closure_probability))
        {
            return false;
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            // ISO dates compare correctly as strings
            let Some(tentative) = deal.tentative_close.as_deref() else {
                return false;
            };
            if let Some(from) = self.date_from.as_deref() {
                if tentative < from {
                    return false;
                }
            }
            if let Some(to) = self.date_to.as_deref() {
                if tentative > to {
                    return false;
                }
            }
        }

        true
    }

    pub fn apply<'a>(&self, deals: &'a [Deal]) -> Vec<&'a Deal> {
        deals.iter().filter(|d| self.matches(d)).collect()
    }
}

/// Exact-match filters for the work-orders board
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkOrderFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nature_of_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wo_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl WorkOrderFilters {
    pub fn matches(&self, wo: &WorkOrder) -> bool {
        let eq = |filter: &Option<String>, value: &Option<String>| match filter {
            Some(f) => value.as_deref() == Some(f.as_str()),
            None => true,
        };

        eq(&self.execution_status, &wo.execution_status)
            && eq(&self.sector, &wo.sector)
            && eq(&self.nature_of_work, &wo.nature_of_work)
            && eq(&self.billing_status, &wo.billing_status)
            && eq(&self.wo_status, &wo.wo_status)
            && eq(&self.deal_name, &wo.deal_name)
            && eq(&self.owner, &wo.owner)
    }

    pub fn apply<'a>(&self, wos: &'a [WorkOrder]) -> Vec<&'a WorkOrder> {
        wos.iter().filter(|w| self.matches(w)).collect()
    }
}

//
// ================= Cross-board join =================
//

/// The joined view of one deal with its matched work orders' financials
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEntry {
    pub deal_name: String,
    pub deal_status: Option<String>,
    pub deal_stage: Option<String>,
    pub deal_value: Option<f64>,
    pub deal_value_formatted: String,
    pub sector: Option<String>,
    pub owner: Option<String>,
    pub work_order_count: usize,
    pub wo_total_amount: f64,
    pub wo_total_amount_formatted: String,
    pub wo_total_billed: f64,
    pub wo_total_billed_formatted: String,
    pub wo_total_collected: f64,
    pub wo_total_collected_formatted: String,
    pub wo_total_receivable: f64,
    pub wo_total_receivable_formatted: String,
    pub wo_statuses: Vec<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct JoinResult {
    pub lifecycle: Vec<LifecycleEntry>,
    pub common_deal_count: usize,
    pub deals_only_count: usize,
    pub wo_only_count: usize,
}

/// Join deals and work orders by deal name. The name sets come
/// strictly from the (already filtered) cleaned records given here.
pub fn lifecycle_join(deals: &[&Deal], workorders: &[&WorkOrder]) -> JoinResult {
    let deal_names: HashSet<&str> = deals.iter().map(|d| d.name.as_str()).collect();
    let wo_names: HashSet<&str> = workorders
        .iter()
        .filter_map(|w| w.deal_name.as_deref())
        .collect();

    let mut common: Vec<&str> = deal_names.intersection(&wo_names).copied().collect();
    common.sort_unstable();

    let lifecycle = common
        .iter()
        .filter_map(|name| {
            let deal = deals.iter().find(|d| d.name == *name)?;
            let wos: Vec<&&WorkOrder> = workorders
                .iter()
                .filter(|w| w.deal_name.as_deref() == Some(*name))
                .collect();

            let (amount, _) = sum_values(wos.iter().map(|w| w.amount_excl));
            let (billed, _) = sum_values(wos.iter().map(|w| w.billed_excl));
            let (collected, _) = sum_values(wos.iter().map(|w| w.collected));
            let (receivable, _) = sum_values(wos.iter().map(|w| w.receivable));

            Some(LifecycleEntry {
                deal_name: name.to_string(),
                deal_status: deal.status.clone(),
                deal_stage: deal.stage.clone(),
                deal_value: deal.value,
                deal_value_formatted: format_currency(deal.value),
                sector: deal.sector.clone(),
                owner: deal.owner.clone(),
                work_order_count: wos.len(),
                wo_total_amount: amount,
                wo_total_amount_formatted: format_currency(Some(amount)),
                wo_total_billed: billed,
                wo_total_billed_formatted: format_currency(Some(billed)),
                wo_total_collected: collected,
                wo_total_collected_formatted: format_currency(Some(collected)),
                wo_total_receivable: receivable,
                wo_total_receivable_formatted: format_currency(Some(receivable)),
                wo_statuses: wos.iter().map(|w| w.execution_status.clone()).collect(),
            })
        })
        .collect::<Vec<_>>();

    JoinResult {
        common_deal_count: common.len(),
        deals_only_count: deal_names.difference(&wo_names).count(),
        wo_only_count: wo_names.difference(&deal_names).count(),
        lifecycle,
    }
}

//
// ================= Display formatting =================
//

/// Format a value in Indian currency notation. Display-only: the
/// underlying numeric value is never altered by this transform.
pub fn format_currency(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "N/A".to_string();
    };

    if value >= 10_000_000.0 {
        format!("₹{:.2} Cr", value / 10_000_000.0)
    } else if value >= 100_000.0 {
        format!("₹{:.2} L", value / 100_000.0)
    } else {
        format!("₹{}", group_thousands(value.round() as i64))
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(name: &str, status: Option<&str>, value: Option<f64>) -> Deal {
        Deal {
            item_id: name.to_string(),
            name: name.to_string(),
            status: status.map(|s| s.to_string()),
            stage: None,
            sector: None,
            owner: None,
            closure_probability: None,
            value,
            close_date: None,
            tentative_close: None,
            created: None,
        }
    }

    fn wo(deal_name: Option<&str>, amount: Option<f64>, billed: Option<f64>, collected: Option<f64>) -> WorkOrder {
        WorkOrder {
            item_id: "1".to_string(),
            name: "wo".to_string(),
            serial: None,
            deal_name: deal_name.map(|s| s.to_string()),
            customer: None,
            sector: None,
            execution_status: Some("Ongoing".to_string()),
            nature_of_work: None,
            type_of_work: None,
            owner: None,
            wo_status: None,
            billing_status: None,
            qty_po: None,
            qty_ops: None,
            qty_balance: None,
            amount_excl: amount,
            amount_incl: None,
            billed_excl: billed,
            billed_incl: None,
            collected,
            to_bill_excl: None,
            to_bill_incl: None,
            receivable: None,
        }
    }

    #[test]
    fn win_rate_rounds_to_one_decimal() {
        assert_eq!(win_rate(165, 127), Some(56.5));
        assert_eq!(win_rate(1, 2), Some(33.3));
    }

    #[test]
    fn win_rate_null_when_nothing_decided() {
        assert_eq!(win_rate(0, 0), None);
    }

    #[test]
    fn win_rate_hundred_only_when_dead_is_zero() {
        assert_eq!(win_rate(3, 0), Some(100.0));
        assert_ne!(win_rate(3, 1), Some(100.0));
    }

    #[test]
    fn collection_rate_null_when_nothing_billed() {
        assert_eq!(collection_rate(500.0, 0.0), None);
        assert_eq!(collection_rate(500.0, 1000.0), Some(50.0));
    }

    #[test]
    fn sum_skips_nulls_but_counts_valued() {
        let (total, valued) = sum_values(vec![Some(10.0), None, Some(5.0)]);
        assert_eq!(total, 15.0);
        assert_eq!(valued, 2);
    }

    #[test]
    fn breakdown_missing_groups_as_unknown() {
        let deals = vec![
            deal("A", Some("Won"), None),
            deal("B", None, None),
            deal("C", Some("Won"), None),
        ];
        let b = breakdown(&deals, |d: &Deal| d.status.as_deref());
        assert_eq!(b.get("Won"), Some(&2));
        assert_eq!(b.get("Unknown"), Some(&1));
    }

    #[test]
    fn date_range_filter_skips_dateless_records() {
        let mut with_date = deal("A", Some("Open"), None);
        with_date.tentative_close = Some("2024-06-01".to_string());
        let without_date = deal("B", Some("Open"), None);

        let filters = DealFilters {
            date_from: Some("2024-01-01".to_string()),
            date_to: Some("2024-12-31".to_string()),
            ..Default::default()
        };

        assert!(filters.matches(&with_date));
        assert!(!filters.matches(&without_date));
    }

    #[test]
    fn lifecycle_join_counts_and_financials() {
        let deals = vec![deal("Alpha", Some("Won"), Some(100.0)), deal("Beta", Some("Open"), None)];
        let wos = vec![
            wo(Some("Beta"), Some(50.0), Some(40.0), Some(20.0)),
            wo(Some("Beta"), Some(30.0), None, Some(10.0)),
            wo(Some("Gamma"), Some(99.0), None, None),
        ];

        let deal_refs: Vec<&Deal> = deals.iter().collect();
        let wo_refs: Vec<&WorkOrder> = wos.iter().collect();
        let result = lifecycle_join(&deal_refs, &wo_refs);

        assert_eq!(result.common_deal_count, 1);
        assert_eq!(result.deals_only_count, 1);
        assert_eq!(result.wo_only_count, 1);

        let entry = &result.lifecycle[0];
        assert_eq!(entry.deal_name, "Beta");
        assert_eq!(entry.work_order_count, 2);
        assert_eq!(entry.wo_total_amount, 80.0);
        assert_eq!(entry.wo_total_billed, 40.0);
        assert_eq!(entry.wo_total_collected, 30.0);
    }

    #[test]
    fn currency_formatting_bands() {
        assert_eq!(format_currency(Some(25_000_000.0)), "₹2.50 Cr");
        assert_eq!(format_currency(Some(250_000.0)), "₹2.50 L");
        assert_eq!(format_currency(Some(9_500.0)), "₹9,500");
        assert_eq!(format_currency(None), "N/A");
    }
}
