use crate::model::{Department, LabelAnalysis, NOT_AVAILABLE, Presentation, Reagent, Transaction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Stock held by one brand inside a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandStock {
    pub brand: String,
    pub stock: f64,
    pub id: String,
}

/// Consolidated stock for all brands sharing a reagent name
///
/// Groups are derived on every read and hold no state of their own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryGroup {
    pub name: String,
    pub department: Department,
    pub presentation: Presentation,
    pub total_stock: f64,
    /// Largest minimum configured across the brands
    pub min_stock: f64,
    pub base_unit: String,
    pub container_type: String,
    pub quantity_per_container: f64,
    /// Earliest known expiry date, or `"N/A"`
    pub expiry_date: String,
    pub last_updated: DateTime<Utc>,
    /// True when any brand has a pending order
    pub is_ordered: bool,
    pub brands: Vec<BrandStock>,
}

impl InventoryGroup {
    fn start(r: &Reagent) -> Self {
        InventoryGroup {
            name: r.name.clone(),
            department: r.department,
            presentation: r.presentation,
            total_stock: r.current_stock,
            min_stock: r.min_stock,
            base_unit: r.base_unit.clone(),
            container_type: r.container_type.clone(),
            quantity_per_container: r.quantity_per_container,
            expiry_date: r.expiry_date.clone(),
            last_updated: r.last_updated,
            is_ordered: r.is_ordered,
            brands: vec![BrandStock {
                brand: r.brand.clone(),
                stock: r.current_stock,
                id: r.id.clone(),
            }],
        }
    }

    fn absorb(&mut self, r: &Reagent) {
        self.total_stock += r.current_stock;
        self.min_stock = self.min_stock.max(r.min_stock);
        self.is_ordered |= r.is_ordered;
        if earlier_expiry(&r.expiry_date, &self.expiry_date) {
            self.expiry_date = r.expiry_date.clone();
        }
        if r.last_updated > self.last_updated {
            self.last_updated = r.last_updated;
        }
        self.brands.push(BrandStock {
            brand: r.brand.clone(),
            stock: r.current_stock,
            id: r.id.clone(),
        });
    }

    /// Total stock at or below the effective minimum
    pub fn is_low(&self) -> bool {
        self.total_stock <= self.min_stock
    }

    /// Low and nobody has ordered a replacement yet
    pub fn needs_order(&self) -> bool {
        self.is_low() && !self.is_ordered
    }

    fn matches(&self, filter: &InventoryFilter) -> bool {
        if let Some(dept) = filter.department {
            if self.department != dept {
                return false;
            }
        }
        match filter.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                self.name.to_lowercase().contains(&needle)
                    || self
                        .brands
                        .iter()
                        .any(|b| b.brand.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Search criteria for the inventory listing
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    /// Case-insensitive substring on name or brand
    pub search: Option<String>,
    pub department: Option<Department>,
}

fn parse_expiry(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() || value == NOT_AVAILABLE {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

/// Whether `candidate` is a known expiry earlier than `current` (or `current` is unknown)
fn earlier_expiry(candidate: &str, current: &str) -> bool {
    match (parse_expiry(candidate), parse_expiry(current)) {
        (Some(_), None) => true,
        (Some(c), Some(cur)) => c < cur,
        _ => false,
    }
}

fn group_with<K, F>(reagents: &[Reagent], key: F) -> Vec<InventoryGroup>
where
    K: std::hash::Hash + Eq,
    F: Fn(&Reagent) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<InventoryGroup> = Vec::new();

    for r in reagents.iter().filter(|r| r.is_active()) {
        match index.get(&key(r)) {
            Some(&i) => groups[i].absorb(r),
            None => {
                index.insert(key(r), groups.len());
                groups.push(InventoryGroup::start(r));
            }
        }
    }

    groups
}

/// Group active reagents by lower-cased name, across departments
pub fn group_by_name(reagents: &[Reagent]) -> Vec<InventoryGroup> {
    group_with(reagents, |r| r.name.to_lowercase())
}

/// Group active reagents by lower-cased name within each department
pub fn group_by_name_and_department(reagents: &[Reagent]) -> Vec<InventoryGroup> {
    group_with(reagents, |r| (r.name.to_lowercase(), r.department))
}

/// Inventory listing: per-department groups narrowed by `filter`
pub fn inventory_view(reagents: &[Reagent], filter: &InventoryFilter) -> Vec<InventoryGroup> {
    group_by_name_and_department(reagents)
        .into_iter()
        .filter(|g| g.matches(filter))
        .collect()
}

/// Groups that are low on stock and have no pending order
pub fn low_stock_alerts(reagents: &[Reagent]) -> Vec<InventoryGroup> {
    group_by_name(reagents)
        .into_iter()
        .filter(InventoryGroup::needs_order)
        .collect()
}

/// Active reagents of a department, most used first
///
/// Ordering follows the number of ledger entries per reagent, then the
/// reagent name.
pub fn reagents_for_department<'a>(
    reagents: &'a [Reagent],
    transactions: &[Transaction],
    department: Option<Department>,
) -> Vec<&'a Reagent> {
    let mut usage: HashMap<&str, usize> = HashMap::new();
    for t in transactions {
        *usage.entry(t.reagent_id.as_str()).or_default() += 1;
    }

    let mut list: Vec<&Reagent> = reagents
        .iter()
        .filter(|r| r.is_active())
        .filter(|r| department.is_none_or(|d| r.department == d))
        .collect();

    list.sort_by(|a, b| {
        let ua = usage.get(a.id.as_str()).copied().unwrap_or(0);
        let ub = usage.get(b.id.as_str()).copied().unwrap_or(0);
        ub.cmp(&ua).then_with(|| a.name.cmp(&b.name))
    });
    list
}

/// Exact (case-insensitive) name and brand match for a scanned label
pub fn find_exact_label_match<'a>(
    reagents: &'a [Reagent],
    label: &LabelAnalysis,
) -> Option<&'a Reagent> {
    let name = label.name.to_lowercase();
    let brand = label.brand.to_lowercase();
    reagents
        .iter()
        .filter(|r| r.is_active())
        .find(|r| r.name.to_lowercase() == name && r.brand.to_lowercase() == brand)
}

/// Loose name match for a scanned label: either name contains the other
pub fn find_label_match<'a>(reagents: &'a [Reagent], label_name: &str) -> Option<&'a Reagent> {
    let needle = label_name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    reagents.iter().filter(|r| r.is_active()).find(|r| {
        let name = r.name.to_lowercase();
        name.contains(&needle) || needle.contains(&name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reagent(id: &str, name: &str, brand: &str, stock: f64, min: f64) -> Reagent {
        Reagent {
            id: id.to_string(),
            name: name.to_string(),
            brand: brand.to_string(),
            presentation: Presentation::Liquid,
            current_stock: stock,
            min_stock: min,
            department: Department::Physicochemical,
            base_unit: "mL".to_string(),
            container_type: "Frascos".to_string(),
            quantity_per_container: 500.0,
            expiry_date: NOT_AVAILABLE.to_string(),
            is_ordered: false,
            is_deleted: false,
            last_updated: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn expiry_keeps_earliest_known_date() {
        let mut a = reagent("a", "Etanol", "X", 1.0, 0.0);
        let mut b = reagent("b", "Etanol", "Y", 1.0, 0.0);
        let mut c = reagent("c", "Etanol", "Z", 1.0, 0.0);
        a.expiry_date = "2026-05-01".into();
        b.expiry_date = NOT_AVAILABLE.into();
        c.expiry_date = "2025-12-31".into();
        let groups = group_by_name(&[a, b, c]);
        assert_eq!(groups[0].expiry_date, "2025-12-31");
    }

    #[test]
    fn search_matches_brand_names() {
        let list = vec![
            reagent("a", "Acetona", "Merck", 1.0, 0.0),
            reagent("b", "Etanol", "Sigma", 1.0, 0.0),
        ];
        let filter = InventoryFilter {
            search: Some("sig".into()),
            department: None,
        };
        let view = inventory_view(&list, &filter);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].name, "Etanol");
    }

    #[test]
    fn label_match_works_both_ways() {
        let list = vec![reagent("a", "Acetona", "Merck", 1.0, 0.0)];
        assert!(find_label_match(&list, "acetona grado HPLC").is_some());
        assert!(find_label_match(&list, "ACET").is_some());
        assert!(find_label_match(&list, "").is_none());
    }

    #[test]
    fn alerts_skip_ordered_groups() {
        let mut ordered = reagent("b", "Etanol", "Y", 10.0, 100.0);
        ordered.is_ordered = true;
        let list = vec![
            reagent("a", "Acetona", "X", 50.0, 100.0),
            ordered,
            reagent("c", "Metanol", "Z", 500.0, 100.0),
        ];
        let alerts = low_stock_alerts(&list);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Acetona");
    }

    #[test]
    fn department_list_is_sorted_by_usage() {
        let mut molecular = reagent("m", "Agarosa", "Bio", 1.0, 0.0);
        molecular.department = Department::Molecular;
        let list = vec![
            reagent("a", "Acetona", "X", 1.0, 0.0),
            reagent("e", "Etanol", "Y", 1.0, 0.0),
            molecular,
        ];
        let used = |id: &str| Transaction {
            id: format!("t-{}", id),
            reagent_id: id.to_string(),
            reagent_name: String::new(),
            kind: crate::model::TransactionType::Out,
            quantity: 1.0,
            display_quantity: 1.0,
            display_unit: "mL".to_string(),
            analyst: "Ana".to_string(),
            timestamp: Utc::now(),
        };
        let ledger = vec![used("e"), used("e"), used("a")];

        let ids: Vec<&str> = reagents_for_department(&list, &ledger, Some(Department::Physicochemical))
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["e", "a"]);
        assert_eq!(reagents_for_department(&list, &[], None).len(), 3);
    }
}
