//! BOM aggregation.
//!
//! Footprints that share an identity key (value, footprint library id and any
//! configured identity fields) become one BOM line. Lines keep the order in which their
//! key first appears in the board file; designators inside a line are sorted
//! naturally.

pub mod natural;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::core::BomOptions;
use crate::parser::pcb_schema::Footprint;

/// What makes two footprints the same part. Compared exactly, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityKey {
    pub value: String,
    /// Full `library:footprint` id; two libraries' `R_0402` stay apart
    pub lib_id: String,
    /// Display name, derived from `lib_id`
    pub package: String,
    /// Values of the configured identity fields, in configured order;
    /// a missing field counts as empty
    pub fields: Vec<String>,
}

impl IdentityKey {
    pub fn of(fp: &Footprint, identity_fields: &[String]) -> Self {
        Self {
            value: fp.value.clone(),
            lib_id: fp.lib_id.clone(),
            package: fp.package.clone(),
            fields: identity_fields
                .iter()
                .map(|name| fp.field(name).unwrap_or("").to_string())
                .collect(),
        }
    }
}

/// One BOM line
#[derive(Debug, Clone, Serialize)]
pub struct BomGroup {
    pub key: IdentityKey,
    /// Naturally sorted designators
    pub references: Vec<String>,
    /// Display values taken from the first member that has them
    pub display_fields: BTreeMap<String, String>,
}

impl BomGroup {
    fn new(key: IdentityKey) -> Self {
        Self {
            key,
            references: Vec::new(),
            display_fields: BTreeMap::new(),
        }
    }

    pub fn value(&self) -> &str {
        &self.key.value
    }

    pub fn package(&self) -> &str {
        &self.key.package
    }

    pub fn quantity(&self) -> usize {
        self.references.len()
    }

    pub fn references_joined(&self) -> String {
        self.references.join(",")
    }

    pub fn display_field(&self, name: &str) -> &str {
        self.display_fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Group the BOM-relevant footprints, in file order of first appearance.
pub fn aggregate(footprints: &[Footprint], options: &BomOptions) -> Vec<BomGroup> {
    let display_fields = options.display_fields();
    let mut groups: Vec<BomGroup> = Vec::new();
    let mut index: HashMap<IdentityKey, usize> = HashMap::new();

    for fp in footprints.iter().filter(|fp| fp.in_bom(options.exclude_dnp)) {
        let key = IdentityKey::of(fp, &options.identity_fields);
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(BomGroup::new(key));
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        group.references.push(fp.reference.clone());
        for name in &display_fields {
            if group.display_fields.contains_key(*name) {
                continue;
            }
            if let Some(value) = fp.field(name).filter(|v| !v.is_empty()) {
                group.display_fields.insert(name.to_string(), value.to_string());
            }
        }
    }

    for group in &mut groups {
        natural::sort(&mut group.references);
    }

    tracing::debug!(
        "Aggregated {} footprints into {} BOM lines",
        footprints.len(),
        groups.len()
    );
    groups
}

pub fn total_quantity(groups: &[BomGroup]) -> usize {
    groups.iter().map(BomGroup::quantity).sum()
}
