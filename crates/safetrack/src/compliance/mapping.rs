use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use super::domain::{HazardProfile, RecomputeContext, WorkerId};
use super::store::StoreError;

/// Couples organizational roles to the hazard categories they are exposed to.
pub trait RoleHazardMap: Send + Sync {
    fn categories_for(&self, role_name: &str) -> Vec<String>;

    /// Union of categories across `role_names`, de-duplicated.
    fn categories_for_roles(&self, role_names: &[String]) -> BTreeSet<String> {
        role_names
            .iter()
            .flat_map(|name| self.categories_for(name))
            .collect()
    }
}

/// Table-backed role map. Role names match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRoleHazardMap {
    table: BTreeMap<String, Vec<String>>,
}

const STANDARD_ROLE_CATEGORIES: &[(&str, &[&str])] = &[
    ("Electrician", &["Electrical", "Heights", "Confined Space"]),
    ("Welder", &["Hot Work", "Confined Space", "PPE"]),
    ("Scaffolder", &["Heights", "Manual Handling", "PPE"]),
    ("Plumber", &["Confined Space", "Manual Handling", "Hazardous Substances"]),
    ("Labourer", &["Manual Handling", "PPE", "Plant & Machinery"]),
    ("Crane Operator", &["Plant & Machinery", "Heights", "Lifting Operations"]),
    ("Forklift Operator", &["Plant & Machinery", "Manual Handling"]),
    ("Site Supervisor", &["Site Safety", "PPE", "Heights"]),
    ("Painter", &["Heights", "Hazardous Substances", "PPE"]),
];

impl StaticRoleHazardMap {
    /// Built-in construction-site table.
    pub fn standard() -> Self {
        Self::from_entries(STANDARD_ROLE_CATEGORIES.iter().map(|(role, categories)| {
            (
                role.to_string(),
                categories.iter().map(|category| category.to_string()).collect(),
            )
        }))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (role, categories) in entries {
            let slot = table.entry(normalize(&role)).or_default();
            for category in categories {
                if !slot.contains(&category) {
                    slot.push(category);
                }
            }
        }
        Self { table }
    }

    /// Reads a JSON object of `{"Role": ["Category", ...]}`.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_reader(reader)?;
        Ok(Self::from_entries(raw))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RoleMapLoadError> {
        let file = std::fs::File::open(path)?;
        Ok(Self::from_json_reader(file)?)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl RoleHazardMap for StaticRoleHazardMap {
    fn categories_for(&self, role_name: &str) -> Vec<String> {
        self.table
            .get(&normalize(role_name))
            .cloned()
            .unwrap_or_default()
    }
}

fn normalize(role_name: &str) -> String {
    role_name.trim().to_ascii_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum RoleMapLoadError {
    #[error("failed to read role map: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid role map JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of client or site specific hazards layered on top of role-derived exposure.
pub trait HazardOverlay: Send + Sync {
    fn overlay_hazards(
        &self,
        worker_id: &WorkerId,
        context: &RecomputeContext,
    ) -> Result<Vec<HazardProfile>, StoreError>;
}

/// Overlay that contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl HazardOverlay for NoOverlay {
    fn overlay_hazards(
        &self,
        _worker_id: &WorkerId,
        _context: &RecomputeContext,
    ) -> Result<Vec<HazardProfile>, StoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_maps_electrician() {
        let map = StaticRoleHazardMap::standard();
        assert_eq!(
            map.categories_for("electrician"),
            vec!["Electrical", "Heights", "Confined Space"]
        );
        assert!(map.categories_for("Astronaut").is_empty());
    }

    #[test]
    fn union_across_roles_is_deduplicated() {
        let map = StaticRoleHazardMap::standard();
        let categories =
            map.categories_for_roles(&["Electrician".to_string(), "Welder".to_string()]);
        assert_eq!(categories.len(), 5);
        assert!(categories.contains("Confined Space"));
    }

    #[test]
    fn json_table_replaces_builtin() {
        let json = r#"{"Rigger": ["Lifting Operations", "Heights"], " rigger ": ["Heights"]}"#;
        let map = StaticRoleHazardMap::from_json_reader(json.as_bytes()).expect("parses");
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.categories_for("RIGGER"),
            vec!["Heights", "Lifting Operations"]
        );
        assert!(map.categories_for("Electrician").is_empty());
    }
}
