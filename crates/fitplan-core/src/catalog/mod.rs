//! External exercise and recipe catalogs, and resolution of free-text plan
//! entries against them.
//!
//! The catalog is owned by an external service; the pipeline only reads it.

pub mod resolve;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use resolve::{
    ExerciseResolution, RecipeResolution, UnresolvedReason, UnresolvedReference,
    resolve_exercise_references, resolve_recipe_references,
};

/// One exercise or recipe from the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, alias = "media_url", skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

/// Catalog items indexed by id and by normalized name.
///
/// When two items share a normalized name the earlier one wins.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut by_id = HashMap::with_capacity(items.len());
        let mut by_name = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            by_id.entry(item.id.clone()).or_insert(idx);
            let key = normalize_name(&item.name);
            if !key.is_empty() {
                by_name.entry(key).or_insert(idx);
            }
        }
        Self {
            items,
            by_id,
            by_name,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn first(&self) -> Option<&CatalogItem> {
        self.items.first()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Exact match on the normalized form of `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&CatalogItem> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        self.by_name.get(&key).map(|&idx| &self.items[idx])
    }

    /// Items whose equipment tag equals `tag`, case-insensitively.
    pub fn with_equipment(&self, tag: &str) -> Vec<&CatalogItem> {
        self.items
            .iter()
            .filter(|item| {
                item.equipment
                    .as_deref()
                    .is_some_and(|e| e.trim().eq_ignore_ascii_case(tag))
            })
            .collect()
    }
}

impl From<Vec<CatalogItem>> for Catalog {
    fn from(items: Vec<CatalogItem>) -> Self {
        Self::new(items)
    }
}

/// Trim, lowercase, and collapse every run of punctuation or whitespace
/// into a single space.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, equipment: Option<&str>) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            name: name.to_string(),
            equipment: equipment.map(str::to_string),
            media: Some(format!("https://cdn.example/{id}.mp4")),
        }
    }

    #[test]
    fn normalizes_punctuation_and_spacing() {
        assert_eq!(normalize_name(" Remo  con barra!!! "), "remo con barra");
        assert_eq!(normalize_name("Press-banca (inclinado)"), "press banca inclinado");
        assert_eq!(normalize_name("Elevación   LATERAL"), "elevación lateral");
        assert_eq!(normalize_name("¡¡!!"), "");
    }

    #[test]
    fn finds_by_normalized_name() {
        let catalog = Catalog::new(vec![item("ex-1", "Remo con barra", None)]);
        let found = catalog.find_by_name(" Remo  con barra!!! ").unwrap();
        assert_eq!(found.id, "ex-1");
        assert!(catalog.find_by_name("remo").is_none());
        assert!(catalog.find_by_name("   ").is_none());
    }

    #[test]
    fn first_item_wins_on_name_collision() {
        let catalog = Catalog::new(vec![
            item("a", "Sentadilla", None),
            item("b", "sentadilla!", None),
        ]);
        assert_eq!(catalog.find_by_name("SENTADILLA").unwrap().id, "a");
        assert_eq!(catalog.get("b").unwrap().name, "sentadilla!");
    }

    #[test]
    fn equipment_filter_is_case_insensitive() {
        let catalog = Catalog::new(vec![
            item("a", "Flexiones", Some("Bodyweight")),
            item("b", "Press banca", Some("Barbell")),
            item("c", "Plancha", Some("bodyweight")),
            item("d", "Burpees", None),
        ]);
        let ids: Vec<&str> = catalog
            .with_equipment("Bodyweight")
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn media_url_alias_deserializes() {
        let parsed: CatalogItem =
            serde_json::from_str(r#"{"id":"r1","name":"Avena","media_url":"x.jpg"}"#).unwrap();
        assert_eq!(parsed.media.as_deref(), Some("x.jpg"));
    }
}
