//! The closed set of problem/praise categories reviews are mapped onto.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Label text, also what entailment scoring sees.
    pub name: String,
    /// Canonical phrases; embedding scores against the closest one.
    pub exemplars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub categories: Vec<Category>,
}

const RESTAURANT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Food Temperature",
        &["food was cold", "not hot", "arrived cold", "temperature bad", "served hot"],
    ),
    (
        "Taste & Flavor",
        &["bad taste", "not tasty", "delicious", "flavorless", "tasty food"],
    ),
    (
        "Cooking Quality",
        &["undercooked", "raw", "burnt", "dry food", "not cooked well"],
    ),
    (
        "Missing / Wrong Items",
        &["missing item", "order incomplete", "wrong order", "forgot my drink"],
    ),
    (
        "Portion Size",
        &["small portion", "quantity too small", "generous portion", "big portion"],
    ),
    (
        "Packaging",
        &["bad packaging", "spilled", "leaking", "well packed"],
    ),
    (
        "Delivery Speed",
        &["late delivery", "fast delivery", "on time", "delivery took too long"],
    ),
    (
        "Service",
        &["bad service", "good service", "rude staff", "polite staff", "friendly driver"],
    ),
    (
        "Price / Value",
        &["expensive", "not worth", "good price", "value for money"],
    ),
    (
        "Cleanliness",
        &["dirty", "not clean", "clean restaurant", "hair in food"],
    ),
    (
        "Incorrect Billing",
        &["charged twice", "wrong bill", "overcharged", "refund not received"],
    ),
];

impl Default for Taxonomy {
    fn default() -> Self {
        Taxonomy {
            categories: RESTAURANT_CATEGORIES
                .iter()
                .map(|(name, exemplars)| Category {
                    name: name.to_string(),
                    exemplars: exemplars.iter().map(|e| e.to_string()).collect(),
                })
                .collect(),
        }
    }
}

impl Taxonomy {
    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.categories.is_empty() {
            return Err("taxonomy has no categories".to_string());
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err("taxonomy category with empty name".to_string());
            }
            if !seen.insert(category.name.as_str()) {
                return Err(format!("duplicate taxonomy category {:?}", category.name));
            }
            if category.exemplars.iter().all(|e| e.trim().is_empty()) {
                return Err(format!("category {:?} has no exemplars", category.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_taxonomy_is_valid_and_closed() {
        let t = Taxonomy::default();
        assert!(t.validate().is_ok());
        assert_eq!(t.categories.len(), 11);
        for c in &t.categories {
            assert!((3..=6).contains(&c.exemplars.len()), "{}", c.name);
        }
        assert!(t.get("Delivery Speed").is_some());
        assert!(t.get("Other").is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut t = Taxonomy::default();
        t.categories.push(t.categories[0].clone());
        assert!(t.validate().is_err());
    }
}
