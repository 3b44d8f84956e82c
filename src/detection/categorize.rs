//! Image categorization from detected object classes.
//!
//! The decision table is data, not branching logic: an ordered list of
//! (predicate, label) pairs evaluated first-match-wins over the
//! person/product flags. The trailing catch-all makes the table total.

use std::collections::HashSet;

use super::Detection;

/// Predicate over the derived person/product flags. `None` matches either
/// value, so the final rule can act as a catch-all.
#[derive(Debug, Clone, Copy)]
pub struct CategoryPredicate {
    pub person: Option<bool>,
    pub product: Option<bool>,
}

impl CategoryPredicate {
    fn matches(&self, has_person: bool, has_product: bool) -> bool {
        self.person.is_none_or(|p| p == has_person)
            && self.product.is_none_or(|p| p == has_product)
    }
}

/// Ordered classification rules, first match wins.
pub const CATEGORY_RULES: &[(CategoryPredicate, &str)] = &[
    (
        CategoryPredicate {
            person: Some(true),
            product: Some(true),
        },
        "promotional",
    ),
    (
        CategoryPredicate {
            person: Some(false),
            product: Some(true),
        },
        "product_display",
    ),
    (
        CategoryPredicate {
            person: Some(true),
            product: Some(false),
        },
        "lifestyle",
    ),
    (
        CategoryPredicate {
            person: None,
            product: None,
        },
        "other",
    ),
];

/// Classifies an image from its detected object classes using the configured
/// person/product label sets.
#[derive(Debug, Clone)]
pub struct ImageCategorizer {
    person_classes: HashSet<String>,
    product_classes: HashSet<String>,
}

impl ImageCategorizer {
    pub fn new(person_classes: &[String], product_classes: &[String]) -> Self {
        Self {
            person_classes: person_classes.iter().map(|c| c.to_lowercase()).collect(),
            product_classes: product_classes.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    /// Derive the image-level category for a detection set.
    pub fn categorize(&self, detections: &[Detection]) -> &'static str {
        let mut has_person = false;
        let mut has_product = false;
        for detection in detections {
            let class = detection.class_name.to_lowercase();
            has_person |= self.person_classes.contains(&class);
            has_product |= self.product_classes.contains(&class);
        }

        CATEGORY_RULES
            .iter()
            .find(|(predicate, _)| predicate.matches(has_person, has_product))
            .map(|(_, label)| *label)
            .unwrap_or("other")
    }
}
