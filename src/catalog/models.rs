use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geo::Location;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub logo: String,
    pub location: Location,
    #[serde(default)]
    pub is_premium: bool,
}

/// Per-serving nutrition. All values are expected to be non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Macros {
    pub fn is_valid(&self) -> bool {
        [self.calories, self.protein, self.fat, self.carbs]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub restaurant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub macros: Macros,
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_instructions: Option<String>,
}

impl Meal {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Everything the remote data source serves, fetched in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub restaurants: Vec<Restaurant>,
    pub meals: Vec<Meal>,
}

impl Catalog {
    /// Drop meals whose macros are negative or not finite.
    pub fn retain_valid_meals(meals: Vec<Meal>) -> Vec<Meal> {
        meals
            .into_iter()
            .filter(|m| {
                let ok = m.macros.is_valid();
                if !ok {
                    warn!(meal_id = %m.id, "dropping meal with invalid macros");
                }
                ok
            })
            .collect()
    }
}
