use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_with::{base64::Base64, serde_as, skip_serializing_none};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DishRequest {
    pub anime_name: String,
    pub dish_type: String,
}

/// Ingredient name to quantity, in the order the model listed them.
///
/// Inserting an existing name replaces its quantity but keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngredientMap {
    entries: Vec<(String, String)>,
}

impl IngredientMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, quantity: impl Into<String>) {
        let name = name.into();
        let quantity = quantity.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = quantity,
            None => self.entries.push((name, quantity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, q)| (n.as_str(), q.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IngredientMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for IngredientMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, quantity) in &self.entries {
            map.serialize_entry(name, quantity)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct NutritionTotals {
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
    pub calories: f64,
}

impl NutritionTotals {
    pub fn add(&mut self, other: &NutritionTotals) {
        self.protein += other.protein;
        self.carbohydrates += other.carbohydrates;
        self.fat += other.fat;
        self.calories += other.calories;
    }

    /// Display labels with units, in caption order.
    pub fn labelled(&self) -> [(&'static str, f64); 4] {
        [
            ("Total Protein (g)", self.protein),
            ("Total Carbohydrates (g)", self.carbohydrates),
            ("Total Fat (g)", self.fat),
            ("Total Calories (kcal)", self.calories),
        ]
    }
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedImage {
    pub path: PathBuf,
    #[serde(rename = "image_base64")]
    #[serde_as(as = "Base64")]
    pub bytes: Bytes,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PublicationResult {
    pub success: bool,
    pub message: String,
}

impl PublicationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Everything one generation cycle produced. Failed stages leave their slot
/// empty and record a message instead.
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub struct DishCycle {
    pub id: Uuid,
    pub request: DishRequest,
    pub description: String,
    pub ingredients: Option<IngredientMap>,
    pub ingredients_error: Option<String>,
    pub nutrition: NutritionTotals,
    pub image: Option<GeneratedImage>,
    pub image_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
