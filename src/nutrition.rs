use crate::{config::{mask, Settings}, models::{IngredientMap, NutritionTotals}};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Failure of a single lookup. Never escapes [`NutritionClient::resolve`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("status={status} body={body}")] Status { status: u16, body: String },
    #[error("parse error: {0}")] Parse(String),
}

/// Numeric part of a quantity such as `"200g"` or `"1/2"`. Unreadable input
/// yields `0.0`.
pub fn extract_quantity(quantity: &str) -> f64 {
    let value = if quantity.contains('/') {
        let mut parts = quantity.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(num), Some(den), None) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
                (Ok(n), Ok(d)) if d != 0.0 => n / d,
                _ => 0.0,
            },
            _ => 0.0,
        }
    } else {
        let digits: String = quantity.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse::<f64>().unwrap_or(0.0)
    };
    if value.is_finite() { value } else { 0.0 }
}

/// Substring match on the raw quantity, so "1 egg" reads as grams.
pub fn infer_unit(quantity: &str) -> &'static str {
    if quantity.contains('g') {
        "g"
    } else if quantity.contains("ml") {
        "ml"
    } else {
        "unit"
    }
}

pub struct NutritionClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NutritionClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.spoonacular_api_key.clone(),
            base_url: settings.spoonacular_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Sums nutrients over every ingredient that can be matched. Lookups run
    /// one at a time; misses and upstream errors contribute nothing.
    pub async fn resolve(&self, ingredients: &IngredientMap) -> NutritionTotals {
        let mut totals = NutritionTotals::default();
        for (name, quantity) in ingredients.iter() {
            if let Some(nutrients) = self.resolve_ingredient(name, quantity).await {
                totals.add(&nutrients);
            }
        }
        info!(
            "📊 Nutrition totals over {} ingredients: protein={:.2} carbs={:.2} fat={:.2} kcal={:.2}",
            ingredients.len(), totals.protein, totals.carbohydrates, totals.fat, totals.calories
        );
        totals
    }

    async fn resolve_ingredient(&self, name: &str, quantity: &str) -> Option<NutritionTotals> {
        let amount = extract_quantity(quantity);
        let unit = infer_unit(quantity);

        let Some(id) = self.find_id(name).await else {
            warn!("⚠️ No database match for '{}', skipping", name);
            return None;
        };

        match self.fetch_nutrients(id, amount, unit).await {
            Ok(nutrients) => Some(nutrients),
            Err(e) => {
                warn!("⚠️ Nutrient lookup for '{}' (id {}) failed: {}", name, id, e);
                None
            }
        }
    }

    /// Full name first, then only its first word.
    async fn find_id(&self, name: &str) -> Option<u64> {
        match self.search(name).await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => {
                warn!("⚠️ Ingredient search for '{}' failed: {}", name, e);
                return None;
            }
        }

        let simplified = name.split_whitespace().next()?;
        if simplified == name {
            return None;
        }
        info!("🔎 No results for '{}'. Trying '{}'", name, simplified);
        match self.search(simplified).await {
            Ok(id) => id,
            Err(e) => {
                warn!("⚠️ Ingredient search for '{}' failed: {}", simplified, e);
                None
            }
        }
    }

    pub async fn search(&self, query: &str) -> Result<Option<u64>, LookupError> {
        let url = format!("{}/food/ingredients/search", self.base_url);
        info!("🔗 Searching ingredient '{}' (key {})", query, mask(&self.api_key));

        let response = self.client
            .get(&url)
            .query(&[("query", query), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        let parsed: SearchResponse = read_json(response).await?;
        Ok(parsed.results.first().map(|r| r.id))
    }

    pub async fn fetch_nutrients(&self, id: u64, amount: f64, unit: &str) -> Result<NutritionTotals, LookupError> {
        let url = format!("{}/food/ingredients/{}/information", self.base_url, id);
        let amount = amount.to_string();

        let response = self.client
            .get(&url)
            .query(&[("amount", amount.as_str()), ("unit", unit), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        let parsed: InformationResponse = read_json(response).await?;
        let nutrients = parsed.nutrition.nutrients;
        let amount_of = |wanted: &str| {
            nutrients
                .iter()
                .find(|n| n.name == wanted)
                .map(|n| n.amount.max(0.0))
                .unwrap_or(0.0)
        };

        Ok(NutritionTotals {
            protein: amount_of("Protein"),
            carbohydrates: amount_of("Carbohydrates"),
            fat: amount_of("Fat"),
            calories: amount_of("Calories"),
        })
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, LookupError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| LookupError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(LookupError::Status { status: status.as_u16(), body: text });
    }
    serde_json::from_str(&text).map_err(|e| LookupError::Parse(e.to_string()))
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult { id: u64 }

#[derive(Debug, Deserialize)]
struct InformationResponse {
    #[serde(default)]
    nutrition: Nutrition,
}

#[derive(Debug, Deserialize, Default)]
struct Nutrition { #[serde(default)] nutrients: Vec<Nutrient> }

#[derive(Debug, Deserialize)]
struct Nutrient {
    name: String,
    #[serde(default)]
    amount: f64,
}
