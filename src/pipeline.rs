use crate::{
    chat::{ChatClient, GenerationError},
    config::Settings,
    image_gen::ImageClient,
    ingredients,
    models::{DishCycle, DishRequest, NutritionTotals, PublicationResult},
    nutrition::NutritionClient,
    publish::{build_caption, Publisher},
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

/// Runs a generation cycle stage by stage. Only a failed description aborts
/// the cycle; later failures leave their slot empty.
pub struct DishPipeline {
    chat: ChatClient,
    nutrition: NutritionClient,
    images: ImageClient,
    publisher: Publisher,
}

impl DishPipeline {
    pub fn new(settings: &Settings) -> Self {
        Self::from_parts(
            ChatClient::new(settings),
            NutritionClient::new(settings),
            ImageClient::new(settings),
            Publisher::new(settings),
        )
    }

    pub fn from_parts(chat: ChatClient, nutrition: NutritionClient, images: ImageClient, publisher: Publisher) -> Self {
        Self { chat, nutrition, images, publisher }
    }

    pub async fn run(&self, request: DishRequest) -> Result<DishCycle, GenerationError> {
        info!("🚀 Generating dish: '{}' inspired by '{}'", request.dish_type, request.anime_name);

        let description = self.chat.generate_dish(&request.anime_name, &request.dish_type).await?;

        let (ingredients, ingredients_error) = match ingredients::extract(&self.chat, &description).await {
            Ok(map) => (Some(map), None),
            Err(e) => {
                error!("❌ Failed to extract ingredients: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let (image, image_error) = match self.images.synthesize(&description).await {
            Ok(image) => (Some(image), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let nutrition = match &ingredients {
            Some(map) => self.nutrition.resolve(map).await,
            None => NutritionTotals::default(),
        };

        let cycle = DishCycle {
            id: Uuid::new_v4(),
            request,
            description,
            ingredients,
            ingredients_error,
            nutrition,
            image,
            image_error,
            created_at: Utc::now(),
        };
        info!(
            "✅ Dish cycle {} complete (ingredients: {}, image: {})",
            cycle.id,
            cycle.ingredients.is_some(),
            cycle.image.is_some()
        );
        Ok(cycle)
    }

    pub async fn publish(&self, cycle: &DishCycle) -> PublicationResult {
        let Some(image) = &cycle.image else {
            return PublicationResult::failed("No image available to share.");
        };
        let caption = build_caption(&cycle.description, cycle.ingredients.as_ref(), &cycle.nutrition);
        self.publisher.publish(image, &caption).await
    }
}
