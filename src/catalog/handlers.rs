use axum::{extract::State, routing::get, Json, Router};
use tracing::{debug, instrument};

use super::models::{Meal, Restaurant};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/restaurants", get(list_restaurants))
}

/// GET /meals. The full, unfiltered list.
#[instrument(skip(state))]
pub async fn list_meals(State(state): State<AppState>) -> Json<Vec<Meal>> {
    debug!(count = state.catalog.meals.len(), "serving meals");
    Json(state.catalog.meals.clone())
}

/// GET /restaurants. The full, unfiltered list.
#[instrument(skip(state))]
pub async fn list_restaurants(State(state): State<AppState>) -> Json<Vec<Restaurant>> {
    debug!(count = state.catalog.restaurants.len(), "serving restaurants");
    Json(state.catalog.restaurants.clone())
}
