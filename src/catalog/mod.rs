pub mod fallback;
pub mod filters;
pub mod handlers;
pub mod models;
pub mod tags;

use crate::state::AppState;
use axum::Router;

pub use models::{Catalog, Macros, Meal, Restaurant};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::read_routes())
}
