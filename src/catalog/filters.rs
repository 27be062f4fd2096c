//! Pure derived views over the loaded catalog.

use super::models::{Meal, Restaurant};

fn premium_allows(item_is_premium: bool, is_premium_user: bool) -> bool {
    is_premium_user || !item_is_premium
}

/// Meals visible for the given tag selection.
///
/// Premium meals are hidden from non-premium users whatever the tags. An empty
/// selection shows everything else; otherwise a meal needs at least one of the
/// selected tags.
pub fn filter_meals<'a, I, S>(meals: &'a [Meal], selected_tags: I, is_premium_user: bool) -> Vec<&'a Meal>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let selected: Vec<S> = selected_tags.into_iter().collect();
    meals
        .iter()
        .filter(|m| premium_allows(m.is_premium, is_premium_user))
        .filter(|m| selected.is_empty() || selected.iter().any(|t| m.has_tag(t.as_ref())))
        .collect()
}

pub fn meals_for_restaurant<'a>(
    meals: &'a [Meal],
    restaurant_id: &str,
    is_premium_user: bool,
) -> Vec<&'a Meal> {
    meals
        .iter()
        .filter(|m| premium_allows(m.is_premium, is_premium_user))
        .filter(|m| m.restaurant_id == restaurant_id)
        .collect()
}

pub fn visible_restaurants<'a, I>(restaurants: I, is_premium_user: bool) -> Vec<&'a Restaurant>
where
    I: IntoIterator<Item = &'a Restaurant>,
{
    restaurants
        .into_iter()
        .filter(|r| premium_allows(r.is_premium, is_premium_user))
        .collect()
}

/// Pair each meal with its restaurant, dropping meals whose restaurant is unknown.
pub fn with_restaurants<'a, I>(meals: I, restaurants: &'a [Restaurant]) -> Vec<(&'a Meal, &'a Restaurant)>
where
    I: IntoIterator<Item = &'a Meal>,
{
    meals
        .into_iter()
        .filter_map(|m| {
            restaurants
                .iter()
                .find(|r| r.id == m.restaurant_id)
                .map(|r| (m, r))
        })
        .collect()
}
