//! Reference list of dietary tags shown in the filter bar.
//!
//! Tags on meals are free text; this list only drives the UI.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DietaryTag {
    pub id: &'static str,
    pub name: &'static str,
    pub is_premium: bool,
}

pub const DIETARY_TAGS: [DietaryTag; 8] = [
    DietaryTag { id: "highest-protein", name: "Highest protein", is_premium: false },
    DietaryTag { id: "under-400-cal", name: "Under 400 cal", is_premium: false },
    DietaryTag { id: "low-carb", name: "Low carb", is_premium: false },
    DietaryTag { id: "keto", name: "Keto", is_premium: true },
    DietaryTag { id: "gluten-free", name: "Gluten free", is_premium: true },
    DietaryTag { id: "carnivore", name: "Carnivore", is_premium: true },
    DietaryTag { id: "conservative-cheat-meal", name: "Conservative cheat meal", is_premium: true },
    DietaryTag { id: "seed-oil-free", name: "Seed oil free", is_premium: true },
];

/// Case-insensitive lookup by display name.
pub fn tag_by_name(name: &str) -> Option<&'static DietaryTag> {
    DIETARY_TAGS
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

pub fn free_tags() -> impl Iterator<Item = &'static DietaryTag> {
    DIETARY_TAGS.iter().filter(|t| !t.is_premium)
}

pub fn premium_tags() -> impl Iterator<Item = &'static DietaryTag> {
    DIETARY_TAGS.iter().filter(|t| t.is_premium)
}

/// Tags a user may toggle in the filter bar.
pub fn selectable_tags(is_premium_user: bool) -> impl Iterator<Item = &'static DietaryTag> {
    DIETARY_TAGS
        .iter()
        .filter(move |t| is_premium_user || !t.is_premium)
}
