//! Built-in catalog served when the remote source is unreachable.

use lazy_static::lazy_static;

use super::models::Catalog;

const BUILTIN_JSON: &str = include_str!("../../data/catalog.json");

lazy_static! {
    static ref BUILTIN: Catalog =
        serde_json::from_str(BUILTIN_JSON).expect("built-in catalog is valid JSON");
}

pub fn builtin() -> &'static Catalog {
    &BUILTIN
}
