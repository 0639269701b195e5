//! Static token package catalog.

use crate::error::{AppError, AppResult};
use crate::models::Tokens;
use serde::Serialize;

/// A purchasable token package. `price_minor` is in minor currency units.
#[derive(Debug, Clone, Serialize)]
pub struct Tariff {
    pub id: &'static str,
    pub title: &'static str,
    pub tokens: i64,
    pub price_minor: i64,
    pub currency: &'static str,
}

impl Tariff {
    pub fn token_amount(&self) -> Tokens {
        Tokens::from_whole(self.tokens)
    }
}

const CATALOG: &[Tariff] = &[
    Tariff {
        id: "starter",
        title: "10 tokens",
        tokens: 10,
        price_minor: 7_600,
        currency: "RUB",
    },
    Tariff {
        id: "standard",
        title: "31 tokens",
        tokens: 31,
        price_minor: 17_400,
        currency: "RUB",
    },
    Tariff {
        id: "bulk",
        title: "150 tokens",
        tokens: 150,
        price_minor: 70_100,
        currency: "RUB",
    },
];

pub fn list_tariffs() -> &'static [Tariff] {
    CATALOG
}

pub fn get_tariff(id: &str) -> AppResult<&'static Tariff> {
    CATALOG
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Unknown tariff: {id}")))
}
