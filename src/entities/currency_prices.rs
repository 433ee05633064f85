//! SeaORM Entity for currency price intervals
//!
//! Each row is a `[start, end)` candle for one currency symbol. The series
//! for a symbol is non-overlapping and ordered by `start`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "currency_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub currency: String,
    pub start: DateTimeUtc,
    pub end: DateTimeUtc,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub avg: Decimal,
    pub volume: Decimal,
    pub market_cap: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
