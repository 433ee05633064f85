//! SeaORM Entity for the canonical second-market operation record
//!
//! One row per normalized marketplace event. The natural key is
//! (operation_id, type, source, date); re-ingesting an upstream event
//! replaces the previous row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "market_operations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub operation_id: String,
    /// Marketplace the record was downloaded from ("opensea" | "rarible")
    pub downloaded_from: String,
    /// Operation type: SELL, LIST, BID, TRANSFER (empty when unmapped upstream)
    #[sea_orm(column_name = "type")]
    pub op_type: String,
    /// Protocol name as reported by the marketplace (e.g. "OPEN_SEA")
    pub source: String,
    pub date: DateTimeUtc,
    pub last_updated_at: Option<DateTimeUtc>,
    pub metaverse: String,
    pub blockchain: String,
    /// Opaque resumption token (unix-millis string or server-issued cursor)
    pub cursor: String,
    pub reverted: bool,
    pub order_id: String,
    pub order_hash: String,
    pub transaction_hash: String,
    pub transaction_type: String,
    pub maker: String,
    pub taker: String,
    pub buyer: String,
    pub seller: String,
    pub asset_contract: String,
    pub asset_type: String,
    pub asset_id: String,
    pub asset_location: String,
    pub asset_loc_x: Option<i32>,
    pub asset_loc_y: Option<i32>,
    pub asset_value: i64,
    pub payment_blockchain: String,
    pub payment_type: String,
    pub payment_token: String,
    pub payment_currency: String,
    pub payment_amount: Decimal,
    /// Unset until reported upstream or resolved during export
    pub payment_amount_usd: Option<Decimal>,
    pub payment_ccy_price: Option<Decimal>,
    pub buyer_order_hash: String,
    pub seller_order_hash: String,
    pub block_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    /// Raw upstream record, retained for audit only
    pub data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
