//! Rarible activity-feed adapter.
//!
//! Pages forward through the byCollection activity feed with an opaque
//! server-issued cursor, earliest first. The walk continues page by page
//! (with a pacing delay) until the feed returns an empty cursor or an
//! empty page.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::entities::market_operations;
use crate::models::{op_types, World};
use crate::services::operations::{find_last_operation, upsert_operations};
use crate::services::parcels::ParcelDirectory;

use super::{into_insertable, read_json_response};

pub const DEFAULT_BASE_URL: &str = "https://api.rarible.org/v0.1";

pub const SOURCE_TAG: &str = "rarible";

const PAGE_SIZE: u32 = 1000;
/// Pause between non-terminal pages to respect the upstream rate limit.
const PAGE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityAssetType {
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub blockchain: String,
    #[serde(default)]
    pub collection: String,
    #[serde(rename = "tokenId", default)]
    pub token_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityAsset {
    #[serde(rename = "type", default)]
    pub asset_type: Option<ActivityAssetType>,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityBlockchainInfo {
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: i64,
    #[serde(rename = "logIndex", default)]
    pub log_index: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "lastUpdatedAt", default)]
    pub last_updated_at: String,
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub reverted: bool,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub maker: String,
    #[serde(default)]
    pub taker: String,
    #[serde(default)]
    pub make: Option<ActivityAsset>,
    #[serde(default)]
    pub take: Option<ActivityAsset>,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: String,
    #[serde(rename = "blockchainInfo", default)]
    pub blockchain_info: Option<ActivityBlockchainInfo>,
    #[serde(rename = "orderId", default)]
    pub order_id: String,
    #[serde(default)]
    pub nft: Option<ActivityAsset>,
    #[serde(default)]
    pub payment: Option<ActivityAsset>,
    #[serde(default)]
    pub buyer: String,
    #[serde(default)]
    pub seller: String,
    #[serde(rename = "buyerOrderHash", default)]
    pub buyer_order_hash: String,
    #[serde(rename = "sellerOrderHash", default)]
    pub seller_order_hash: String,
    #[serde(default)]
    pub price: String,
    #[serde(rename = "priceUsd", default)]
    pub price_usd: String,
    #[serde(rename = "amountUsd", default)]
    pub amount_usd: String,
    #[serde(rename = "type", default)]
    pub transaction_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// Strip the blockchain prefix from a compound `blockchain:address` id.
fn bare_address(compound: &str) -> String {
    compound
        .split_once(':')
        .map(|(_, address)| address)
        .unwrap_or(compound)
        .to_string()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}

/// The asset and payment sides of an activity. LIST and BID deliberately
/// swap which sub-object is "asset" and which is "payment": a listing
/// makes the NFT and takes the payment, a bid makes the payment and takes
/// the NFT.
fn select_sides<'a>(
    activity: &'a Activity,
) -> (Option<&'a ActivityAsset>, Option<&'a ActivityAsset>) {
    match activity.kind.as_str() {
        op_types::SELL => (activity.nft.as_ref(), activity.payment.as_ref()),
        op_types::LIST => (activity.make.as_ref(), activity.take.as_ref()),
        op_types::BID => (activity.take.as_ref(), activity.make.as_ref()),
        _ => (None, None),
    }
}

pub fn parse_activity(
    activity: &Activity,
    world: World,
    blockchain: &str,
    parcels: &ParcelDirectory,
    currencies: &HashMap<String, String>,
) -> market_operations::Model {
    let date = DateTime::parse_from_rfc3339(&activity.date)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let last_updated_at = DateTime::parse_from_rfc3339(&activity.last_updated_at)
        .map(|d| d.with_timezone(&Utc))
        .ok();

    let maker = bare_address(&activity.maker);
    let taker = bare_address(&activity.taker);
    let buyer = bare_address(&activity.buyer);
    let seller = bare_address(&activity.seller);

    let (asset_side, payment_side) = select_sides(activity);

    let (mut asset_contract, mut asset_type, mut asset_id) =
        (String::new(), String::new(), String::new());
    let mut asset_location = String::new();
    let (mut asset_loc_x, mut asset_loc_y) = (None, None);
    let mut asset_value = 0i64;
    if let Some(side) = asset_side {
        if let Some(info) = &side.asset_type {
            asset_contract = bare_address(&info.contract);
            asset_type = world.asset_type(&asset_contract).to_string();
            asset_id = info.token_id.clone();
            if let Some(parcel) = parcels.get(&asset_id) {
                asset_location = parcel.id.clone();
                asset_loc_x = Some(parcel.x as i32);
                asset_loc_y = Some(parcel.y as i32);
            }
        }
        asset_value = side.value.parse().unwrap_or(0);
    }

    let payment_amount = payment_side
        .and_then(|side| parse_decimal(&side.value))
        .or_else(|| parse_decimal(&activity.price))
        .unwrap_or(Decimal::ZERO);
    let payment_amount_usd =
        parse_decimal(&activity.amount_usd).or_else(|| parse_decimal(&activity.price_usd));
    let payment_ccy_price = payment_amount_usd.and_then(|usd| {
        if payment_amount.is_zero() {
            None
        } else {
            Some(usd / payment_amount)
        }
    });

    let (mut payment_blockchain, mut payment_type, mut payment_token, mut payment_currency) =
        (String::new(), String::new(), String::new(), String::new());
    if let Some(info) = payment_side.and_then(|side| side.asset_type.as_ref()) {
        payment_type = info.kind.clone();
        if !info.blockchain.is_empty() {
            // Native coin: the kind is already the currency symbol
            payment_blockchain = info.blockchain.clone();
            payment_currency = info.kind.clone();
        } else if !info.contract.is_empty() {
            payment_blockchain = info
                .contract
                .split_once(':')
                .map(|(chain, _)| chain)
                .unwrap_or("")
                .to_string();
            payment_token = bare_address(&info.contract);
            payment_currency = currencies
                .get(&info.contract.to_lowercase())
                .cloned()
                .unwrap_or_default();
        }
    }

    let (mut block_hash, mut block_number, mut log_index) = (String::new(), 0i64, 0i64);
    if let Some(info) = &activity.blockchain_info {
        block_hash = info.block_hash.clone();
        block_number = info.block_number;
        log_index = info.log_index;
    }

    market_operations::Model {
        id: 0,
        operation_id: activity.id.clone(),
        downloaded_from: SOURCE_TAG.to_string(),
        op_type: activity.kind.clone(),
        source: activity.source.clone(),
        date,
        last_updated_at,
        metaverse: world.as_str().to_string(),
        blockchain: blockchain.to_string(),
        cursor: activity.cursor.clone(),
        reverted: activity.reverted,
        order_id: activity.order_id.clone(),
        order_hash: activity.hash.clone(),
        transaction_hash: activity.transaction_hash.clone(),
        transaction_type: activity.transaction_type.clone(),
        maker,
        taker,
        buyer,
        seller,
        asset_contract,
        asset_type,
        asset_id,
        asset_location,
        asset_loc_x,
        asset_loc_y,
        asset_value,
        payment_blockchain,
        payment_type,
        payment_token,
        payment_currency,
        payment_amount,
        payment_amount_usd,
        payment_ccy_price,
        buyer_order_hash: activity.buyer_order_hash.clone(),
        seller_order_hash: activity.seller_order_hash.clone(),
        block_hash,
        block_number,
        log_index,
        data: serde_json::json!({ "rawData": activity }),
    }
}

#[derive(Clone)]
pub struct RaribleService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl RaribleService {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    pub async fn collection_activities(
        &self,
        blockchain: &str,
        asset_contract: &str,
        event_types: &[String],
        cursor: &str,
    ) -> Result<ActivityPage, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/activities/byCollection", self.base_url);
        let collection = format!(
            "{}:{}",
            blockchain.to_uppercase(),
            asset_contract.to_lowercase()
        );

        let mut query: Vec<(&str, String)> = vec![
            ("collection", collection),
            ("size", PAGE_SIZE.to_string()),
            ("sort", "EARLIEST_FIRST".to_string()),
        ];
        for event_type in event_types {
            query.push(("type", event_type.clone()));
        }
        if !cursor.is_empty() {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("X-API-KEY", &self.api_key)
            .query(&query)
            .send()
            .await?;

        read_json_response(response).await
    }
}

/// One download run: resume from the last committed cursor and walk the
/// feed forward until it is drained.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    db: &DatabaseConnection,
    service: &RaribleService,
    world: World,
    blockchain: &str,
    asset_contract: &str,
    event_types: &[String],
    parcels: &ParcelDirectory,
    currencies: &HashMap<String, String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let prefix = format!(
        "{{ {} | {} | {} }}",
        blockchain,
        world.as_str(),
        event_types.join(",")
    );
    tracing::info!("[{}] Start", prefix);

    let last = find_last_operation(
        db,
        SOURCE_TAG,
        world,
        Some(blockchain),
        Some(asset_contract),
        event_types,
    )
    .await?;
    let mut next_cursor = last.map(|op| op.cursor).unwrap_or_default();
    tracing::info!("[{}] First request cursor: {:?}", prefix, next_cursor);

    let mut request_count = 0u32;
    loop {
        request_count += 1;
        tracing::info!("[{}] Running request #{}", prefix, request_count);

        let page = service
            .collection_activities(blockchain, asset_contract, event_types, &next_cursor)
            .await?;
        let fetched = page.activities.len();
        let operations = page
            .activities
            .iter()
            .map(|activity| {
                into_insertable(parse_activity(activity, world, blockchain, parcels, currencies))
            })
            .collect();
        upsert_operations(db, operations).await?;
        tracing::info!(
            "[{}] Saved {} operations for request #{}",
            prefix,
            fetched,
            request_count
        );

        if page.cursor.is_empty() || fetched == 0 {
            break;
        }
        next_cursor = page.cursor;
        sleep(PAGE_DELAY).await;
    }

    tracing::info!("[{}] Done after {} request(s)", prefix, request_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parcels::Parcel;
    use rust_decimal_macros::dec;

    fn erc20_side(contract: &str, value: &str) -> ActivityAsset {
        ActivityAsset {
            asset_type: Some(ActivityAssetType {
                kind: "ERC20".into(),
                contract: contract.into(),
                ..Default::default()
            }),
            value: value.into(),
        }
    }

    fn nft_side(contract: &str, token_id: &str, value: &str) -> ActivityAsset {
        ActivityAsset {
            asset_type: Some(ActivityAssetType {
                kind: "ERC721".into(),
                contract: contract.into(),
                token_id: token_id.into(),
                ..Default::default()
            }),
            value: value.into(),
        }
    }

    fn mana_currencies() -> HashMap<String, String> {
        let mut currencies = HashMap::new();
        currencies.insert(
            "ethereum:0x0f5d2fb29fb7d3cfee444a200298f468908cc942".to_string(),
            "MANA".to_string(),
        );
        currencies
    }

    fn empty_parcels() -> ParcelDirectory {
        ParcelDirectory::from_parcels(Vec::new())
    }

    fn sell_activity() -> Activity {
        Activity {
            id: "ETHEREUM:abc123".into(),
            kind: "SELL".into(),
            date: "2023-05-01T10:00:00Z".into(),
            last_updated_at: "2023-05-01T10:00:01.5Z".into(),
            cursor: "1682935200000_abc".into(),
            maker: "ETHEREUM:0xmaker".into(),
            buyer: "ETHEREUM:0xbuyer".into(),
            seller: "ETHEREUM:0xseller".into(),
            nft: Some(nft_side(
                "ETHEREUM:0xf87e31492faf9a91b02ee0deaad50d51d56d5d4d",
                "1234",
                "1",
            )),
            payment: Some(erc20_side(
                "ETHEREUM:0x0f5d2fb29fb7d3cfee444a200298f468908cc942",
                "10",
            )),
            amount_usd: "4.2".into(),
            source: "RARIBLE".into(),
            ..Default::default()
        }
    }

    #[test]
    fn compound_ids_lose_their_blockchain_prefix() {
        assert_eq!(bare_address("ETHEREUM:0xabc"), "0xabc");
        assert_eq!(bare_address("0xplain"), "0xplain");
        assert_eq!(bare_address(""), "");
    }

    #[test]
    fn sell_activity_parses_into_canonical_operation() {
        let parcels = ParcelDirectory::from_parcels(vec![Parcel {
            id: "-44,-77".into(),
            x: -44,
            y: -77,
            token_id: "1234".into(),
        }]);
        let operation = parse_activity(
            &sell_activity(),
            World::Decentraland,
            "ethereum",
            &parcels,
            &mana_currencies(),
        );

        assert_eq!(operation.operation_id, "ETHEREUM:abc123");
        assert_eq!(operation.op_type, "SELL");
        assert_eq!(operation.maker, "0xmaker");
        assert_eq!(operation.buyer, "0xbuyer");
        assert_eq!(operation.seller, "0xseller");
        assert_eq!(
            operation.asset_contract,
            "0xf87e31492faf9a91b02ee0deaad50d51d56d5d4d"
        );
        assert_eq!(operation.asset_type, "land");
        assert_eq!(operation.asset_location, "-44,-77");
        assert_eq!(operation.payment_amount, dec!(10));
        assert_eq!(operation.payment_currency, "MANA");
        assert_eq!(
            operation.payment_token,
            "0x0f5d2fb29fb7d3cfee444a200298f468908cc942"
        );
        assert_eq!(operation.payment_blockchain, "ETHEREUM");
        assert_eq!(operation.payment_amount_usd, Some(dec!(4.2)));
        assert_eq!(operation.payment_ccy_price, Some(dec!(0.42)));
        assert_eq!(operation.cursor, "1682935200000_abc");
    }

    #[test]
    fn list_and_bid_swap_asset_and_payment_sides() {
        let mut listing = Activity {
            kind: "LIST".into(),
            date: "2023-05-01T10:00:00Z".into(),
            make: Some(nft_side("ETHEREUM:0xland", "55", "1")),
            take: Some(erc20_side(
                "ETHEREUM:0x0f5d2fb29fb7d3cfee444a200298f468908cc942",
                "7",
            )),
            ..Default::default()
        };
        let operation = parse_activity(
            &listing,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.asset_id, "55");
        assert_eq!(operation.payment_amount, dec!(7));
        assert_eq!(operation.payment_currency, "MANA");

        // A bid takes the NFT and makes the payment
        listing.kind = "BID".into();
        let operation = parse_activity(
            &listing,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.asset_id, "");
        assert_eq!(operation.payment_amount, dec!(1));
    }

    #[test]
    fn price_fallback_fills_missing_side_value() {
        let mut activity = sell_activity();
        let mut payment = activity.payment.take().unwrap();
        payment.value = String::new();
        activity.payment = Some(payment);
        activity.price = "12.5".into();
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.payment_amount, dec!(12.5));
    }

    #[test]
    fn usd_amount_falls_back_to_price_usd() {
        let mut activity = sell_activity();
        activity.amount_usd = String::new();
        activity.price_usd = "5".into();
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.payment_amount_usd, Some(dec!(5)));
        assert_eq!(operation.payment_ccy_price, Some(dec!(0.5)));
    }

    #[test]
    fn missing_usd_leaves_fields_unset() {
        let mut activity = sell_activity();
        activity.amount_usd = String::new();
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.payment_amount_usd, None);
        assert_eq!(operation.payment_ccy_price, None);
    }

    #[test]
    fn unresolved_token_keeps_raw_contract_only() {
        let mut activity = sell_activity();
        activity.payment = Some(erc20_side("ETHEREUM:0xunknown", "10"));
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.payment_currency, "");
        assert_eq!(operation.payment_token, "0xunknown");
        assert_eq!(operation.payment_blockchain, "ETHEREUM");
    }

    #[test]
    fn native_coin_payment_uses_blockchain_field() {
        let mut activity = sell_activity();
        activity.payment = Some(ActivityAsset {
            asset_type: Some(ActivityAssetType {
                kind: "ETH".into(),
                blockchain: "ETHEREUM".into(),
                ..Default::default()
            }),
            value: "2".into(),
        });
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.payment_currency, "ETH");
        assert_eq!(operation.payment_blockchain, "ETHEREUM");
        assert_eq!(operation.payment_token, "");
    }

    #[test]
    fn unparseable_date_degrades_to_epoch() {
        let mut activity = sell_activity();
        activity.date = "garbage".into();
        let operation = parse_activity(
            &activity,
            World::Decentraland,
            "ethereum",
            &empty_parcels(),
            &mana_currencies(),
        );
        assert_eq!(operation.date, DateTime::<Utc>::UNIX_EPOCH);
        assert!(operation.last_updated_at.is_some());
    }
}
