//! OpenSea events adapter.
//!
//! Pages backward in time through the collection events API using a
//! `before` timestamp plus an opaque `next` token. Exactly one page is
//! fetched per invocation; resumption is driven by the most recent
//! committed record, so repeated runs walk the history without
//! re-fetching what is already stored.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::entities::market_operations;
use crate::models::{derive_operation_id, op_types, World};
use crate::services::operations::{find_last_operation, upsert_operations};
use crate::services::parcels::ParcelDirectory;

use super::{into_insertable, read_json_response};

pub const DEFAULT_BASE_URL: &str = "https://api.opensea.io/api/v2";

pub const SOURCE_TAG: &str = "opensea";
const PROTOCOL_NAME: &str = "OPEN_SEA";

/// First `before` timestamp when the store holds no checkpoint (2023-01-01).
const EPOCH_START_TIMESTAMP: i64 = 1672531200;
/// Events older than this stop the walk even when a `next` token remains.
const MIN_EVENT_TIMESTAMP: i64 = 1672531200;

const PAGE_LIMIT: u32 = 50;

/// Currencies reported as their own payment type; everything else is ERC20.
const NATIVE_GAS_SYMBOLS: &[&str] = &["ETH", "POL", "MATIC"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayment {
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub token_address: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventAsset {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub token_standard: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub event_timestamp: i64,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub order_hash: String,
    #[serde(default)]
    pub protocol_address: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub payment: Option<EventPayment>,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub buyer: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub to_address: String,
    #[serde(default)]
    pub order_type: String,
    #[serde(default)]
    pub asset: Option<EventAsset>,
    #[serde(default)]
    pub nft: Option<EventAsset>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub maker: String,
    #[serde(default)]
    pub taker: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub asset_events: Vec<Event>,
    #[serde(default)]
    pub next: String,
}

/// Map the upstream order type onto the canonical operation type.
/// Unknown values map to the empty type; the record is still persisted.
pub fn map_event_type(raw: &str) -> &'static str {
    match raw {
        "sale" => op_types::SELL,
        "listing" => op_types::LIST,
        "item_offer" => op_types::BID,
        "TRANSFER" => op_types::TRANSFER,
        _ => "",
    }
}

/// Divisor for an integer base-unit amount with the given decimal
/// exponent. Exponents outside the supported table resolve to nothing and
/// the amount degrades to zero.
fn divisor_for_decimals(decimals: u32) -> Option<Decimal> {
    const SUPPORTED: [u32; 9] = [2, 4, 6, 8, 10, 12, 14, 16, 18];
    if SUPPORTED.contains(&decimals) {
        Some(Decimal::from_i128_with_scale(10_i128.pow(decimals), 0))
    } else {
        None
    }
}

/// Integer base units divided by the exponent divisor, in decimal
/// arithmetic end to end. Unparseable amounts degrade to zero.
fn parse_payment_amount(quantity: &str, decimals: u32) -> Decimal {
    let amount: Decimal = match quantity.parse() {
        Ok(amount) => amount,
        Err(_) => return Decimal::ZERO,
    };
    match divisor_for_decimals(decimals) {
        Some(divisor) => amount / divisor,
        None => Decimal::ZERO,
    }
}

/// from/to resolution: explicit from/to fields win, then seller/buyer,
/// then the maker takes the side implied by the order type.
fn resolve_parties(event: &Event) -> (String, String) {
    let mut from = if !event.from_address.is_empty() {
        event.from_address.clone()
    } else {
        event.seller.clone()
    };
    let mut to = if !event.to_address.is_empty() {
        event.to_address.clone()
    } else {
        event.buyer.clone()
    };
    if !event.maker.is_empty() {
        if from.is_empty() && event.order_type == "listing" {
            from = event.maker.clone();
        } else if to.is_empty() && event.order_type == "item_offer" {
            to = event.maker.clone();
        }
    }
    (from, to)
}

pub fn parse_event(
    event: &Event,
    world: World,
    blockchain: &str,
    parcels: &ParcelDirectory,
) -> market_operations::Model {
    let op_type = map_event_type(&event.order_type);

    let mut payment_amount = Decimal::ZERO;
    let (mut payment_currency, mut payment_token, mut payment_type) =
        (String::new(), String::new(), String::new());
    if let Some(payment) = &event.payment {
        payment_amount = parse_payment_amount(&payment.quantity, payment.decimals);
        payment_currency = payment.symbol.clone();
        payment_token = payment.token_address.clone();
        payment_type = if NATIVE_GAS_SYMBOLS.contains(&payment.symbol.as_str()) {
            payment.symbol.clone()
        } else {
            "ERC20".to_string()
        };
    }

    let (from, _to) = resolve_parties(event);

    let asset = event
        .asset
        .clone()
        .or_else(|| event.nft.clone())
        .unwrap_or_default();

    let mut asset_location = String::new();
    let (mut asset_loc_x, mut asset_loc_y) = (None, None);
    if !asset.identifier.is_empty() {
        if let Some(parcel) = parcels.get(&asset.identifier) {
            asset_location = parcel.id.clone();
            asset_loc_x = Some(parcel.x as i32);
            asset_loc_y = Some(parcel.y as i32);
        }
    }

    let event_time =
        DateTime::from_timestamp(event.event_timestamp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let operation_id = derive_operation_id(
        world.as_str(),
        op_type,
        &event_time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        &from,
        &asset.identifier,
    );

    market_operations::Model {
        id: 0,
        operation_id,
        downloaded_from: SOURCE_TAG.to_string(),
        op_type: op_type.to_string(),
        source: PROTOCOL_NAME.to_string(),
        date: event_time,
        last_updated_at: Some(event_time),
        metaverse: world.as_str().to_string(),
        blockchain: blockchain.to_string(),
        cursor: event_time.timestamp_millis().to_string(),
        reverted: false,
        order_id: String::new(),
        order_hash: event.order_hash.clone(),
        transaction_hash: event.transaction.clone(),
        transaction_type: String::new(),
        maker: event.maker.clone(),
        taker: event.taker.clone(),
        buyer: event.buyer.clone(),
        seller: event.seller.clone(),
        asset_contract: asset.contract.clone(),
        asset_type: world.asset_type(&asset.contract).to_string(),
        asset_id: asset.identifier.clone(),
        asset_location,
        asset_loc_x,
        asset_loc_y,
        asset_value: event.quantity,
        payment_blockchain: event.chain.clone(),
        payment_type,
        payment_token,
        payment_currency,
        payment_amount,
        payment_amount_usd: None,
        payment_ccy_price: None,
        buyer_order_hash: String::new(),
        seller_order_hash: String::new(),
        block_hash: String::new(),
        block_number: 0,
        log_index: 0,
        data: serde_json::json!({ "rawData": event }),
    }
}

#[derive(Clone)]
pub struct OpenSeaService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenSeaService {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    pub async fn collection_events(
        &self,
        collection: &str,
        event_types: &[String],
        before: i64,
        next_token: &str,
    ) -> Result<EventPage, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/events/collection/{}", self.base_url, collection);

        let mut query: Vec<(&str, String)> = Vec::new();
        for event_type in event_types {
            query.push(("event_type", event_type.clone()));
        }
        if before != 0 {
            query.push(("before", before.to_string()));
        }
        if !next_token.is_empty() {
            query.push(("next", next_token.to_string()));
        }
        query.push(("limit", PAGE_LIMIT.to_string()));

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("x-api-key", &self.api_key)
            .query(&query)
            .send()
            .await?;

        read_json_response(response).await
    }
}

/// One download run: resume from the last committed record, fetch a page,
/// persist it, stop. The `next` token is honored only insofar as its
/// absence or the minimum-timestamp guard also end the walk.
pub async fn run(
    db: &DatabaseConnection,
    service: &OpenSeaService,
    world: World,
    blockchain: &str,
    event_types: &[String],
    parcels: &ParcelDirectory,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let prefix = format!(
        "{{ {} | {} | {} }}",
        blockchain,
        world.as_str(),
        event_types.join(",")
    );
    tracing::info!("[{}] Start", prefix);

    let checkpoint_types: Vec<String> = event_types
        .iter()
        .map(|t| map_event_type(t).to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let last = find_last_operation(db, SOURCE_TAG, world, None, None, &checkpoint_types).await?;
    let mut before = last
        .map(|op| op.date.timestamp())
        .unwrap_or(EPOCH_START_TIMESTAMP);
    if before == 0 {
        before = EPOCH_START_TIMESTAMP;
    }
    tracing::info!("[{}] First request `before` timestamp: {}", prefix, before);

    let mut next_token = String::new();
    let mut stop = false;
    let mut request_count = 0u32;
    while !stop {
        request_count += 1;
        tracing::info!("[{}] Running request #{}", prefix, request_count);

        let page = service
            .collection_events(world.as_str(), event_types, before, &next_token)
            .await?;
        let operations = page
            .asset_events
            .iter()
            .map(|event| into_insertable(parse_event(event, world, blockchain, parcels)))
            .collect();
        upsert_operations(db, operations).await?;
        tracing::info!(
            "[{}] Saved {} operations for request #{}",
            prefix,
            page.asset_events.len(),
            request_count
        );

        if page.next.is_empty() {
            stop = true;
        } else if page
            .asset_events
            .last()
            .is_some_and(|event| event.event_timestamp < MIN_EVENT_TIMESTAMP)
        {
            // Walked past the beginning of the tracked window
            stop = true;
        } else {
            next_token = page.next.clone();
            // One page per invocation; the next run resumes from the
            // checkpoint derived from the rows committed above.
            stop = true;
        }
    }

    tracing::info!("[{}] Done after {} request(s)", prefix, request_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parcels::Parcel;
    use rust_decimal_macros::dec;

    fn empty_parcels() -> ParcelDirectory {
        ParcelDirectory::from_parcels(Vec::new())
    }

    fn sale_event() -> Event {
        Event {
            event_type: "order".into(),
            event_timestamp: 1682935200,
            transaction: "0xtx".into(),
            order_hash: "0xorder".into(),
            chain: "ethereum".into(),
            payment: Some(EventPayment {
                quantity: "250000000000000000".into(),
                token_address: "0xmana".into(),
                decimals: 18,
                symbol: "MANA".into(),
            }),
            seller: "0xseller".into(),
            buyer: "0xbuyer".into(),
            order_type: "sale".into(),
            asset: Some(EventAsset {
                identifier: "1234".into(),
                collection: "decentraland".into(),
                contract: "0xf87e31492faf9a91b02ee0deaad50d51d56d5d4d".into(),
                token_standard: "erc721".into(),
                name: "Parcel".into(),
            }),
            quantity: 1,
            ..Default::default()
        }
    }

    #[test]
    fn integer_base_units_convert_exactly() {
        assert_eq!(
            parse_payment_amount("250000000000000000", 18),
            dec!(0.25)
        );
        assert_eq!(parse_payment_amount("1050", 2), dec!(10.5));
    }

    #[test]
    fn divisor_table_covers_even_exponents_up_to_18() {
        for decimals in [2u32, 4, 6, 8, 10, 12, 14, 16, 18] {
            let divisor = divisor_for_decimals(decimals).unwrap();
            assert_eq!(divisor, Decimal::from_i128_with_scale(10_i128.pow(decimals), 0));
        }
        assert!(divisor_for_decimals(3).is_none());
        assert_eq!(parse_payment_amount("1000", 3), Decimal::ZERO);
    }

    #[test]
    fn unparseable_amount_degrades_to_zero() {
        assert_eq!(parse_payment_amount("not-a-number", 18), Decimal::ZERO);
    }

    #[test]
    fn order_types_map_onto_canonical_types() {
        assert_eq!(map_event_type("sale"), "SELL");
        assert_eq!(map_event_type("listing"), "LIST");
        assert_eq!(map_event_type("item_offer"), "BID");
        assert_eq!(map_event_type("TRANSFER"), "TRANSFER");
        assert_eq!(map_event_type("redemption"), "");
    }

    #[test]
    fn explicit_addresses_win_over_seller_buyer() {
        let mut event = sale_event();
        event.from_address = "0xfrom".into();
        event.to_address = "0xto".into();
        let (from, to) = resolve_parties(&event);
        assert_eq!(from, "0xfrom");
        assert_eq!(to, "0xto");

        let event = sale_event();
        let (from, to) = resolve_parties(&event);
        assert_eq!(from, "0xseller");
        assert_eq!(to, "0xbuyer");
    }

    #[test]
    fn maker_fills_the_side_implied_by_the_order_type() {
        let mut listing = Event {
            order_type: "listing".into(),
            maker: "0xmaker".into(),
            ..Default::default()
        };
        let (from, _) = resolve_parties(&listing);
        assert_eq!(from, "0xmaker");

        listing.order_type = "item_offer".into();
        let (_, to) = resolve_parties(&listing);
        assert_eq!(to, "0xmaker");
    }

    #[test]
    fn sale_event_parses_into_canonical_operation() {
        let parcels = ParcelDirectory::from_parcels(vec![Parcel {
            id: "-44,-77".into(),
            x: -44,
            y: -77,
            token_id: "1234".into(),
        }]);
        let operation = parse_event(&sale_event(), World::Decentraland, "ethereum", &parcels);

        assert_eq!(operation.op_type, "SELL");
        assert_eq!(operation.downloaded_from, "opensea");
        assert_eq!(operation.source, "OPEN_SEA");
        assert_eq!(operation.payment_amount, dec!(0.25));
        assert_eq!(operation.payment_currency, "MANA");
        assert_eq!(operation.payment_type, "ERC20");
        assert_eq!(operation.asset_type, "land");
        assert_eq!(operation.asset_location, "-44,-77");
        assert_eq!(operation.asset_loc_x, Some(-44));
        assert_eq!(operation.asset_loc_y, Some(-77));
        assert_eq!(operation.cursor, "1682935200000");
        assert_eq!(operation.operation_id.len(), 64);
    }

    #[test]
    fn native_gas_payment_keeps_its_symbol_as_type() {
        let mut event = sale_event();
        event.payment = Some(EventPayment {
            quantity: "1000000000000000000".into(),
            token_address: String::new(),
            decimals: 18,
            symbol: "ETH".into(),
        });
        let operation = parse_event(&event, World::Decentraland, "ethereum", &empty_parcels());
        assert_eq!(operation.payment_type, "ETH");
        assert_eq!(operation.payment_amount, dec!(1));
    }

    #[test]
    fn unknown_order_type_still_yields_a_record() {
        let mut event = sale_event();
        event.order_type = "redemption".into();
        let operation = parse_event(&event, World::Decentraland, "ethereum", &empty_parcels());
        assert_eq!(operation.op_type, "");
        assert_eq!(operation.payment_amount, dec!(0.25));
    }

    #[test]
    fn same_event_always_derives_the_same_identity() {
        let parcels = empty_parcels();
        let a = parse_event(&sale_event(), World::Decentraland, "ethereum", &parcels);
        let b = parse_event(&sale_event(), World::Decentraland, "ethereum", &parcels);
        assert_eq!(a.operation_id, b.operation_id);
    }
}
