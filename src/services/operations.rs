//! Idempotent store gateway for canonical operations.
//!
//! Adapters write through [`upsert_operations`] (replace-or-insert on the
//! natural key) and resume from [`find_last_operation`]. The export engine
//! reads through [`top_traded_assets`].

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};

use crate::entities::{market_operations, prelude::*};
use crate::models::World;

/// Most recent stored operation matching the adapter's scope. Absence is
/// not an error: a first run starts from the fixed epoch instead.
pub async fn find_last_operation(
    db: &DatabaseConnection,
    downloaded_from: &str,
    world: World,
    blockchain: Option<&str>,
    asset_contract: Option<&str>,
    op_types: &[String],
) -> Result<Option<market_operations::Model>, Box<dyn std::error::Error + Send + Sync>> {
    let mut query = MarketOperations::find()
        .filter(market_operations::Column::DownloadedFrom.eq(downloaded_from))
        .filter(market_operations::Column::Metaverse.eq(world.as_str()))
        .filter(market_operations::Column::OpType.is_in(op_types.to_vec()));
    if let Some(blockchain) = blockchain {
        query = query.filter(market_operations::Column::Blockchain.eq(blockchain));
    }
    if let Some(asset_contract) = asset_contract {
        query = query.filter(market_operations::Column::AssetContract.eq(asset_contract));
    }

    let last = query
        .order_by_desc(market_operations::Column::Date)
        .one(db)
        .await?;
    Ok(last)
}

/// Bulk replace-or-insert, one statement per page. Rows conflicting on the
/// natural key (operation_id, type, source, date) have every other column
/// replaced by the incoming values.
pub async fn upsert_operations(
    db: &DatabaseConnection,
    operations: Vec<market_operations::ActiveModel>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if operations.is_empty() {
        return Ok(());
    }

    let count = operations.len();
    MarketOperations::insert_many(operations)
        .on_conflict(
            OnConflict::columns([
                market_operations::Column::OperationId,
                market_operations::Column::OpType,
                market_operations::Column::Source,
                market_operations::Column::Date,
            ])
            .update_columns([
                market_operations::Column::DownloadedFrom,
                market_operations::Column::LastUpdatedAt,
                market_operations::Column::Metaverse,
                market_operations::Column::Blockchain,
                market_operations::Column::Cursor,
                market_operations::Column::Reverted,
                market_operations::Column::OrderId,
                market_operations::Column::OrderHash,
                market_operations::Column::TransactionHash,
                market_operations::Column::TransactionType,
                market_operations::Column::Maker,
                market_operations::Column::Taker,
                market_operations::Column::Buyer,
                market_operations::Column::Seller,
                market_operations::Column::AssetContract,
                market_operations::Column::AssetType,
                market_operations::Column::AssetId,
                market_operations::Column::AssetLocation,
                market_operations::Column::AssetLocX,
                market_operations::Column::AssetLocY,
                market_operations::Column::AssetValue,
                market_operations::Column::PaymentBlockchain,
                market_operations::Column::PaymentType,
                market_operations::Column::PaymentToken,
                market_operations::Column::PaymentCurrency,
                market_operations::Column::PaymentAmount,
                market_operations::Column::PaymentAmountUsd,
                market_operations::Column::PaymentCcyPrice,
                market_operations::Column::BuyerOrderHash,
                market_operations::Column::SellerOrderHash,
                market_operations::Column::BlockHash,
                market_operations::Column::BlockNumber,
                market_operations::Column::LogIndex,
                market_operations::Column::Data,
            ])
            .to_owned(),
        )
        .exec(db)
        .await?;

    tracing::debug!("Upserted {} operations", count);
    Ok(())
}

/// All operations for a (world, source) ordered by ascending date, with a
/// row cap.
pub async fn get_operations(
    db: &DatabaseConnection,
    world: World,
    source: &str,
    limit: u64,
) -> Result<Vec<market_operations::Model>, Box<dyn std::error::Error + Send + Sync>> {
    let rows = MarketOperations::find()
        .filter(market_operations::Column::Metaverse.eq(world.as_str()))
        .filter(market_operations::Column::DownloadedFrom.eq(source))
        .order_by_asc(market_operations::Column::Date)
        .limit(limit)
        .all(db)
        .await?;
    Ok(rows)
}

#[derive(Debug)]
pub struct AssetOperations {
    pub asset_id: String,
    pub count: i64,
    pub operations: Vec<market_operations::Model>,
}

#[derive(Debug, FromQueryResult)]
struct AssetCount {
    asset_id: String,
    op_count: i64,
}

/// The `limit` most traded assets for a (world, source), each joined with
/// its full operation list across marketplaces, ordered by date.
///
/// The cap bounds the windowed matching cost downstream; an unbounded
/// join would hold every operation of the world in memory.
pub async fn top_traded_assets(
    db: &DatabaseConnection,
    world: World,
    source: &str,
    limit: u64,
) -> Result<Vec<AssetOperations>, Box<dyn std::error::Error + Send + Sync>> {
    let counts = AssetCount::find_by_statement(Statement::from_sql_and_values(
        db.get_database_backend(),
        r#"
        SELECT asset_id, COUNT(*) AS op_count
        FROM market_operations
        WHERE metaverse = $1 AND downloaded_from = $2 AND asset_id <> ''
        GROUP BY asset_id
        ORDER BY op_count DESC
        LIMIT $3
        "#,
        vec![
            world.as_str().into(),
            source.into(),
            (limit as i64).into(),
        ],
    ))
    .all(db)
    .await?;

    let mut assets = Vec::with_capacity(counts.len());
    for count in counts {
        let operations = MarketOperations::find()
            .filter(market_operations::Column::Metaverse.eq(world.as_str()))
            .filter(market_operations::Column::AssetId.eq(count.asset_id.as_str()))
            .order_by_asc(market_operations::Column::Date)
            .all(db)
            .await?;
        assets.push(AssetOperations {
            asset_id: count.asset_id,
            count: count.op_count,
            operations,
        });
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveValue, DatabaseBackend, IntoActiveModel, MockDatabase};

    fn sample_operation() -> market_operations::Model {
        market_operations::Model {
            id: 1,
            operation_id: "op-1".into(),
            downloaded_from: "opensea".into(),
            op_type: "SELL".into(),
            source: "OPEN_SEA".into(),
            date: Utc.with_ymd_and_hms(2023, 5, 1, 10, 0, 0).unwrap(),
            last_updated_at: None,
            metaverse: "decentraland".into(),
            blockchain: "ethereum".into(),
            cursor: "1682935200000".into(),
            reverted: false,
            order_id: String::new(),
            order_hash: "0xorder".into(),
            transaction_hash: "0xtx".into(),
            transaction_type: String::new(),
            maker: "0xmaker".into(),
            taker: String::new(),
            buyer: "0xbuyer".into(),
            seller: "0xseller".into(),
            asset_contract: "0xland".into(),
            asset_type: "land".into(),
            asset_id: "1234".into(),
            asset_location: "-44,-77".into(),
            asset_loc_x: Some(-44),
            asset_loc_y: Some(-77),
            asset_value: 1,
            payment_blockchain: "ethereum".into(),
            payment_type: "ERC20".into(),
            payment_token: "0xmana".into(),
            payment_currency: "MANA".into(),
            payment_amount: dec!(10),
            payment_amount_usd: None,
            payment_ccy_price: None,
            buyer_order_hash: String::new(),
            seller_order_hash: String::new(),
            block_hash: String::new(),
            block_number: 0,
            log_index: 0,
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn find_last_operation_returns_most_recent_match() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![sample_operation()]])
            .into_connection();

        let found = find_last_operation(
            &db,
            "opensea",
            World::Decentraland,
            None,
            None,
            &["SELL".to_string(), "LIST".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(found.unwrap().operation_id, "op-1");
    }

    #[tokio::test]
    async fn find_last_operation_absence_is_not_an_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<market_operations::Model>::new()])
            .into_connection();

        let found = find_last_operation(
            &db,
            "rarible",
            World::Decentraland,
            Some("ethereum"),
            Some("0xland"),
            &["SELL".to_string()],
        )
        .await
        .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn get_operations_returns_rows_in_stored_order() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![sample_operation(), sample_operation()]])
            .into_connection();

        let rows = get_operations(&db, World::Decentraland, "opensea", 100_000)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn upsert_issues_a_single_on_conflict_statement() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![sample_operation()]])
            .into_connection();

        let mut model = sample_operation().into_active_model();
        model.id = ActiveValue::NotSet;

        upsert_operations(&db, vec![model]).await.unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        let rendered = format!("{:?}", log[0]);
        assert!(rendered.contains("ON CONFLICT"));
        assert!(rendered.contains("operation_id"));
    }

    #[tokio::test]
    async fn upsert_of_empty_batch_is_a_no_op() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        upsert_operations(&db, Vec::new()).await.unwrap();
        assert!(db.into_transaction_log().is_empty());
    }
}
