//! Enrichment & export engine.
//!
//! Groups stored operations by asset, links each SELL to the LIST or BID
//! that preceded it, enriches rows with currency prices and focal-point
//! distances, assembles the column schema and hands the result to the
//! tabular writer.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::DatabaseConnection;

use crate::entities::market_operations;
use crate::models::{op_types, World};
use crate::services::csv_writer::{write_table, Cell, Column, ColumnType};
use crate::services::currencies::CurrencyPriceSeries;
use crate::services::focal_points::FocalPoints;
use crate::services::geometry::DistanceMetric;
use crate::services::operations::{top_traded_assets, AssetOperations};

/// Only the most traded assets are exported; the windowed matcher
/// dominates export cost and an unbounded join would be unbounded memory.
pub const EXPORT_ASSET_CAP: u64 = 20;

/// Hash/address columns eligible for `0x123456...abcd` shortening.
const LONG_FIELD_COLUMNS: &[&str] = &[
    "transaction_hash",
    "order_hash",
    "order_id",
    "maker",
    "taker",
    "buyer",
    "seller",
    "payment_token",
    "asset_contract",
    "asset_id",
    "buyer_order_hash",
    "seller_order_hash",
    "block_hash",
];

#[derive(Debug, Clone)]
pub struct ExportTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Default)]
struct RelationInfo {
    related_to: &'static str,
    rt_date: Option<DateTime<Utc>>,
    rt_time_diff: f64,
    rt_operation_id: String,
}

impl RelationInfo {
    fn link(
        related_to: &'static str,
        rt_date: DateTime<Utc>,
        rt_time_diff: f64,
        rt_operation_id: &str,
    ) -> Self {
        Self {
            related_to,
            rt_date: Some(rt_date),
            rt_time_diff,
            rt_operation_id: rt_operation_id.to_string(),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.related_to.to_string()),
            Cell::Text(
                self.rt_date
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            ),
            Cell::Float(Some(self.rt_time_diff)),
            Cell::Text(self.rt_operation_id.clone()),
        ]
    }
}

fn relation_columns() -> Vec<Column> {
    vec![
        Column::new("related_to", ColumnType::Text),
        Column::new("rt_date", ColumnType::Text),
        Column::new("rt_time_diff", ColumnType::Float),
        Column::new("rt_operation_id", ColumnType::Text),
    ]
}

/// Canonical record columns in export order. The cursor, reverted flag
/// and raw payload stay out of the artifact.
fn canonical_columns() -> Vec<Column> {
    vec![
        Column::new("operation_id", ColumnType::Text),
        Column::new("downloaded_from", ColumnType::Text),
        Column::new("type", ColumnType::Text),
        Column::new("source", ColumnType::Text),
        Column::new("last_updated_at", ColumnType::Text),
        Column::new("date", ColumnType::Text),
        Column::new("metaverse", ColumnType::Text),
        Column::new("blockchain", ColumnType::Text),
        Column::new("order_id", ColumnType::Text),
        Column::new("order_hash", ColumnType::Text),
        Column::new("transaction_hash", ColumnType::Text),
        Column::new("transaction_type", ColumnType::Text),
        Column::new("maker", ColumnType::Text),
        Column::new("taker", ColumnType::Text),
        Column::new("buyer", ColumnType::Text),
        Column::new("seller", ColumnType::Text),
        Column::new("asset_contract", ColumnType::Text),
        Column::new("asset_type", ColumnType::Text),
        Column::new("asset_id", ColumnType::Text),
        Column::new("asset_location", ColumnType::Text),
        Column::new("asset_loc_x", ColumnType::Int),
        Column::new("asset_loc_y", ColumnType::Int),
        Column::new("asset_value", ColumnType::Int),
        Column::new("payment_blockchain", ColumnType::Text),
        Column::new("payment_type", ColumnType::Text),
        Column::new("payment_token", ColumnType::Text),
        Column::new("payment_currency", ColumnType::Text),
        Column::new("payment_amount", ColumnType::Decimal),
        Column::new("payment_amount_usd", ColumnType::Decimal),
        Column::new("payment_ccy_price", ColumnType::Decimal),
        Column::new("buyer_order_hash", ColumnType::Text),
        Column::new("seller_order_hash", ColumnType::Text),
        Column::new("block_hash", ColumnType::Text),
        Column::new("block_number", ColumnType::Int),
        Column::new("log_index", ColumnType::Int),
    ]
}

fn canonical_cells(op: &market_operations::Model) -> Vec<Cell> {
    vec![
        Cell::Text(op.operation_id.clone()),
        Cell::Text(op.downloaded_from.clone()),
        Cell::Text(op.op_type.clone()),
        Cell::Text(op.source.clone()),
        Cell::date(op.last_updated_at),
        Cell::date(Some(op.date)),
        Cell::Text(op.metaverse.clone()),
        Cell::Text(op.blockchain.clone()),
        Cell::Text(op.order_id.clone()),
        Cell::Text(op.order_hash.clone()),
        Cell::Text(op.transaction_hash.clone()),
        Cell::Text(op.transaction_type.clone()),
        Cell::Text(op.maker.clone()),
        Cell::Text(op.taker.clone()),
        Cell::Text(op.buyer.clone()),
        Cell::Text(op.seller.clone()),
        Cell::Text(op.asset_contract.clone()),
        Cell::Text(op.asset_type.clone()),
        Cell::Text(op.asset_id.clone()),
        Cell::Text(op.asset_location.clone()),
        Cell::Int(op.asset_loc_x.map(i64::from)),
        Cell::Int(op.asset_loc_y.map(i64::from)),
        Cell::Int(Some(op.asset_value)),
        Cell::Text(op.payment_blockchain.clone()),
        Cell::Text(op.payment_type.clone()),
        Cell::Text(op.payment_token.clone()),
        Cell::Text(op.payment_currency.clone()),
        Cell::Decimal(Some(op.payment_amount)),
        Cell::Decimal(op.payment_amount_usd),
        Cell::Decimal(op.payment_ccy_price),
        Cell::Text(op.buyer_order_hash.clone()),
        Cell::Text(op.seller_order_hash.clone()),
        Cell::Text(op.block_hash.clone()),
        Cell::Int(Some(op.block_number)),
        Cell::Int(Some(op.log_index)),
    ]
}

/// Fractional days between two instants.
fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / 86400.0
}

/// Backward scan of `ops[window_start..end]` for the most recent operation
/// of `prev_kind` matching the sale: same asset, same currency, exactly
/// equal amount, and the maker on the expected side of the trade.
fn find_previous(
    prev_kind: &str,
    sale: &market_operations::Model,
    ops: &[market_operations::Model],
    window_start: usize,
    end: usize,
) -> Option<usize> {
    for j in (window_start..end).rev() {
        let prev = &ops[j];
        if prev.op_type != prev_kind {
            continue;
        }
        let same_maker = match prev_kind {
            op_types::LIST => prev.maker == sale.seller,
            op_types::BID => prev.maker == sale.buyer,
            _ => false,
        };
        if same_maker
            && prev.asset_id == sale.asset_id
            && prev.payment_currency == sale.payment_currency
            && prev.payment_amount == sale.payment_amount
        {
            return Some(j);
        }
    }
    None
}

fn shorten_long_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 20 {
        return value.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

struct ExportRow {
    date: DateTime<Utc>,
    cells: Vec<Cell>,
}

pub struct ExportEngine {
    world: World,
    prices: CurrencyPriceSeries,
    focal_points: Option<FocalPoints>,
    metric: DistanceMetric,
    shorten_long_fields: bool,
}

impl ExportEngine {
    pub fn new(
        world: World,
        prices: CurrencyPriceSeries,
        focal_points: Option<FocalPoints>,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            world,
            prices,
            focal_points,
            metric,
            shorten_long_fields: false,
        }
    }

    pub fn with_shortened_long_fields(mut self, enabled: bool) -> Self {
        self.shorten_long_fields = enabled;
        self
    }

    /// Full column schema: canonical fields, the relation block, the
    /// world's distance block (when it has coordinates), then one
    /// price/market-cap pair per world currency.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = canonical_columns();
        columns.extend(relation_columns());
        if let Some(focal_points) = &self.focal_points {
            columns.extend(focal_points.distance_columns());
        }
        for currency in self.world.currencies() {
            columns.push(Column::new(
                format!("{}_PRICE", currency),
                ColumnType::Decimal,
            ));
            columns.push(Column::new(
                format!("{}_MARKET_CAP", currency),
                ColumnType::Decimal,
            ));
        }
        columns
    }

    pub fn build_table(&self, assets: &[AssetOperations]) -> ExportTable {
        let columns = self.columns();
        let relation_offset = canonical_columns().len();

        let mut rows: Vec<ExportRow> = Vec::new();
        let mut row_index: HashMap<String, usize> = HashMap::new();

        for asset in assets {
            let ops = &asset.operations;
            tracing::debug!(
                "Processing asset {} ({} operations)",
                asset.asset_id,
                ops.len()
            );

            let mut window_start = 0usize;
            for i in 0..ops.len() {
                let mut op = ops[i].clone();

                // Resolve the USD amount when the marketplace did not report one
                if op.payment_amount_usd.is_none_or(|v| v.is_zero()) {
                    if let Some(price) = self.prices.price_at(&op.payment_currency, op.date) {
                        op.payment_ccy_price = Some(price);
                        op.payment_amount_usd = Some(price * op.payment_amount);
                    }
                }

                let mut relation = RelationInfo::default();
                if op.op_type == op_types::SELL && i > 0 {
                    let matched = find_previous(op_types::LIST, &op, ops, window_start, i)
                        .map(|j| (op_types::LIST, j))
                        .or_else(|| {
                            find_previous(op_types::BID, &op, ops, window_start, i)
                                .map(|j| (op_types::BID, j))
                        });
                    if let Some((kind, j)) = matched {
                        let prev = &ops[j];
                        let diff = days_between(op.date, prev.date);
                        relation = RelationInfo::link(kind, prev.date, diff, &prev.operation_id);

                        // A LIST/BID is consumed by at most one SELL
                        window_start = j + 1;

                        // Reciprocal link onto the already-emitted row
                        if let Some(&row_pos) = row_index.get(&prev.operation_id) {
                            let back =
                                RelationInfo::link(op_types::SELL, op.date, diff, &op.operation_id);
                            for (offset, cell) in back.cells().into_iter().enumerate() {
                                rows[row_pos].cells[relation_offset + offset] = cell;
                            }
                        }
                    }
                }

                let mut cells = canonical_cells(&op);
                cells.extend(relation.cells());
                if let Some(focal_points) = &self.focal_points {
                    let location = op
                        .asset_loc_x
                        .zip(op.asset_loc_y)
                        .map(|(x, y)| (i64::from(x), i64::from(y)));
                    cells.extend(focal_points.distance_cells(location, self.metric));
                }
                for currency in self.world.currencies() {
                    cells.push(Cell::Decimal(self.prices.price_at(currency, op.date)));
                    cells.push(Cell::Decimal(self.prices.market_cap_at(currency, op.date)));
                }

                if self.shorten_long_fields {
                    for (n, column) in columns.iter().enumerate() {
                        if LONG_FIELD_COLUMNS.contains(&column.name.as_str()) {
                            if let Some(Cell::Text(value)) = cells.get_mut(n) {
                                *value = shorten_long_value(value);
                            }
                        }
                    }
                }

                row_index
                    .entry(op.operation_id.clone())
                    .or_insert(rows.len());
                rows.push(ExportRow {
                    date: op.date,
                    cells,
                });
            }
        }

        rows.sort_by_key(|row| row.date);

        ExportTable {
            columns,
            rows: rows.into_iter().map(|row| row.cells).collect(),
        }
    }
}

/// Load reference data, build the table for the world's most traded
/// assets and write the delimited artifact.
pub async fn run_export(
    db: &DatabaseConnection,
    world: World,
    source: &str,
    metric: DistanceMetric,
    shorten_long_fields: bool,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    let prefix = format!("EXPORT {{ {} | {} }}", world.as_str(), source);
    tracing::info!("[{}] Loading reference data...", prefix);

    let prices = CurrencyPriceSeries::load(db).await?;
    let focal_points = if world.has_coordinates() {
        Some(FocalPoints::load(db).await?)
    } else {
        None
    };

    let engine = ExportEngine::new(world, prices, focal_points, metric)
        .with_shortened_long_fields(shorten_long_fields);

    tracing::info!("[{}] Fetching operations...", prefix);
    let assets = top_traded_assets(db, world, source, EXPORT_ASSET_CAP).await?;
    tracing::info!("[{}] Fetched {} assets", prefix, assets.len());

    let table = engine.build_table(&assets);

    let path = PathBuf::from(format!(
        "files/operations_{}_{}.csv",
        world.as_str(),
        source
    ));
    write_table(&path, &table.columns, &table.rows)?;
    tracing::info!(
        "[{}] Wrote {} rows to {}",
        prefix,
        table.rows.len(),
        path.display()
    );

    Ok(path)
}
