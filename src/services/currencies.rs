//! Currency reference data: the token symbol directory used by the
//! Rarible adapter and the in-memory price-interval series used by the
//! export engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{currencies, currency_prices, prelude::*};

/// Map `blockchain:contract` (lowercased) to the currency symbol, for one
/// blockchain. Token-denominated payments resolve their symbol through this.
pub async fn currency_symbols(
    db: &DatabaseConnection,
    blockchain: &str,
) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
    let rows = Currencies::find()
        .filter(currencies::Column::Blockchain.eq(blockchain))
        .all(db)
        .await?;

    let mut symbols = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = format!(
            "{}:{}",
            row.blockchain.to_lowercase(),
            row.contract.to_lowercase()
        );
        symbols.insert(key, row.symbols);
    }

    tracing::info!("Loaded {} currency contracts for {}", symbols.len(), blockchain);

    Ok(symbols)
}

#[derive(Debug, Clone)]
pub struct PriceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub market_cap: Decimal,
}

impl From<currency_prices::Model> for PriceInterval {
    fn from(row: currency_prices::Model) -> Self {
        Self {
            start: row.start,
            end: row.end,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            market_cap: row.market_cap,
        }
    }
}

/// All price series for a run, held in memory and read-only after load.
#[derive(Debug, Default)]
pub struct CurrencyPriceSeries {
    series: HashMap<String, Vec<PriceInterval>>,
}

impl CurrencyPriceSeries {
    pub async fn load(
        db: &DatabaseConnection,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let rows = CurrencyPrices::find()
            .order_by_asc(currency_prices::Column::Currency)
            .order_by_asc(currency_prices::Column::Start)
            .all(db)
            .await?;

        let mut series: HashMap<String, Vec<PriceInterval>> = HashMap::new();
        for row in rows {
            series
                .entry(row.currency.clone())
                .or_default()
                .push(row.into());
        }

        tracing::info!("Loaded price series for {} currencies", series.len());

        Ok(Self { series })
    }

    pub fn from_intervals(series: HashMap<String, Vec<PriceInterval>>) -> Self {
        Self { series }
    }

    /// Price of a currency at a point in time.
    ///
    /// Before the first interval: the first open. At or after the last
    /// interval's end: the last close. Inside an interval: the mean of
    /// open/high/low/close. `None` when the currency has no series or the
    /// date falls in a gap.
    pub fn price_at(&self, currency: &str, date: DateTime<Utc>) -> Option<Decimal> {
        let intervals = self.series.get(currency)?;
        let first = intervals.first()?;
        let last = intervals.last()?;

        if date < first.start {
            return Some(first.open);
        }
        if date >= last.end {
            return Some(last.close);
        }
        intervals
            .iter()
            .find(|p| p.start <= date && date < p.end)
            .map(|p| (p.open + p.high + p.low + p.close) / Decimal::from(4))
    }

    /// Market cap of a currency at a point in time, same boundary rules as
    /// [`price_at`](Self::price_at) but without averaging.
    pub fn market_cap_at(&self, currency: &str, date: DateTime<Utc>) -> Option<Decimal> {
        let intervals = self.series.get(currency)?;
        let first = intervals.first()?;
        let last = intervals.last()?;

        if date < first.start {
            return Some(first.market_cap);
        }
        if date >= last.end {
            return Some(last.market_cap);
        }
        intervals
            .iter()
            .find(|p| p.start <= date && date < p.end)
            .map(|p| p.market_cap)
    }
}
