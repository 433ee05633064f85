pub use super::currencies::Entity as Currencies;
pub use super::currency_prices::Entity as CurrencyPrices;
pub use super::focal_points::Entity as FocalPoints;
pub use super::market_operations::Entity as MarketOperations;
