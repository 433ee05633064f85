//! World focal points (plazas, roads, districts) and the distance columns
//! they contribute to the export.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::focal_points::{self, Entity as FocalPointsEntity};
use crate::services::csv_writer::{Cell, Column, ColumnType};
use crate::services::geometry::{distance_to_zone, DistanceMetric};

/// Districts at or below this parcel count keep their own column but do
/// not contribute to category-level aggregates.
pub const SMALL_DISTRICT_MAX_PARCELS: i32 = 100;

#[derive(Debug, Clone)]
pub struct Zone {
    pub dcl_id: String,
    pub category: String,
    pub parcels: Vec<(i64, i64)>,
    pub parcels_count: i32,
}

impl Zone {
    fn from_model(model: focal_points::Model) -> Self {
        let parcels = match &model.parcels_loc {
            serde_json::Value::Array(locs) => locs
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(parse_parcel_loc)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            dcl_id: model.dcl_id,
            category: model.category,
            parcels,
            parcels_count: model.parcels_count,
        }
    }

    /// First word of the category label, used for category aggregates.
    fn category_key(&self) -> &str {
        self.category.split_whitespace().next().unwrap_or("")
    }
}

fn parse_parcel_loc(loc: &str) -> Option<(i64, i64)> {
    let (x, y) = loc.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[derive(Debug, Default)]
pub struct FocalPoints {
    plazas: Vec<Zone>,
    roads: Vec<Zone>,
    districts: Vec<Zone>,
    categories: Vec<String>,
}

async fn zones_of_type(
    db: &DatabaseConnection,
    focal_point_type: &str,
) -> Result<Vec<Zone>, Box<dyn std::error::Error + Send + Sync>> {
    let rows = FocalPointsEntity::find()
        .filter(focal_points::Column::FocalPointType.eq(focal_point_type))
        .order_by_asc(focal_points::Column::FocalPointId)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(Zone::from_model).collect())
}

impl FocalPoints {
    pub async fn load(
        db: &DatabaseConnection,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let plazas = zones_of_type(db, "plaza").await?;
        let roads = zones_of_type(db, "road").await?;
        let districts = zones_of_type(db, "district").await?;

        tracing::info!(
            "Loaded focal points: {} plazas, {} roads, {} districts",
            plazas.len(),
            roads.len(),
            districts.len()
        );

        Ok(Self::from_zones(plazas, roads, districts))
    }

    pub fn from_zones(plazas: Vec<Zone>, roads: Vec<Zone>, districts: Vec<Zone>) -> Self {
        let mut categories: Vec<String> = Vec::new();
        for district in &districts {
            let key = district.category_key().to_string();
            if !key.is_empty() && !categories.contains(&key) {
                categories.push(key);
            }
        }
        Self {
            plazas,
            roads,
            districts,
            categories,
        }
    }

    /// Column list for the distance block, in emission order: one column
    /// per plaza, the plaza aggregate, the road aggregate, one column per
    /// district, one aggregate per district category, the district
    /// aggregate. All float-typed.
    pub fn distance_columns(&self) -> Vec<Column> {
        let mut columns = Vec::new();
        for plaza in &self.plazas {
            columns.push(Column::new(
                format!("DIS__PLAZA__{}", plaza.dcl_id.to_uppercase()),
                ColumnType::Float,
            ));
        }
        columns.push(Column::new("DIS__PLAZA", ColumnType::Float));
        columns.push(Column::new("DIS__ROAD", ColumnType::Float));
        for district in &self.districts {
            columns.push(Column::new(
                format!("DIS__DISTRICT__{}", district.dcl_id.to_uppercase()),
                ColumnType::Float,
            ));
        }
        for category in &self.categories {
            columns.push(Column::new(
                format!("DIS__DISTCAT__{}", category.to_uppercase()),
                ColumnType::Float,
            ));
        }
        columns.push(Column::new("DIS__DISTRICT", ColumnType::Float));
        columns
    }

    /// Distance cells aligned with [`distance_columns`](Self::distance_columns).
    /// An unresolved location yields default cells.
    pub fn distance_cells(&self, location: Option<(i64, i64)>, metric: DistanceMetric) -> Vec<Cell> {
        let column_count = self.distance_columns().len();
        let Some((x, y)) = location else {
            return vec![Cell::Float(None); column_count];
        };

        let mut cells = Vec::with_capacity(column_count);

        let mut plaza_min = f64::MAX;
        for plaza in &self.plazas {
            let distance = distance_to_zone(metric, x, y, &plaza.parcels);
            cells.push(Cell::Float(Some(distance)));
            plaza_min = plaza_min.min(distance);
        }
        cells.push(Cell::Float(Some(plaza_min)));

        let road_min = self
            .roads
            .iter()
            .map(|road| distance_to_zone(metric, x, y, &road.parcels))
            .fold(f64::MAX, f64::min);
        cells.push(Cell::Float(Some(road_min)));

        let mut category_min: Vec<f64> = vec![f64::MAX; self.categories.len()];
        let mut district_min = f64::MAX;
        for district in &self.districts {
            let distance = distance_to_zone(metric, x, y, &district.parcels);
            cells.push(Cell::Float(Some(distance)));
            if district.parcels_count > SMALL_DISTRICT_MAX_PARCELS {
                if let Some(pos) = self
                    .categories
                    .iter()
                    .position(|c| c == district.category_key())
                {
                    category_min[pos] = category_min[pos].min(distance);
                }
            }
            district_min = district_min.min(distance);
        }
        for minimum in category_min {
            cells.push(Cell::Float(Some(minimum)));
        }
        cells.push(Cell::Float(Some(district_min)));

        cells
    }
}
