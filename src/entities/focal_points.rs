//! SeaORM Entity for world focal points (plazas, roads, districts)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "focal_points")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub focal_point_id: String,
    /// "plaza" | "road" | "district"
    pub focal_point_type: String,
    pub estate_id: String,
    pub dcl_id: String,
    pub name: String,
    pub description: String,
    /// JSON array of "x,y" member-parcel coordinates
    pub parcels_loc: Json,
    pub parcels_count: i32,
    pub category: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
