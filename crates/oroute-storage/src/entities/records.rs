use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub hostname: String,
    pub upstream_endpoint: String,
    pub upstream_secret: String,
    pub ip: String,
    pub body: String,
    pub model: String,
    pub response: String,
    pub response_time_ms: i64,
    pub elapsed_ms: i64,
    pub status: i32,
    pub authorization: String,
    pub user_agent: String,
    pub headers: String,
}

impl ActiveModelBehavior for ActiveModel {}
