use sea_orm::{ActiveValue, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, Schema};

use oroute_common::RequestRecord;

use crate::entities;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unsupported database type '{0}'")]
    UnknownDbType(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Map the configured `dbtype`/`dbaddr` pair to a sea-orm DSN. `none`
/// disables persistence and yields `None`.
pub fn dsn_for(dbtype: &str, dbaddr: &str) -> Result<Option<String>, StorageError> {
    match dbtype {
        "none" => Ok(None),
        "sqlite" => {
            if dbaddr.starts_with("sqlite:") {
                Ok(Some(dbaddr.to_string()))
            } else {
                Ok(Some(format!("sqlite://{dbaddr}?mode=rwc")))
            }
        }
        "postgres" => {
            if dbaddr.starts_with("postgres://") || dbaddr.starts_with("postgresql://") {
                Ok(Some(dbaddr.to_string()))
            } else {
                Ok(Some(format!("postgres://{dbaddr}")))
            }
        }
        other => Err(StorageError::UnknownDbType(other.to_string())),
    }
}

#[derive(Clone)]
pub struct RecordStorage {
    db: DatabaseConnection,
}

impl RecordStorage {
    pub async fn connect(dsn: &str, verbose: bool) -> Result<Self, DbErr> {
        let mut options = ConnectOptions::new(dsn);
        options.sqlx_logging(verbose);
        let db = Database::connect(options).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create or migrate the records table to match the entity.
    pub async fn sync(&self) -> Result<(), DbErr> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Records)
            .sync(&self.db)
            .await
    }

    pub async fn insert_records(&self, batch: Vec<RequestRecord>) -> Result<(), DbErr> {
        if batch.is_empty() {
            return Ok(());
        }
        let models = batch
            .into_iter()
            .map(entities::records::ActiveModel::from);
        entities::Records::insert_many(models).exec(&self.db).await?;
        Ok(())
    }
}

impl From<RequestRecord> for entities::records::ActiveModel {
    fn from(record: RequestRecord) -> Self {
        entities::records::ActiveModel {
            id: ActiveValue::NotSet,
            created_at: ActiveValue::Set(record.created_at),
            hostname: ActiveValue::Set(record.hostname),
            upstream_endpoint: ActiveValue::Set(record.upstream_endpoint),
            upstream_secret: ActiveValue::Set(record.upstream_secret),
            ip: ActiveValue::Set(record.ip),
            body: ActiveValue::Set(record.body),
            model: ActiveValue::Set(record.model),
            response: ActiveValue::Set(record.response),
            response_time_ms: ActiveValue::Set(record.response_time_ms),
            elapsed_ms: ActiveValue::Set(record.elapsed_ms),
            status: ActiveValue::Set(record.status as i32),
            authorization: ActiveValue::Set(record.authorization),
            user_agent: ActiveValue::Set(record.user_agent),
            headers: ActiveValue::Set(record.headers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_mapping() {
        assert_eq!(
            dsn_for("sqlite", "./db.sqlite").unwrap().unwrap(),
            "sqlite://./db.sqlite?mode=rwc"
        );
        assert_eq!(
            dsn_for("sqlite", "sqlite::memory:").unwrap().unwrap(),
            "sqlite::memory:"
        );
        assert_eq!(
            dsn_for("postgres", "postgres://u:p@h/db").unwrap().unwrap(),
            "postgres://u:p@h/db"
        );
        assert!(dsn_for("none", "").unwrap().is_none());
        assert!(matches!(
            dsn_for("oracle", ""),
            Err(StorageError::UnknownDbType(_))
        ));
    }

    #[test]
    fn record_converts_to_active_model() {
        let mut record = RequestRecord::new("host".to_string(), "10.0.0.1".to_string());
        record.status = 502;
        record.model = "gpt-4".to_string();
        let active: entities::records::ActiveModel = record.into();
        assert_eq!(active.status, ActiveValue::Set(502));
        assert_eq!(active.model, ActiveValue::Set("gpt-4".to_string()));
        assert_eq!(active.id, ActiveValue::NotSet);
    }
}
