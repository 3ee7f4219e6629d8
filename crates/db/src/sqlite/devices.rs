//! SQLite-Implementierung des DeviceRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{GeraetRecord, NeuesGeraet};
use crate::repository::{DbResult, DeviceRepository};
use crate::sqlite::pool::SqliteDb;

const SPALTEN: &str = "device_id, name, ip, create_time, connect_time";

#[async_trait]
impl DeviceRepository for SqliteDb {
    async fn get_by_name(&self, name: &str) -> DbResult<Option<GeraetRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM devices WHERE name = ?");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_geraet(&r)).transpose()
    }

    async fn create(&self, data: NeuesGeraet<'_>) -> DbResult<GeraetRecord> {
        let now = Utc::now();

        let ergebnis = sqlx::query("INSERT INTO devices (name, ip, create_time) VALUES (?, ?, ?)")
            .bind(data.name)
            .bind(data.ip)
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    DbError::Eindeutigkeit(format!("Geraetename '{}' bereits vergeben", data.name))
                }
                _ => DbError::Sqlx(e),
            })?;

        tracing::debug!(name = data.name, ip = data.ip, "Geraet angelegt");

        Ok(GeraetRecord {
            device_id: ergebnis.last_insert_rowid(),
            name: data.name.to_string(),
            ip: data.ip.to_string(),
            create_time: now,
            connect_time: None,
        })
    }

    async fn update_connect_time(&self, device_id: i64) -> DbResult<()> {
        let affected = sqlx::query("UPDATE devices SET connect_time = ? WHERE device_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(device_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Geraet {device_id}")));
        }
        Ok(())
    }

    async fn list(&self) -> DbResult<Vec<GeraetRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM devices ORDER BY name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_geraet).collect()
    }
}

fn zeitpunkt_parsen(spalte: &str, wert: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(wert)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltiger Zeitpunkt in {spalte} '{wert}': {e}")))
}

fn row_to_geraet(row: &sqlx::sqlite::SqliteRow) -> DbResult<GeraetRecord> {
    use sqlx::Row as _;

    let create_time: String = row.try_get("create_time")?;
    let connect_time: Option<String> = row.try_get("connect_time")?;

    Ok(GeraetRecord {
        device_id: row.try_get("device_id")?,
        name: row.try_get("name")?,
        ip: row.try_get("ip")?,
        create_time: zeitpunkt_parsen("create_time", &create_time)?,
        connect_time: connect_time
            .as_deref()
            .map(|s| zeitpunkt_parsen("connect_time", s))
            .transpose()?,
    })
}
