use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use common::prelude::{Guid, NodeManifest, NodeServices};

use crate::database::types::DGuid;
use crate::database::Database;

/// A known peer as stored in the `nodes` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRecord {
    pub guid: DGuid,
    pub certificate: String,
    pub hostname: String,
    pub port: i64,
    pub agent: bool,
    pub storage: bool,
    pub dds: bool,
    pub nds: bool,
    pub mms: bool,
    pub cms: bool,
    pub rms: bool,
    pub updated_at: OffsetDateTime,
}

impl NodeRecord {
    /// Insert a node, or replace every field of an existing one
    pub async fn upsert(node: &NodeManifest, db: &Database) -> Result<(), sqlx::Error> {
        let services = node.services;
        sqlx::query(
            r#"
            INSERT INTO nodes (
                guid, certificate, hostname, port,
                agent, storage, dds, nds, mms, cms, rms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (guid) DO UPDATE SET
                certificate = excluded.certificate,
                hostname = excluded.hostname,
                port = excluded.port,
                agent = excluded.agent,
                storage = excluded.storage,
                dds = excluded.dds,
                nds = excluded.nds,
                mms = excluded.mms,
                cms = excluded.cms,
                rms = excluded.rms,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(DGuid::from(node.guid))
        .bind(&node.certificate)
        .bind(&node.hostname)
        .bind(node.port as i64)
        .bind(services.agent)
        .bind(services.storage)
        .bind(services.dds)
        .bind(services.nds)
        .bind(services.mms)
        .bind(services.cms)
        .bind(services.rms)
        .execute(&**db)
        .await?;
        Ok(())
    }

    pub async fn get(guid: &Guid, db: &Database) -> Result<Option<NodeRecord>, sqlx::Error> {
        sqlx::query_as::<_, NodeRecord>(
            r#"
            SELECT
                guid, certificate, hostname, port,
                agent, storage, dds, nds, mms, cms, rms, updated_at
            FROM nodes
            WHERE guid = ?1
            "#,
        )
        .bind(DGuid::from(*guid))
        .fetch_optional(&**db)
        .await
    }

    /// All known nodes, most recently updated first
    pub async fn list(db: &Database) -> Result<Vec<NodeRecord>, sqlx::Error> {
        sqlx::query_as::<_, NodeRecord>(
            r#"
            SELECT
                guid, certificate, hostname, port,
                agent, storage, dds, nds, mms, cms, rms, updated_at
            FROM nodes
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&**db)
        .await
    }
}

impl From<NodeRecord> for NodeManifest {
    fn from(record: NodeRecord) -> Self {
        NodeManifest {
            guid: *record.guid,
            certificate: record.certificate,
            hostname: record.hostname,
            port: u16::try_from(record.port).unwrap_or_default(),
            services: NodeServices {
                agent: record.agent,
                storage: record.storage,
                dds: record.dds,
                nds: record.nds,
                mms: record.mms,
                cms: record.cms,
                rms: record.rms,
            },
        }
    }
}
