#![allow(dead_code)]

use pbx_dao::backend::database::{
    EndpointPersistor, ExtensionPersistor, LinePersistor, TenantPersistor,
};
use pbx_dao::models::{Endpoint, EndpointCustom, EndpointSccp, EndpointSip, Extension, Line, Tenant};
use pbx_dao::{Backend, DatabaseBackendConfig, SqliteBackend};
use sqlx::SqliteConnection;

pub struct TestDatabase {
    pub backend: SqliteBackend,
    pub tenant_uuid: String,
}

/// In-memory database with the schema and one tenant
pub async fn setup_test_database() -> Result<TestDatabase, Box<dyn std::error::Error>> {
    let backend = SqliteBackend::connect(&DatabaseBackendConfig::memory_sqlite()).await?;
    backend.init_schema().await?;

    let mut conn = backend.pool().acquire().await?;
    let tenant_uuid = add_tenant(&mut conn, "acme").await;
    drop(conn);

    Ok(TestDatabase {
        backend,
        tenant_uuid,
    })
}

pub async fn add_tenant(conn: &mut SqliteConnection, name: &str) -> String {
    let tenant = Tenant::new(Some(name));
    TenantPersistor::new(conn).create(&tenant).await.unwrap();
    tenant.uuid
}

pub async fn add_endpoint(conn: &mut SqliteConnection, endpoint: Endpoint) -> Endpoint {
    EndpointPersistor::new(conn).create(endpoint).await.unwrap()
}

pub async fn add_line(conn: &mut SqliteConnection, tenant_uuid: &str, endpoint: Option<Endpoint>) -> Line {
    let mut line = Line::new(tenant_uuid, "default");
    if let Some(endpoint) = endpoint {
        line.associate_endpoint(endpoint);
    }
    LinePersistor::new(conn, None).create(&line).await.unwrap()
}

pub async fn add_sip_line(conn: &mut SqliteConnection, tenant_uuid: &str, name: &str) -> Line {
    let sip = add_endpoint(conn, Endpoint::Sip(EndpointSip::new(Some(name)))).await;
    add_line(conn, tenant_uuid, Some(sip)).await
}

pub async fn add_sccp_line(conn: &mut SqliteConnection, tenant_uuid: &str, name: &str) -> Line {
    let sccp = add_endpoint(conn, Endpoint::Sccp(EndpointSccp::new(name))).await;
    add_line(conn, tenant_uuid, Some(sccp)).await
}

pub async fn add_custom_line(conn: &mut SqliteConnection, tenant_uuid: &str, interface: &str) -> Line {
    let custom = add_endpoint(conn, Endpoint::Custom(EndpointCustom::new(interface))).await;
    add_line(conn, tenant_uuid, Some(custom)).await
}

pub async fn add_extension(
    conn: &mut SqliteConnection,
    tenant_uuid: &str,
    exten: &str,
    context: &str,
) -> Extension {
    ExtensionPersistor::new(conn, None)
        .create(&Extension::new(tenant_uuid, exten, context))
        .await
        .unwrap()
}

pub async fn get_line(conn: &mut SqliteConnection, line_id: i64) -> Line {
    LinePersistor::new(conn, None).get(line_id).await.unwrap()
}
