//! Line and trunk fixes driven by their endpoints
//!
//! Editing or deleting an endpoint must keep the name, interface and
//! caller id of the line or trunk using it consistent.

use pbx_dao::backend::database::{criteria, EndpointPersistor, LinePersistor, TrunkPersistor};
use pbx_dao::models::{Endpoint, EndpointIax, EndpointSip, Protocol, Trunk};
use serde_json::json;

mod common;

#[tokio::test]
async fn test_renaming_endpoint_renames_line() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let line = common::add_sip_line(&mut conn, &db.tenant_uuid, "abcdef").await;
    let mut endpoint = line.endpoint().cloned().unwrap();
    if let Endpoint::Sip(sip) = &mut endpoint {
        sip.name = "ghijkl".to_string();
    }
    EndpointPersistor::new(&mut conn).edit(&endpoint).await.unwrap();

    let line = common::get_line(&mut conn, line.id).await;
    assert_eq!(line.name.as_deref(), Some("ghijkl"));
    assert_eq!(line.interface().as_deref(), Some("SIP/ghijkl"));
}

#[tokio::test]
async fn test_deleting_endpoint_clears_line() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let line = common::add_custom_line(&mut conn, &db.tenant_uuid, "dahdi/i1/1000").await;
    assert_eq!(line.interface().as_deref(), Some("dahdi/i1/1000"));

    let endpoint = line.endpoint().cloned().unwrap();
    EndpointPersistor::new(&mut conn).delete(&endpoint).await.unwrap();

    let line = common::get_line(&mut conn, line.id).await;
    assert_eq!(line.protocol(), None);
    assert_eq!(line.protocol_id(), None);
    assert_eq!(line.name, None);
    assert_eq!(line.interface(), None);
}

#[tokio::test]
async fn test_deleting_endpoint_clears_trunk() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let iax = common::add_endpoint(&mut conn, Endpoint::Iax(EndpointIax::new(Some("provider")))).await;
    let mut trunk = Trunk::new(&db.tenant_uuid);
    trunk.associate_endpoint(iax.clone()).unwrap();
    let trunk = TrunkPersistor::new(&mut conn, None).create(&trunk).await.unwrap();
    assert_eq!(trunk.name.as_deref(), Some("provider"));

    EndpointPersistor::new(&mut conn).delete(&iax).await.unwrap();
    let trunk = TrunkPersistor::new(&mut conn, None).get(trunk.id).await.unwrap();
    assert!(!trunk.is_associated());
    assert_eq!(trunk.name, None);
}

#[tokio::test]
async fn test_sip_caller_id_round_trip() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let mut line = common::add_sip_line(&mut conn, &db.tenant_uuid, "abcdef").await;
    line.set_caller_id_name("Bob Marley").unwrap();
    line.set_caller_id_num("5551234").unwrap();
    LinePersistor::new(&mut conn, None).edit(&line).await.unwrap();

    let line = common::get_line(&mut conn, line.id).await;
    assert_eq!(line.caller_id_name().as_deref(), Some("Bob Marley"));
    assert_eq!(line.caller_id_num().as_deref(), Some("5551234"));
    match line.endpoint() {
        Some(Endpoint::Sip(sip)) => {
            assert_eq!(sip.callerid.as_deref(), Some("\"Bob Marley\" <5551234>"))
        }
        other => panic!("unexpected endpoint {:?}", other),
    }
}

#[tokio::test]
async fn test_sccp_caller_id_fields() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let mut line = common::add_sccp_line(&mut conn, &db.tenant_uuid, "SEP001122334455").await;
    line.set_caller_id_name("Reception").unwrap();
    assert!(line.set_caller_id_num("1000").unwrap_err().is_input_error());
    LinePersistor::new(&mut conn, None).edit(&line).await.unwrap();

    let line = common::get_line(&mut conn, line.id).await;
    assert_eq!(line.caller_id_name().as_deref(), Some("Reception"));
}

#[tokio::test]
async fn test_custom_line_rejects_caller_id() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let mut line = common::add_custom_line(&mut conn, &db.tenant_uuid, "dahdi/i1/1000").await;
    assert!(line.set_caller_id_name("Alice").unwrap_err().is_input_error());
    assert!(line.set_caller_id_num("1000").unwrap_err().is_input_error());

    let mut bare = common::add_line(&mut conn, &db.tenant_uuid, None).await;
    assert!(bare.set_caller_id_name("Alice").unwrap_err().is_input_error());
}

#[tokio::test]
async fn test_find_lines_by_protocol() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    common::add_sip_line(&mut conn, &db.tenant_uuid, "first").await;
    common::add_sccp_line(&mut conn, &db.tenant_uuid, "SEP001122334455").await;
    let generated = common::add_endpoint(&mut conn, Endpoint::Sip(EndpointSip::new(None))).await;
    common::add_line(&mut conn, &db.tenant_uuid, Some(generated)).await;

    let mut lines = LinePersistor::new(&mut conn, Some(vec![db.tenant_uuid.clone()]));
    let sip_lines = lines
        .find_all_by(&criteria([("protocol", json!("sip"))]))
        .await
        .unwrap();
    assert_eq!(sip_lines.len(), 2);
    assert!(sip_lines.iter().all(|line| line.protocol() == Some(Protocol::Sip)));

    let err = lines
        .find_all_by(&criteria([("secret", json!("x"))]))
        .await
        .unwrap_err();
    assert!(err.is_input_error());
}
