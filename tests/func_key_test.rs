//! Func key destinations, their discriminator and their cleanup
//!
//! Deleting a group, queue or conference removes the func keys pointing at
//! it, including where templates map them.

use pbx_dao::backend::database::{
    ConferencePersistor, FuncKeyPersistor, FuncKeyTemplatePersistor, GroupPersistor,
    QueuePersistor,
};
use pbx_dao::models::func_key::{
    ConferenceDestination, GroupDestination, GroupMemberDestination, QueueDestination,
    ServiceDestination,
};
use pbx_dao::models::{
    Conference, Destination, DestinationType, FuncKey, FuncKeyMapping, FuncKeyTemplate, Group,
    Queue,
};

mod common;

#[tokio::test]
async fn test_group_delete_removes_func_keys_and_mappings() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let extension = common::add_extension(&mut conn, &db.tenant_uuid, "1000", "default").await;
    let group = GroupPersistor::new(&mut conn, None)
        .create(&Group::new(&db.tenant_uuid, "sales"))
        .await
        .unwrap();

    let template = FuncKeyTemplate::new(&db.tenant_uuid, Some("reception"))
        .with_key(
            1,
            FuncKeyMapping::new(Destination::Group(GroupDestination { group_id: group.id })),
        )
        .with_key(
            2,
            FuncKeyMapping::new(Destination::GroupMember(GroupMemberDestination {
                group_id: group.id,
                extension_id: extension.id,
            })),
        )
        .with_key(
            3,
            FuncKeyMapping::new(Destination::Service(ServiceDestination {
                extension_id: extension.id,
            })),
        );
    let template = FuncKeyTemplatePersistor::new(&mut conn, None)
        .create(&template)
        .await
        .unwrap();
    assert_eq!(template.keys.len(), 3);

    GroupPersistor::new(&mut conn, None).delete(&group).await.unwrap();

    let template = FuncKeyTemplatePersistor::new(&mut conn, None)
        .get(template.id)
        .await
        .unwrap();
    assert_eq!(template.keys.keys().copied().collect::<Vec<_>>(), vec![3]);

    let mut func_keys = FuncKeyPersistor::new(&mut conn);
    assert!(func_keys
        .find_all_by_destination_type(DestinationType::Group)
        .await
        .unwrap()
        .is_empty());
    assert!(func_keys
        .find_all_by_destination_type(DestinationType::GroupMember)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_queue_and_conference_delete_remove_func_keys() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let queue = QueuePersistor::new(&mut conn, None)
        .create(&Queue::new(&db.tenant_uuid, "support"))
        .await
        .unwrap();
    let conference = ConferencePersistor::new(&mut conn, None)
        .create(&Conference::new(&db.tenant_uuid, Some("board")))
        .await
        .unwrap();

    {
        let mut func_keys = FuncKeyPersistor::new(&mut conn);
        func_keys
            .create(&Destination::Queue(QueueDestination { queue_id: queue.id }))
            .await
            .unwrap();
        func_keys
            .create(&Destination::Conference(ConferenceDestination {
                conference_id: conference.id,
            }))
            .await
            .unwrap();
    }

    QueuePersistor::new(&mut conn, None).delete(&queue).await.unwrap();
    ConferencePersistor::new(&mut conn, None)
        .delete(&conference)
        .await
        .unwrap();

    let mut func_keys = FuncKeyPersistor::new(&mut conn);
    for destination_type in [DestinationType::Queue, DestinationType::Conference] {
        assert!(func_keys
            .find_all_by_destination_type(destination_type)
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn test_destination_needs_existing_target() {
    let db = common::setup_test_database().await.unwrap();
    let mut conn = db.backend.pool().acquire().await.unwrap();

    let err = FuncKeyPersistor::new(&mut conn)
        .create(&Destination::Group(GroupDestination { group_id: 404 }))
        .await
        .unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_mismatched_discriminator_is_rejected() {
    let destination = Destination::Queue(QueueDestination { queue_id: 1 });
    let err = FuncKey::new(DestinationType::Group.id(), destination.clone()).unwrap_err();
    assert!(err.is_value_error() || err.is_input_error());

    let func_key = FuncKey::new(DestinationType::Queue.id(), destination).unwrap();
    assert_eq!(func_key.destination_type(), DestinationType::Queue);
}
