use std::sync::Arc;

use futures::StreamExt;
use odmlayer::{bson::doc, memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "alerts")]
struct Alert {
    #[field(key = "_id", object_id)]
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[field(number)]
    level: i32,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(collection = "incidents", connection = "audit")]
struct Incident {
    #[field(key = "_id", object_id)]
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[field(key = "alert_id", object_id)]
    alert: String,
}

async fn odm(emitter: Arc<ChannelEmitter>) -> Odm {
    Odm::builder()
        .register::<Alert>()
        .register::<Incident>()
        .connection("default", InMemoryStore::builder().build().await.unwrap())
        .connection("audit", InMemoryStore::new())
        .shared_emitter(emitter)
        .build()
        .unwrap()
}

#[tokio::test]
async fn quick_start_flow() {
    let emitter = Arc::new(ChannelEmitter::new());
    let mut events = emitter.subscribe();
    let odm = odm(emitter.clone()).await;
    let alerts = odm.model_repository::<Alert>();

    let saved = alerts
        .save(&Alert { id: None, level: 2, tags: vec!["disk".into()] })
        .await
        .unwrap();
    let id = saved.id.clone().unwrap();

    let updated = alerts
        .update(
            doc! { "id": id.as_str() },
            doc! { "level": "3", "tags": ["disk", "full"] },
            UpdateOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated, Alert { id: Some(id.clone()), level: 3, tags: vec!["disk".into(), "full".into()] });

    let page = alerts
        .page(Query::of::<Alert>().order("level", SortDirection::Desc).paging(1, 20))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.results, vec![updated]);
    assert_eq!(page.next_page, None);

    let saved_event = events.next().await.unwrap();
    assert_eq!(saved_event.name, "update::alerts");
    assert_eq!(saved_event.event.changes.unwrap().added.get_str("id").unwrap(), id);

    let update_event = events.next().await.unwrap();
    let changes = update_event.event.changes.unwrap();
    assert_eq!(changes.changed, doc! { "level": 3, "tags": ["disk", "full"] });

    odm.shutdown().await.unwrap();
}

#[tokio::test]
async fn models_use_their_own_connection() {
    let odm = odm(Arc::new(ChannelEmitter::new())).await;
    let alert = odm
        .model_repository::<Alert>()
        .insert_one(&Alert { id: None, level: 1, tags: vec![] })
        .await
        .unwrap();
    let alert_id = alert.id.unwrap();

    let incidents = odm.model_repository::<Incident>();
    incidents
        .insert_one(&Incident { id: None, alert: alert_id.clone() })
        .await
        .unwrap();

    let audit = odm.connection("audit").await.unwrap();
    let stored = audit.find_one(doc! {}, "incidents").await.unwrap().unwrap();
    assert_eq!(stored.get_object_id("alert_id").unwrap().to_hex(), alert_id);

    let default = odm.connection("default").await.unwrap();
    assert_eq!(default.find_one(doc! {}, "incidents").await.unwrap(), None);

    let found = incidents.find_one(doc! { "alert": alert_id.as_str() }).await.unwrap();
    assert_eq!(found.map(|incident| incident.alert), Some(alert_id));
}

#[tokio::test]
async fn untyped_payloads_resolve_through_model_type() {
    let odm = odm(Arc::new(ChannelEmitter::new())).await;
    let repository = odm.repository();

    let inserted = repository
        .insert(vec![doc! { "modelType": "Alert", "level": "7", "tags": [] }])
        .await
        .unwrap();
    assert_eq!(inserted[0].get_i32("level").unwrap(), 7);

    let found = repository
        .find(doc! { "modelType": "Alert", "level": 7 }, ReturnType::Single)
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(Alert::from_document(found).unwrap().level, 7);

    let deleted = repository
        .delete(doc! { "modelType": "Alert", "level": "7" }, true)
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count, 1);
}
