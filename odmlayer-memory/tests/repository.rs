use std::sync::Arc;

use bson::{Bson, doc, oid::ObjectId};
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};

use odmlayer_core::{
    backend::DynStoreBackend,
    changes::ChangeKind,
    emitter::{Channel, ChannelEmitter},
    error::OdmError,
    odm::Odm,
    query::{Query, ReturnType, SortDirection},
    repository::UpdateOptions,
};
use odmlayer_macros::Model;
use odmlayer_memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Source {
    host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(crate = "odmlayer_core", collection = "alerts")]
struct Alert {
    #[field(key = "_id", object_id)]
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    title: String,
    #[field(number)]
    level: i32,
    tags: Vec<String>,
    source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(crate = "odmlayer_core", collection = "raw_events", transform = "manual")]
struct RawEvent {
    #[field(key = "_id", object_id)]
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[field(number)]
    code: String,
}

fn alert(title: &str, level: i32, host: &str) -> Alert {
    Alert {
        id: None,
        title: title.to_string(),
        level,
        tags: vec!["a".to_string(), "b".to_string()],
        source: Source { host: host.to_string(), rack: None },
    }
}

fn odm_with(emitter: Arc<ChannelEmitter>) -> Odm {
    Odm::builder()
        .register::<Alert>()
        .register::<RawEvent>()
        .connection("default", InMemoryStore::new())
        .shared_emitter(emitter)
        .build()
        .unwrap()
}

fn odm() -> Odm {
    odm_with(Arc::new(ChannelEmitter::new()))
}

#[tokio::test]
async fn save_assigns_an_identifier_and_round_trips() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();

    let saved = alerts.save(&alert("disk full", 3, "db-1")).await.unwrap();
    let id = saved.id.clone().unwrap();

    assert!(ObjectId::parse_str(&id).is_ok());
    assert_eq!(alerts.get(id.as_str()).await.unwrap(), Some(saved.clone()));

    let stored = odm
        .connection("default")
        .await
        .unwrap()
        .find_one(doc! {}, "alerts")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_object_id("_id").unwrap().to_hex(), id);
    assert!(!stored.contains_key("id"));
}

#[tokio::test]
async fn partial_updates_merge_nested_documents_and_replace_arrays() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    let saved = alerts.save(&alert("disk full", 3, "db-1")).await.unwrap();
    let id = saved.id.clone().unwrap();

    let updated = alerts
        .update(
            doc! { "id": id.as_str() },
            doc! { "tags": ["c"], "level": "5", "source": { "rack": "r1" } },
            UpdateOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.tags, vec!["c".to_string()]);
    assert_eq!(updated.level, 5);
    assert_eq!(updated.title, "disk full");
    assert_eq!(updated.source, Source { host: "db-1".into(), rack: Some("r1".into()) });
    assert_eq!(alerts.get(id.as_str()).await.unwrap(), Some(updated));
}

#[tokio::test]
async fn replace_keeps_the_identifier() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    let saved = alerts.save(&alert("disk full", 3, "db-1")).await.unwrap();
    let id = saved.id.clone().unwrap();

    let replaced = alerts
        .replace(doc! { "id": id.as_str() }, &alert("cpu hot", 1, "web-1"), false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(replaced.id.as_deref(), Some(id.as_str()));
    assert_eq!(replaced.title, "cpu hot");
    assert_eq!(alerts.find(doc! {}).await.unwrap(), vec![replaced]);
}

#[tokio::test]
async fn update_without_a_match_returns_nothing_unless_upserting() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    let id = ObjectId::new().to_hex();

    let missing = alerts
        .update(doc! { "id": id.as_str() }, doc! { "title": "x" }, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(missing, None);

    let created = alerts
        .replace(doc! { "id": id.as_str() }, &alert("created", 2, "db-2"), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.id.as_deref(), Some(id.as_str()));
    assert_eq!(created.title, "created");
}

#[tokio::test]
async fn mutations_publish_change_events() {
    let emitter = Arc::new(ChannelEmitter::new());
    let mut events = emitter.subscribe();
    let odm = odm_with(emitter.clone());
    let alerts = odm.model_repository::<Alert>();

    let inserted = alerts.insert_one(&alert("disk full", 3, "db-1")).await.unwrap();
    let id = inserted.id.clone().unwrap();
    alerts
        .update(doc! { "id": id.as_str() }, doc! { "level": 4 }, UpdateOptions::default())
        .await
        .unwrap();
    alerts.delete(doc! { "id": id.as_str() }, true).await.unwrap();

    let created = events.next().await.unwrap();
    assert_eq!((created.channel, created.name.as_str()), (Channel::Emit, "create::alerts"));

    let updated = events.next().await.unwrap();
    assert_eq!((updated.channel, updated.name.as_str()), (Channel::Changes, "update::alerts"));
    assert_eq!(updated.event.kind, ChangeKind::Update);
    let changes = updated.event.changes.unwrap();
    assert_eq!(changes.changed, doc! { "level": 4 });
    assert!(changes.added.is_empty() && changes.removed.is_empty());

    let deleted = events.next().await.unwrap();
    assert_eq!(deleted.name, "delete::alerts");
}

#[tokio::test]
async fn deleting_nothing_publishes_nothing() {
    let emitter = Arc::new(ChannelEmitter::new());
    let odm = odm_with(emitter.clone());
    let mut events = emitter.subscribe();

    let result = odm
        .model_repository::<Alert>()
        .delete(doc! { "title": "absent" }, false)
        .await
        .unwrap();

    assert_eq!(result.deleted_count, 0);
    assert!(events.next().now_or_never().is_none());
}

#[tokio::test]
async fn numeric_filters_are_coerced() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    alerts
        .insert(&[alert("disk full", 3, "db-1"), alert("cpu hot", 1, "web-1")])
        .await
        .unwrap();

    let found = alerts.find(doc! { "level": "3" }).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "disk full");
}

#[tokio::test]
async fn paged_queries_report_totals_and_neighbours() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    let batch = (1..=5)
        .map(|level| alert(&format!("alert {level}"), level, "db-1"))
        .collect::<Vec<_>>();
    alerts.insert(&batch).await.unwrap();

    let page = alerts
        .page(Query::of::<Alert>().order("level", SortDirection::Asc).paging(2, 2))
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.results.iter().map(|a| a.level).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!((page.previous_page, page.next_page), (Some(1), Some(3)));
    assert!(page.results.iter().all(|a| a.id.is_some()));

    let empty = alerts
        .page(Query::of::<Alert>().filter(doc! { "level": 99 }).paging(1, 2))
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.results.is_empty());
}

#[tokio::test]
async fn aggregations_group_join_and_count() {
    let odm = odm();
    let alerts = odm.model_repository::<Alert>();
    alerts
        .insert(&[alert("disk full", 3, "db-1"), alert("disk slow", 2, "db-1"), alert("cpu hot", 1, "web-1")])
        .await
        .unwrap();
    odm.connection("default")
        .await
        .unwrap()
        .insert(vec![doc! { "_id": "db-1", "rack": "r1" }], "hosts")
        .await
        .unwrap();

    let repository = alerts.untyped();

    let grouped = repository
        .query(
            Query::of::<Alert>()
                .group(doc! { "_id": "$source.host", "alerts": { "$sum": 1 } })
                .order("_id", SortDirection::Asc),
            ReturnType::Many,
        )
        .await
        .unwrap()
        .into_many();
    assert_eq!(grouped, vec![doc! { "id": "db-1", "alerts": 2 }, doc! { "id": "web-1", "alerts": 1 }]);

    let joined = repository
        .query(
            Query::of::<Alert>()
                .filter(doc! { "title": "disk full" })
                .merge("hosts", "source.host", "_id", "host")
                .pluck(["title", "host"]),
            ReturnType::Single,
        )
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(joined.get_str("title").unwrap(), "disk full");
    assert_eq!(joined.get_array("host").unwrap(), &vec![Bson::Document(doc! { "_id": "db-1", "rack": "r1" })]);
    assert!(joined.contains_key("id"));

    let counted = repository
        .query(Query::of::<Alert>().filter(doc! { "level": { "$gte": "2" } }).count("total"), ReturnType::Single)
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(counted, doc! { "total": 2_i64 });
}

#[tokio::test]
async fn manual_models_are_stored_as_given() {
    let odm = odm();
    let events = odm.model_repository::<RawEvent>();

    let stored = events
        .insert_one(&RawEvent { id: Some("abc123".into()), code: "42".into() })
        .await
        .unwrap();
    assert_eq!(stored, RawEvent { id: Some("abc123".into()), code: "42".into() });

    let raw = odm
        .connection("default")
        .await
        .unwrap()
        .find_one(doc! { "id": "abc123" }, "raw_events")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get_str("code").unwrap(), "42");
    assert!(matches!(raw.get("_id"), Some(Bson::ObjectId(_))));

    let found = events.find(doc! { "id": "abc123" }).await.unwrap();
    assert_eq!(found, vec![stored]);
}

#[tokio::test]
async fn manual_models_are_saved_and_updated_as_given() {
    let odm = odm();
    let events = odm.model_repository::<RawEvent>();
    let connection = odm.connection("default").await.unwrap();

    let saved = events
        .save(&RawEvent { id: Some("abc123".into()), code: "42".into() })
        .await
        .unwrap();
    assert_eq!(saved, RawEvent { id: Some("abc123".into()), code: "42".into() });

    let raw = connection.find_one(doc! { "id": "abc123" }, "raw_events").await.unwrap().unwrap();
    assert_eq!(raw.get_str("id").unwrap(), "abc123");
    assert_eq!(raw.get_str("code").unwrap(), "42");

    let updated = events
        .update(doc! { "id": "abc123" }, doc! { "code": "43" }, UpdateOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.code, "43");

    let raw = connection.find_one(doc! { "id": "abc123" }, "raw_events").await.unwrap().unwrap();
    assert_eq!(raw.get_str("code").unwrap(), "43");
    assert_eq!(raw.get_str("id").unwrap(), "abc123");

    let replaced = events
        .replace(doc! { "id": "abc123" }, &RawEvent { id: Some("abc123".into()), code: "44".into() }, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.code, "44");

    let raw = connection.find_one(doc! { "id": "abc123" }, "raw_events").await.unwrap().unwrap();
    assert_eq!(raw.get_str("code").unwrap(), "44");
    assert_eq!(raw.get_str("id").unwrap(), "abc123");
    assert!(matches!(raw.get("_id"), Some(Bson::ObjectId(_))));
}

#[tokio::test]
async fn bookkeeping_keys_in_filters_do_not_reach_storage() {
    let odm = odm();
    let repository = odm.repository();

    repository
        .insert(vec![doc! {
            "modelType": "Alert",
            "title": "disk full",
            "level": "7",
            "tags": [],
            "source": { "host": "db-1" },
        }])
        .await
        .unwrap();

    let found = repository
        .find(doc! { "modelType": "Alert", "odm": {}, "level": 7 }, ReturnType::Many)
        .await
        .unwrap()
        .into_many();
    assert_eq!(found.len(), 1);

    let alerts = odm.model_repository::<Alert>();
    let by_primary_key = alerts.find(doc! { "filter_by": "level", "level": "7" }).await.unwrap();
    assert_eq!(by_primary_key.len(), 1);

    let queried = alerts
        .query(Query::of::<Alert>().filter(doc! { "modelType": "Alert", "filter_by": "title", "title": "disk full" }))
        .await
        .unwrap();
    assert_eq!(queried, by_primary_key);
}

#[tokio::test]
async fn payloads_without_a_model_are_rejected() {
    let odm = odm();

    let untyped = odm.repository().insert_one(doc! { "title": "orphan" }).await;
    assert!(matches!(untyped, Err(OdmError::Configuration(_))));

    let empty = odm.model_repository::<Alert>().insert(&[]).await;
    assert!(matches!(empty, Err(OdmError::Configuration(_))));

    let named = odm
        .repository()
        .insert_one(doc! { "modelType": "Alert", "title": "t", "level": 1, "tags": [], "source": { "host": "h" } })
        .await
        .unwrap();
    assert!(!named.contains_key("modelType"));
}
