use bson::{Bson, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use odmlayer_core::{
    metadata::{Coercion, FieldType, TransformMode},
    model::{Model, ModelExt},
    odm::Odm,
    registry::{ModelRef, ModelRegistry},
    transform::{Direction, transform_document},
};
use odmlayer_macros::Model;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(crate = "odmlayer_core", collection = "alerts", connection = "audit", name = "AlertRecord")]
struct Alert {
    #[field(key = "_id", object_id)]
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[field(number, value = 3)]
    level: i64,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    created_at: Option<bson::DateTime>,
    enabled: bool,
    #[serde(skip)]
    scratch: String,
    notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Model)]
#[model(crate = "odmlayer_core", transform = "manual")]
struct AuditEntry {
    #[field(key = "_id")]
    entry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Model)]
#[serde(rename_all = "camelCase")]
#[model(crate = "odmlayer_core", collection = "users")]
struct User {
    #[field(key = "_id", object_id)]
    user_id: String,
    #[field(number)]
    login_count: i32,
    #[serde(rename = "mail")]
    email_address: String,
}

#[test]
fn container_attributes_shape_the_metadata() {
    let metadata = Alert::metadata();

    assert_eq!(Alert::model_name(), "AlertRecord");
    assert_eq!(metadata.model_name, "AlertRecord");
    assert_eq!(metadata.collection_name, "alerts");
    assert_eq!(metadata.connection_name, "audit");
    assert_eq!(metadata.transform, TransformMode::Automatic);
    assert!(std::ptr::eq(metadata, Alert::metadata()));
}

#[test]
fn field_attributes_become_descriptors() {
    let metadata = Alert::metadata();

    let id = metadata.field("_id").unwrap();
    assert_eq!(id.display_name, "id");
    assert_eq!((id.details.field_type, id.details.coercion), (FieldType::Identifier, Coercion::ObjectId));

    let level = metadata.field("level").unwrap();
    assert_eq!((level.details.field_type, level.details.coercion), (FieldType::Number, Coercion::Number));
    assert_eq!(level.details.value, Some(Bson::Int32(3)));

    assert_eq!(metadata.field("createdAt").unwrap().details.field_type, FieldType::Date);
    assert_eq!(metadata.field("enabled").unwrap().details.field_type, FieldType::Boolean);
    assert_eq!(metadata.field("notes").unwrap().details.field_type, FieldType::Any);
    assert!(metadata.field("scratch").is_none());
    assert!(metadata.field("created_at").is_none());
}

#[test]
fn defaults_apply_without_container_attributes() {
    let metadata = AuditEntry::metadata();

    assert_eq!(metadata.model_name, "AuditEntry");
    assert_eq!(metadata.collection_name, "AuditEntry");
    assert_eq!(metadata.connection_name, "default");
    assert_eq!(metadata.transform, TransformMode::Manual);
    assert_eq!(metadata.field("_id").unwrap().details.coercion, Coercion::None);
}

#[test]
fn renamed_fields_keep_their_serialized_names() {
    let metadata = User::metadata();

    assert_eq!(metadata.field("_id").unwrap().display_name, "userId");
    assert_eq!(metadata.storage_key("loginCount"), "loginCount");
    assert_eq!(metadata.storage_key("mail"), "mail");
    assert!(metadata.field_by_display_name("login_count").is_none());

    let oid = ObjectId::new();
    let user = User { user_id: oid.to_hex(), login_count: 2, email_address: "a@b.c".into() };

    let stored = transform_document(metadata, user.to_document().unwrap(), Direction::In);
    assert_eq!(stored, doc! { "_id": oid, "loginCount": 2, "mail": "a@b.c" });

    let restored = transform_document(metadata, stored, Direction::Out);
    assert_eq!(User::from_document(restored).unwrap(), user);
}

#[test]
fn derived_models_transform_into_storage_shape() {
    let oid = ObjectId::new();
    let alert = Alert {
        id: Some(oid.to_hex()),
        level: 2,
        created_at: None,
        enabled: true,
        scratch: "ignored".into(),
        notes: vec!["first".into()],
    };

    let stored = transform_document(Alert::metadata(), alert.to_document().unwrap(), Direction::In);
    assert_eq!(stored, doc! { "_id": oid, "level": 2_i64, "enabled": true, "notes": ["first"] });

    let restored = transform_document(Alert::metadata(), stored, Direction::Out);
    let restored = Alert::from_document(restored).unwrap();
    assert_eq!(restored, Alert { scratch: String::new(), ..alert });
}

#[test]
fn installed_registry_backs_contexts_without_registrations() {
    let registry = ModelRegistry::builder()
        .register::<Alert>()
        .register::<AuditEntry>()
        .build()
        .unwrap();
    let installed = registry.install().unwrap();

    assert!(installed.get(&ModelRef::of::<Alert>()).is_some());
    assert!(ModelRegistry::builder().build().unwrap().install().is_err());

    let odm = Odm::builder().build().unwrap();
    assert_eq!(odm.registry().len(), 2);
    assert!(odm.registry().get_by_name("AlertRecord").is_some());
}
