mod common;

use std::sync::Arc;

use common::ScriptedSource;
use pretty_assertions::assert_eq;
use sqlx_named_mapper::config::{MapperConfig, PlaceholderStyle};
use sqlx_named_mapper::prelude::*;

fn person() -> TypeRef {
    TypeRef::record(RecordType::new("Person").field("name", TypeRef::String))
}

fn find_by_id() -> MethodDescriptor {
    MethodDescriptor::select("PersonDao", "findById", "select name from person where id = #{id}")
        .param("id", TypeRef::long())
        .returns(ResultSpec::new(TypeRef::optional(person())).field(FieldMapping::column("name", TypeRef::String)))
}

fn builder() -> MapperBuilder {
    Mapper::builder(Arc::new(ScriptedSource::empty()))
}

fn rejected(builder: MapperBuilder) -> ConfigurationError {
    match builder.build() {
        Ok(_) => panic!("registration should have been rejected"),
        Err(e) => e,
    }
}

#[test]
fn test_duplicate_method() {
    let err = rejected(builder().method(find_by_id()).method(find_by_id()));
    assert!(matches!(err, ConfigurationError::DuplicateMethod(ref name) if name == "PersonDao.findById"));
}

#[test]
fn test_relation_to_unknown_accessor() {
    let posts = MethodDescriptor::select("PostDao", "all", "select title, author_id from post").returns(
        ResultSpec::new(TypeRef::list(TypeRef::record(RecordType::new("Post")))).field(FieldMapping::to_one(
            "author",
            "author_id",
            TypeRef::long(),
            AccessorRef::new("PersonDao", "findById"),
            false,
        )),
    );

    let err = rejected(builder().method(posts.clone()));
    assert!(matches!(
        err,
        ConfigurationError::UnknownAccessor { ref field, ref accessor, .. }
            if field == "author" && accessor == "PersonDao.findById"
    ));

    assert!(builder().method(posts).method(find_by_id()).build().is_ok());
}

#[test]
fn test_unknown_converter() {
    let tagged = MethodDescriptor::select("TagDao", "all", "select tags from tagged").returns(
        ResultSpec::new(TypeRef::list(TypeRef::record(RecordType::new("Tagged"))))
            .field(FieldMapping::converted("tags", "csv")),
    );

    let err = rejected(builder().method(tagged.clone()));
    assert!(matches!(err, ConfigurationError::UnknownConverter { ref converter, .. } if converter == "csv"));

    let built = builder()
        .method(tagged)
        .converter("csv", |raw| Ok(Value::from(raw.unwrap_or_default())))
        .build();
    assert!(built.is_ok());
}

#[test]
fn test_unresolved_placeholder() {
    let method = MethodDescriptor::select("PersonDao", "findByName", "select name from person where name = #{nmae}")
        .param("name", TypeRef::String)
        .returns(ResultSpec::new(TypeRef::list(TypeRef::String)));

    let err = rejected(builder().method(method));
    assert!(matches!(err, ConfigurationError::UnknownParameter { ref name, .. } if name == "nmae"));
    assert!(Error::from(err).is_configuration());
}

#[test]
fn test_config_document_drives_compilation() {
    let config: MapperConfig = serde_json::from_str(
        r#"{
            "placeholder": "numbered",
            "cache": { "enabled": false, "use_threshold": true, "threshold_secs": 5 }
        }"#,
    )
    .unwrap();
    assert_eq!(config.placeholder, Some(PlaceholderStyle::Numbered));
    assert!(!config.cache.enabled);

    let mapper = builder()
        .config(config)
        .method(
            MethodDescriptor::update("PersonDao", "rename", "update person set name = #{name} where id = #{id}")
                .param("id", TypeRef::long())
                .param("name", TypeRef::String),
        )
        .build()
        .unwrap();

    let rename = mapper.method("PersonDao", "rename").unwrap();
    assert_eq!(rename.sql(), "update person set name = $1 where id = $2");
    assert_eq!(rename.plan().names().collect::<Vec<_>>(), vec!["name", "id"]);
    assert!(!rename.is_batch());
    assert!(!mapper.begin().cache().is_enabled());
}

#[test]
fn test_placeholder_style_follows_data_source() {
    let source = ScriptedSource::empty();
    source.expect_placeholders(PlaceholderStyle::Numbered);
    let mapper = Mapper::builder(Arc::new(source.clone()))
        .method(find_by_id())
        .build()
        .unwrap();
    assert_eq!(
        mapper.method("PersonDao", "findById").unwrap().sql(),
        "select name from person where id = $1"
    );

    let mapper = Mapper::builder(Arc::new(source))
        .config(MapperConfig::default().with_placeholder(PlaceholderStyle::Question))
        .method(find_by_id())
        .build()
        .unwrap();
    assert_eq!(
        mapper.method("PersonDao", "findById").unwrap().sql(),
        "select name from person where id = ?"
    );
}

#[test]
fn test_registry_lookups() {
    let mapper = builder()
        .method(find_by_id())
        .accessor(AccessorRef::new("Clock", "now"), |_, _| Ok(Value::Long(0)))
        .build()
        .unwrap();

    assert_eq!(mapper.methods().count(), 1);
    assert!(mapper.method("PersonDao", "findById").is_some());
    assert!(mapper.method("Clock", "now").is_none());
    assert!(mapper.accessor(&AccessorRef::new("Clock", "now")).is_some());
    assert!(mapper.accessor(&AccessorRef::new("PersonDao", "findById")).is_some());
    assert_eq!(mapper.call("Clock", "now", &[]).unwrap(), Value::Long(0));
}
