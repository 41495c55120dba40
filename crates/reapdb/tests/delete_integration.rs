//! End-to-end tests for the cascading-deletion pipeline.

use std::collections::HashMap;

use reapdb::{
    purge, Collector, DeleteBehavior, EntityDef, Error, FieldDef, FieldType, RelationDef,
    RelationKind, RowId, RowSet, RowStore, Schema, StorageConfig, Value,
};

fn rid(n: u8) -> RowId {
    [n; 16]
}

fn insert(store: &RowStore, entity: &str, id: RowId, fields: Vec<(&str, Value)>) {
    let fields = fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    store.insert(entity, id, fields).unwrap();
}

/// Job, JobEvent (cascade), JobTemplate.last_job_id (set null),
/// WorkflowJobNode (cascade), ActivityStream (generic cascade).
fn job_schema() -> Schema {
    Schema::new()
        .with_entity(
            EntityDef::new("Job", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("name", FieldType::String)),
        )
        .with_entity(
            EntityDef::new("JobEvent", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("job_id", FieldType::Uuid)),
        )
        .with_entity(
            EntityDef::new("JobTemplate", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::nullable("last_job_id", FieldType::Uuid)),
        )
        .with_entity(
            EntityDef::new("WorkflowJobNode", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("job_id", FieldType::Uuid)),
        )
        .with_entity(
            EntityDef::new("ActivityStream", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::nullable("object_type", FieldType::String))
                .with_field(FieldDef::nullable("object_id", FieldType::Uuid)),
        )
        .with_relation(
            RelationDef::column("event_job", "JobEvent", "job_id", "Job")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(
            RelationDef::column("template_last_job", "JobTemplate", "last_job_id", "Job")
                .with_on_delete(DeleteBehavior::SetNull)
                .with_nullable(),
        )
        .with_relation(
            RelationDef::column("node_job", "WorkflowJobNode", "job_id", "Job")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(
            RelationDef::generic(
                "activity_job",
                "ActivityStream",
                "object_type",
                "object_id",
                "Job",
            )
            .with_on_delete(DeleteBehavior::Cascade),
        )
}

fn job_store() -> RowStore {
    RowStore::open(StorageConfig::temporary(), job_schema()).unwrap()
}

fn seed_job(store: &RowStore, id: RowId, name: &str) {
    insert(
        store,
        "Job",
        id,
        vec![("id", Value::Uuid(id)), ("name", Value::from(name))],
    );
}

#[test]
fn scenario_cascade_set_null_and_counts() {
    let store = job_store();

    seed_job(&store, rid(1), "deploy");
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(1)))],
    );
    insert(
        &store,
        "JobEvent",
        rid(11),
        vec![("id", Value::Uuid(rid(11))), ("job_id", Value::Uuid(rid(1)))],
    );
    insert(
        &store,
        "JobTemplate",
        rid(20),
        vec![
            ("id", Value::Uuid(rid(20))),
            ("last_job_id", Value::Uuid(rid(1))),
        ],
    );
    insert(
        &store,
        "WorkflowJobNode",
        rid(30),
        vec![("id", Value::Uuid(rid(30))), ("job_id", Value::Uuid(rid(1)))],
    );

    let summary = purge(&store, &RowSet::by_id("Job", rid(1))).unwrap();

    let expected: HashMap<String, u64> = [
        ("JobEvent".to_string(), 2),
        ("WorkflowJobNode".to_string(), 1),
        ("Job".to_string(), 1),
    ]
    .into_iter()
    .collect();
    assert_eq!(summary.per_type, expected);
    assert_eq!(summary.total, 4);

    // Cascaded rows are gone, the template survives with a nulled reference.
    assert_eq!(store.count("Job").unwrap(), 0);
    assert_eq!(store.count("JobEvent").unwrap(), 0);
    assert_eq!(store.count("WorkflowJobNode").unwrap(), 0);
    let template = store.get("JobTemplate", &rid(20)).unwrap().unwrap();
    assert_eq!(template.get("last_job_id"), Some(&Value::Null));
}

#[test]
fn empty_seed_is_a_noop() {
    let store = job_store();
    seed_job(&store, rid(1), "survivor");

    let summary = purge(&store, &RowSet::by_id("Job", rid(9))).unwrap();

    assert!(summary.is_empty());
    assert!(summary.per_type.is_empty());
    assert_eq!(store.count("Job").unwrap(), 1);
}

#[test]
fn only_rows_reachable_from_seed_are_touched() {
    let store = job_store();

    seed_job(&store, rid(1), "doomed");
    seed_job(&store, rid(2), "survivor");
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(1)))],
    );
    insert(
        &store,
        "JobEvent",
        rid(11),
        vec![("id", Value::Uuid(rid(11))), ("job_id", Value::Uuid(rid(2)))],
    );

    let summary = purge(&store, &RowSet::by_id("Job", rid(1))).unwrap();

    assert_eq!(summary.total, 2);
    assert!(store.get("Job", &rid(2)).unwrap().is_some());
    assert!(store.get("JobEvent", &rid(11)).unwrap().is_some());
}

#[test]
fn generic_relation_matches_tag_and_id() {
    let store = job_store();

    seed_job(&store, rid(1), "doomed");
    seed_job(&store, rid(2), "survivor");
    // References the doomed job.
    insert(
        &store,
        "ActivityStream",
        rid(40),
        vec![
            ("id", Value::Uuid(rid(40))),
            ("object_type", Value::from("Job")),
            ("object_id", Value::Uuid(rid(1))),
        ],
    );
    // Same id, different type tag: must survive.
    insert(
        &store,
        "ActivityStream",
        rid(41),
        vec![
            ("id", Value::Uuid(rid(41))),
            ("object_type", Value::from("JobTemplate")),
            ("object_id", Value::Uuid(rid(1))),
        ],
    );
    // Right tag, different id: must survive.
    insert(
        &store,
        "ActivityStream",
        rid(42),
        vec![
            ("id", Value::Uuid(rid(42))),
            ("object_type", Value::from("Job")),
            ("object_id", Value::Uuid(rid(2))),
        ],
    );

    let summary = purge(&store, &RowSet::by_id("Job", rid(1))).unwrap();

    assert_eq!(summary.per_type.get("ActivityStream"), Some(&1));
    assert!(store.get("ActivityStream", &rid(40)).unwrap().is_none());
    assert!(store.get("ActivityStream", &rid(41)).unwrap().is_some());
    assert!(store.get("ActivityStream", &rid(42)).unwrap().is_some());
}

#[test]
fn self_referential_chain_is_unioned_per_type() {
    let schema = Schema::new()
        .with_entity(
            EntityDef::new("WorkflowNode", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::nullable("parent_id", FieldType::Uuid)),
        )
        .with_relation(
            RelationDef::column("node_parent", "WorkflowNode", "parent_id", "WorkflowNode")
                .with_on_delete(DeleteBehavior::Cascade)
                .with_nullable(),
        );
    let store = RowStore::open(StorageConfig::temporary(), schema).unwrap();

    insert(
        &store,
        "WorkflowNode",
        rid(1),
        vec![("id", Value::Uuid(rid(1))), ("parent_id", Value::Null)],
    );
    insert(
        &store,
        "WorkflowNode",
        rid(2),
        vec![("id", Value::Uuid(rid(2))), ("parent_id", Value::Uuid(rid(1)))],
    );
    insert(
        &store,
        "WorkflowNode",
        rid(3),
        vec![("id", Value::Uuid(rid(3))), ("parent_id", Value::Uuid(rid(2)))],
    );

    let summary = purge(&store, &RowSet::by_id("WorkflowNode", rid(1))).unwrap();

    assert_eq!(summary.per_type.get("WorkflowNode"), Some(&3));
    assert_eq!(store.count("WorkflowNode").unwrap(), 0);
}

fn inheritance_schema() -> Schema {
    Schema::new()
        .with_entity(
            EntityDef::new("UnifiedJob", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("name", FieldType::String)),
        )
        .with_entity(
            EntityDef::new("Job", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("unified_ptr", FieldType::Uuid)),
        )
        .with_entity(
            EntityDef::new("JobEvent", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("job_id", FieldType::Uuid)),
        )
        .with_relation(RelationDef::parent_link(
            "job_base",
            "Job",
            "unified_ptr",
            "UnifiedJob",
        ))
        .with_relation(
            RelationDef::column("event_job", "JobEvent", "job_id", "Job")
                .with_on_delete(DeleteBehavior::Cascade),
        )
}

fn seed_inherited_job(store: &RowStore, unified: RowId, job: RowId) {
    insert(
        store,
        "UnifiedJob",
        unified,
        vec![("id", Value::Uuid(unified)), ("name", Value::from("run"))],
    );
    insert(
        store,
        "Job",
        job,
        vec![("id", Value::Uuid(job)), ("unified_ptr", Value::Uuid(unified))],
    );
}

#[test]
fn deleting_a_child_takes_its_parent_row() {
    let store = RowStore::open(StorageConfig::temporary(), inheritance_schema()).unwrap();
    seed_inherited_job(&store, rid(1), rid(2));
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(2)))],
    );

    let summary = purge(&store, &RowSet::by_id("Job", rid(2))).unwrap();

    let expected: HashMap<String, u64> = [
        ("Job".to_string(), 1),
        ("UnifiedJob".to_string(), 1),
        ("JobEvent".to_string(), 1),
    ]
    .into_iter()
    .collect();
    assert_eq!(summary.per_type, expected);
}

#[test]
fn deleting_a_parent_cascades_to_children() {
    let store = RowStore::open(StorageConfig::temporary(), inheritance_schema()).unwrap();
    seed_inherited_job(&store, rid(1), rid(2));
    seed_inherited_job(&store, rid(3), rid(4));
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(2)))],
    );

    let summary = purge(&store, &RowSet::by_id("UnifiedJob", rid(1))).unwrap();

    assert_eq!(summary.per_type.get("UnifiedJob"), Some(&1));
    assert_eq!(summary.per_type.get("Job"), Some(&1));
    assert_eq!(summary.per_type.get("JobEvent"), Some(&1));
    // The unrelated inheritance pair survives.
    assert!(store.get("UnifiedJob", &rid(3)).unwrap().is_some());
    assert!(store.get("Job", &rid(4)).unwrap().is_some());
}

#[test]
fn unhandled_reference_rolls_back_everything() {
    let schema = Schema::new()
        .with_entity(
            EntityDef::new("Job", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("name", FieldType::String)),
        )
        .with_entity(
            EntityDef::new("JobEvent", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("job_id", FieldType::Uuid)),
        )
        .with_entity(
            EntityDef::new("Label", "id")
                .with_field(FieldDef::new("id", FieldType::Uuid))
                .with_field(FieldDef::new("job_id", FieldType::Uuid)),
        )
        .with_relation(
            RelationDef::column("event_job", "JobEvent", "job_id", "Job")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        // Never traversed by the collector, but still enforced by the store.
        .with_relation(RelationDef::column("label_job", "Label", "job_id", "Job"));
    let store = RowStore::open(StorageConfig::temporary(), schema).unwrap();

    seed_job(&store, rid(1), "blocked");
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(1)))],
    );
    insert(
        &store,
        "Label",
        rid(20),
        vec![("id", Value::Uuid(rid(20))), ("job_id", Value::Uuid(rid(1)))],
    );

    let result = purge(&store, &RowSet::by_id("Job", rid(1)));

    assert!(matches!(
        result,
        Err(Error::ConstraintViolation {
            ref referencing_entity,
            ..
        }) if referencing_entity == "Label"
    ));
    // Nothing was applied, including the cascades that would have succeeded.
    assert_eq!(store.count("Job").unwrap(), 1);
    assert_eq!(store.count("JobEvent").unwrap(), 1);
    assert_eq!(store.count("Label").unwrap(), 1);
}

#[test]
fn collect_then_delete_matches_purge() {
    let store = job_store();
    seed_job(&store, rid(1), "two-step");
    insert(
        &store,
        "JobEvent",
        rid(10),
        vec![("id", Value::Uuid(rid(10))), ("job_id", Value::Uuid(rid(1)))],
    );

    let mut collector = Collector::new(&store);
    collector.collect(&RowSet::by_id("Job", rid(1))).unwrap();
    assert!(collector.dependencies().get("Job").is_some());

    let summary = collector.delete().unwrap();
    assert_eq!(summary.total, 2);
}

/// Reference implementation: one row at a time, unbounded recursion, one
/// transaction per physical write. Dependents are handled before the row
/// itself so every intermediate commit stays referentially consistent.
fn naive_delete(store: &RowStore, entity: &str, id: RowId) -> Result<(), Error> {
    let schema = store.schema().clone();

    for relation in schema.relations_targeting(entity) {
        let dependents: Vec<RowId> = store
            .scan(&relation.from_entity)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(_, record)| match &relation.kind {
                RelationKind::Column { field } => {
                    record.get(field) == Some(&Value::Uuid(id))
                }
                RelationKind::Generic {
                    type_field,
                    id_field,
                } => {
                    record.get(type_field) == Some(&Value::from(entity))
                        && record.get(id_field) == Some(&Value::Uuid(id))
                }
            })
            .map(|(dep_id, _)| dep_id)
            .collect();

        for dep_id in dependents {
            match relation.on_delete {
                DeleteBehavior::NoAction => {}
                DeleteBehavior::SetNull => {
                    let RelationKind::Column { field } = &relation.kind else {
                        continue;
                    };
                    let mut tx = store.transaction();
                    tx.set_field(relation.from_entity.clone(), dep_id, field.clone(), Value::Null);
                    tx.commit()?;
                }
                DeleteBehavior::Cascade => {
                    naive_delete(store, &relation.from_entity, dep_id)?;
                }
            }
        }
    }

    // Remember parent rows before the child disappears.
    let mut parents: Vec<(String, RowId)> = Vec::new();
    if let Some(record) = store.get(entity, &id)? {
        for parent in schema.inheritance_parents(entity) {
            let RelationKind::Column { field } = &parent.kind else {
                continue;
            };
            if let Some(Value::Uuid(parent_id)) = record.get(field) {
                parents.push((parent.to_entity.clone(), *parent_id));
            }
        }
    }

    let mut tx = store.transaction();
    tx.delete(entity, id);
    tx.commit()?;

    for (parent_entity, parent_id) in parents {
        naive_delete(store, &parent_entity, parent_id)?;
    }

    Ok(())
}

/// Snapshot every row of every entity for comparison.
fn snapshot(store: &RowStore) -> HashMap<String, HashMap<RowId, reapdb::Record>> {
    let mut all = HashMap::new();
    for entity in store.schema().entities.keys() {
        let rows: HashMap<RowId, reapdb::Record> = store
            .scan(entity)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .collect();
        all.insert(entity.clone(), rows);
    }
    all
}

#[test]
fn batched_deletion_is_equivalent_to_naive_recursion() {
    let populate = |store: &RowStore| {
        seed_job(store, rid(1), "target");
        seed_job(store, rid(2), "bystander");
        for (event, job) in [(10u8, 1u8), (11, 1), (12, 2)] {
            insert(
                store,
                "JobEvent",
                rid(event),
                vec![
                    ("id", Value::Uuid(rid(event))),
                    ("job_id", Value::Uuid(rid(job))),
                ],
            );
        }
        for (template, job) in [(20u8, 1u8), (21, 2)] {
            insert(
                store,
                "JobTemplate",
                rid(template),
                vec![
                    ("id", Value::Uuid(rid(template))),
                    ("last_job_id", Value::Uuid(rid(job))),
                ],
            );
        }
        insert(
            store,
            "WorkflowJobNode",
            rid(30),
            vec![("id", Value::Uuid(rid(30))), ("job_id", Value::Uuid(rid(1)))],
        );
        for (activity, tag, target) in [(40u8, "Job", 1u8), (41, "Job", 2), (42, "JobTemplate", 20)]
        {
            insert(
                store,
                "ActivityStream",
                rid(activity),
                vec![
                    ("id", Value::Uuid(rid(activity))),
                    ("object_type", Value::from(tag)),
                    ("object_id", Value::Uuid(rid(target))),
                ],
            );
        }
    };

    let batched = job_store();
    populate(&batched);
    purge(&batched, &RowSet::by_id("Job", rid(1))).unwrap();

    let naive = job_store();
    populate(&naive);
    naive_delete(&naive, "Job", rid(1)).unwrap();

    assert_eq!(snapshot(&batched), snapshot(&naive));
}
