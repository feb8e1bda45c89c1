//! Processor fixtures.

use serde_json::{json, Value};

use crate::pipeline::ProcessorDefinition;

/// `$source` reading a Kafka topic, then `$merge` into a collection.
#[must_use]
pub fn source_merge(name: &str) -> ProcessorDefinition {
    ProcessorDefinition::new(
        name,
        vec![
            json!({"$source": {"connectionName": "kafkaProd", "topic": "orders"}}),
            json!({"$merge": {"into": {"connectionName": "cluster", "db": "sales", "coll": "orders"}}}),
        ],
    )
}

/// Source, enrichment lookup and merge with explicit parallelism.
#[must_use]
pub fn lookup_merge(name: &str, lookup_parallelism: i64, merge_parallelism: i64) -> ProcessorDefinition {
    ProcessorDefinition::new(
        name,
        vec![
            json!({"$source": {"connectionName": "kafkaProd", "topic": "orders"}}),
            json!({"$lookup": {
                "from": {"connectionName": "cluster", "db": "ref", "coll": "customers"},
                "localField": "customerId",
                "foreignField": "_id",
                "as": "customer",
                "parallelism": lookup_parallelism
            }}),
            json!({"$merge": {
                "into": {"connectionName": "cluster", "db": "sales", "coll": "enriched"},
                "parallelism": merge_parallelism
            }}),
        ],
    )
}

/// A windowed aggregation with a custom function; lands in a mid-size tier.
#[must_use]
pub fn windowed_rollup(name: &str) -> ProcessorDefinition {
    ProcessorDefinition::new(
        name,
        vec![
            json!({"$source": {"connectionName": "kafkaProd", "topic": "clicks"}}),
            json!({"$match": {"$expr": {"$cond": [{"$gt": ["$amount", 0]}, true, false]}}}),
            json!({"$addFields": {"score": {"$function": {
                "body": "function(xs) { let t = 0; for (const x of xs) { t += x * 2; } return t; }",
                "args": ["$items"],
                "lang": "js"
            }}}}),
            json!({"$tumblingWindow": {
                "interval": {"size": 1, "unit": "minute"},
                "pipeline": [{"$group": {"_id": "$region", "total": {"$sum": "$amount"}}}]
            }}),
            json!({"$emit": {"connectionName": "kafkaProd", "topic": "rollups"}}),
        ],
    )
}

/// Raw pipeline for a processor JSON document.
#[must_use]
pub fn document(definition: &ProcessorDefinition) -> Value {
    json!({"name": definition.name, "pipeline": definition.pipeline})
}
