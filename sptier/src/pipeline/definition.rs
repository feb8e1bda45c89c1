//! Processor and pipeline definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::kind::StageKind;
use crate::errors::{AdvisorError, InvalidParallelismError, MalformedPipelineError};

/// A stream processor as stored in a processor JSON file or returned by Atlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorDefinition {
    /// Processor name.
    pub name: String,
    /// Raw aggregation pipeline, one object per stage.
    #[serde(default)]
    pub pipeline: Vec<Value>,
    /// Processor options (DLQ and similar), passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl ProcessorDefinition {
    /// Creates a new definition.
    #[must_use]
    pub fn new(name: impl Into<String>, pipeline: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            pipeline,
            options: None,
        }
    }

    /// Parses a processor JSON document.
    pub fn from_json(text: &str) -> Result<Self, AdvisorError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Classifies the raw pipeline into typed stages.
    pub fn to_pipeline(&self) -> Result<PipelineDefinition, AdvisorError> {
        PipelineDefinition::parse(&self.pipeline)
    }
}

/// Parallelism as written in a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredParallelism {
    /// No parallelism setting; treated as one.
    Absent,
    /// An integer setting. Not yet checked against the `>= 1` domain.
    Value(i64),
    /// A setting that is not an integer.
    Invalid(Value),
}

/// A single classified stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Zero-based position in the pipeline.
    pub index: usize,
    /// The operator key, e.g. `$merge`.
    pub operator: String,
    /// The classified kind.
    pub kind: StageKind,
    /// Declared parallelism.
    pub parallelism: DeclaredParallelism,
    /// Concatenated `$function` bodies, present only for custom-function stages.
    pub script_body: Option<String>,
    /// The operator's argument (the value under the operator key).
    pub body: Value,
}

impl Stage {
    /// Builds a stage directly, mostly for tests and fixtures.
    #[must_use]
    pub fn new(index: usize, kind: StageKind, parallelism: Option<i64>) -> Self {
        let operator = kind.canonical_operator().to_string();
        Self {
            index,
            operator,
            kind,
            parallelism: parallelism.map_or(DeclaredParallelism::Absent, DeclaredParallelism::Value),
            script_body: None,
            body: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the script body.
    #[must_use]
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script_body = Some(script.into());
        self
    }

    /// Sets the operator body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Returns the validated parallelism, defaulting to one.
    pub fn effective_parallelism(&self) -> Result<u64, InvalidParallelismError> {
        match &self.parallelism {
            DeclaredParallelism::Absent => Ok(1),
            DeclaredParallelism::Value(n) if *n >= 1 => Ok(n.unsigned_abs()),
            DeclaredParallelism::Value(n) => Err(InvalidParallelismError::new(
                self.index,
                &self.operator,
                Value::from(*n),
            )),
            DeclaredParallelism::Invalid(raw) => Err(InvalidParallelismError::new(
                self.index,
                &self.operator,
                raw.clone(),
            )),
        }
    }

    /// Parses one raw stage object.
    pub fn parse(index: usize, raw: &Value) -> Result<Self, MalformedPipelineError> {
        let object = raw.as_object().ok_or_else(|| {
            MalformedPipelineError::new(format!("stage {index} is not an object")).at_stage(index)
        })?;

        let mut operators = object.keys().filter(|k| k.starts_with('$'));
        let operator = match (operators.next(), operators.next()) {
            (Some(op), None) => op.clone(),
            (None, _) => {
                return Err(MalformedPipelineError::new(format!(
                    "stage {index} has no operator key"
                ))
                .at_stage(index))
            }
            (Some(_), Some(_)) => {
                return Err(MalformedPipelineError::new(format!(
                    "stage {index} has more than one operator key"
                ))
                .at_stage(index))
            }
        };

        if let Some(extra) = object
            .keys()
            .find(|k| !k.starts_with('$') && k.as_str() != "parallelism")
        {
            return Err(MalformedPipelineError::new(format!(
                "stage {index} has unexpected key '{extra}'"
            ))
            .at_stage(index));
        }

        let body = object.get(&operator).cloned().unwrap_or(Value::Null);

        let mut kind = StageKind::from_operator(&operator);
        let mut script_body = None;
        let mut scripts = Vec::new();
        if kind == StageKind::CustomFunction {
            collect_function_bodies(raw, &mut scripts);
        } else if matches!(
            kind,
            StageKind::AddFields | StageKind::Project | StageKind::Match | StageKind::Unknown(_)
        ) {
            collect_function_bodies(&body, &mut scripts);
            if !scripts.is_empty() {
                kind = StageKind::CustomFunction;
            }
        }
        if kind == StageKind::CustomFunction {
            script_body = Some(scripts.join("\n"));
        }

        let parallelism = declared_parallelism(object.get("parallelism"), &body);

        Ok(Self {
            index,
            operator,
            kind,
            parallelism,
            script_body,
            body,
        })
    }
}

/// Collects every declared parallelism in a stage.
///
/// Looks at the stage itself, the operator argument and a nested `into`
/// document (`$merge.into.parallelism`). A non-integer or sub-one declaration
/// anywhere wins so it is reported; otherwise the largest value is kept.
fn declared_parallelism(stage_level: Option<&Value>, body: &Value) -> DeclaredParallelism {
    let candidates = [
        stage_level,
        body.get("parallelism"),
        body.get("into").and_then(|into| into.get("parallelism")),
    ];

    let mut values = Vec::new();
    for raw in candidates.into_iter().flatten() {
        match integer_value(raw) {
            Some(n) => values.push(n),
            None => return DeclaredParallelism::Invalid(raw.clone()),
        }
    }

    if let Some(bad) = values.iter().copied().filter(|n| *n < 1).min() {
        return DeclaredParallelism::Value(bad);
    }
    values
        .into_iter()
        .max()
        .map_or(DeclaredParallelism::Absent, DeclaredParallelism::Value)
}

#[allow(clippy::cast_possible_truncation)]
fn integer_value(raw: &Value) -> Option<i64> {
    if let Some(n) = raw.as_i64() {
        return Some(n);
    }
    let f = raw.as_f64()?;
    (f.fract() == 0.0 && f.abs() < 1e15).then_some(f as i64)
}

fn collect_function_bodies(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if key == "$function" {
                    if let Some(body) = inner.get("body").and_then(Value::as_str) {
                        out.push(body.to_string());
                    }
                }
                collect_function_bodies(inner, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_function_bodies(item, out);
            }
        }
        _ => {}
    }
}

/// An ordered, classified pipeline. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineDefinition {
    stages: Vec<Stage>,
}

impl PipelineDefinition {
    /// Wraps already classified stages.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Classifies raw stage objects.
    ///
    /// Only per-stage structure is checked here; pipeline-level invariants are
    /// checked by [`PipelineDefinition::validate_shape`].
    pub fn parse(raw: &[Value]) -> Result<Self, AdvisorError> {
        let stages = raw
            .iter()
            .enumerate()
            .map(|(index, value)| Stage::parse(index, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    /// Returns the stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of source and sink stages.
    #[must_use]
    pub fn connections_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.kind.is_source() || s.kind.is_sink())
            .count()
    }

    /// Checks that the pipeline is non-empty and starts with a source.
    pub fn validate_shape(&self) -> Result<(), MalformedPipelineError> {
        let first = self
            .stages
            .first()
            .ok_or_else(|| MalformedPipelineError::new("pipeline has no stages"))?;
        if !first.kind.is_source() {
            return Err(MalformedPipelineError::new(format!(
                "first stage must be $source, found {}",
                first.operator
            ))
            .at_stage(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_processor_json() {
        let def = ProcessorDefinition::from_json(
            r#"{"name": "orders", "pipeline": [{"$source": {"connectionName": "kafka"}}], "options": {"dlq": {}}}"#,
        )
        .unwrap();
        assert_eq!(def.name, "orders");
        assert_eq!(def.pipeline.len(), 1);
        assert!(def.options.is_some());
    }

    #[test]
    fn test_parallelism_locations() {
        let stage = Stage::parse(0, &json!({"$merge": {"into": {"coll": "x", "parallelism": 4}}})).unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Value(4));

        let stage = Stage::parse(0, &json!({"$lookup": {"from": {}, "parallelism": 3}})).unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Value(3));

        let stage = Stage::parse(0, &json!({"$match": {}, "parallelism": 2})).unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Value(2));

        let stage = Stage::parse(0, &json!({"$match": {}})).unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Absent);
        assert_eq!(stage.effective_parallelism().unwrap(), 1);
    }

    #[test]
    fn test_parallelism_takes_largest_declaration() {
        let stage = Stage::parse(
            0,
            &json!({"$merge": {"parallelism": 2, "into": {"parallelism": 5}}}),
        )
        .unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Value(5));
    }

    #[test]
    fn test_invalid_parallelism_values() {
        let stage = Stage::parse(1, &json!({"$merge": {"parallelism": 0}})).unwrap();
        assert!(stage.effective_parallelism().is_err());

        let stage = Stage::parse(1, &json!({"$merge": {"parallelism": "four"}})).unwrap();
        assert!(matches!(stage.parallelism, DeclaredParallelism::Invalid(_)));
        assert!(stage.effective_parallelism().is_err());

        let stage = Stage::parse(1, &json!({"$merge": {"parallelism": 2.5}})).unwrap();
        assert!(stage.effective_parallelism().is_err());

        let stage = Stage::parse(1, &json!({"$merge": {"parallelism": 3.0}})).unwrap();
        assert_eq!(stage.effective_parallelism().unwrap(), 3);

        let stage =
            Stage::parse(1, &json!({"$merge": {"parallelism": 4, "into": {"parallelism": 0}}}))
                .unwrap();
        assert_eq!(stage.parallelism, DeclaredParallelism::Value(0));
    }

    #[test]
    fn test_embedded_function_becomes_custom_function() {
        let stage = Stage::parse(
            2,
            &json!({"$addFields": {"score": {"$function": {"body": "function(x) { return x * 2; }", "args": ["$v"], "lang": "js"}}}}),
        )
        .unwrap();
        assert_eq!(stage.kind, StageKind::CustomFunction);
        assert_eq!(stage.operator, "$addFields");
        assert_eq!(stage.script_body.as_deref(), Some("function(x) { return x * 2; }"));
    }

    #[test]
    fn test_unknown_operator_is_kept() {
        let stage = Stage::parse(3, &json!({"$https": {"connectionName": "api"}})).unwrap();
        assert_eq!(stage.kind, StageKind::Unknown("$https".to_string()));
        assert!(stage.script_body.is_none());
    }

    #[test]
    fn test_structural_errors() {
        assert!(Stage::parse(0, &json!("$source")).is_err());
        assert!(Stage::parse(0, &json!({})).is_err());
        assert!(Stage::parse(0, &json!({"$source": {}, "$match": {}})).is_err());
        let err = Stage::parse(4, &json!({"$match": {}, "comment": "x"})).unwrap_err();
        assert_eq!(err.stage_index, Some(4));
    }

    #[test]
    fn test_validate_shape() {
        assert!(PipelineDefinition::default().validate_shape().is_err());

        let pipeline = PipelineDefinition::parse(&[json!({"$match": {}})]).unwrap();
        let err = pipeline.validate_shape().unwrap_err();
        assert_eq!(err.stage_index, Some(0));

        let pipeline =
            PipelineDefinition::parse(&[json!({"$source": {}}), json!({"$emit": {}})]).unwrap();
        assert!(pipeline.validate_shape().is_ok());
        assert_eq!(pipeline.connections_count(), 2);
    }
}
