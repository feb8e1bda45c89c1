//! Stage kind classification.

use serde::{Serialize, Serializer};
use std::fmt;

/// The operation class of a pipeline stage, inferred from its operator key.
///
/// The set is closed; operators outside it are kept as [`StageKind::Unknown`]
/// with the raw operator name so they are never dropped or misclassified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// `$source`: reads from a connection.
    Source,
    /// `$match`: filters documents.
    Match,
    /// `$addFields` / `$set`.
    AddFields,
    /// `$project` / `$unset`.
    Project,
    /// `$lookup`: joins against a collection.
    Lookup,
    /// `$group`.
    Group,
    /// `$tumblingWindow`, `$hoppingWindow`, `$sessionWindow`.
    Window,
    /// `$merge`: writes into a collection.
    Merge,
    /// `$emit`: writes to a stream sink.
    Emit,
    /// A stage evaluating a user supplied `$function` body.
    CustomFunction,
    /// Any other operator, kept verbatim.
    Unknown(String),
}

impl StageKind {
    /// Classifies an operator key.
    ///
    /// `$function` embedded inside another operator is detected separately by
    /// the pipeline parser; this only looks at the key itself.
    #[must_use]
    pub fn from_operator(operator: &str) -> Self {
        match operator {
            "$source" => Self::Source,
            "$match" => Self::Match,
            "$addFields" | "$set" => Self::AddFields,
            "$project" | "$unset" => Self::Project,
            "$lookup" => Self::Lookup,
            "$group" => Self::Group,
            "$tumblingWindow" | "$hoppingWindow" | "$sessionWindow" => Self::Window,
            "$merge" => Self::Merge,
            "$emit" => Self::Emit,
            "$function" => Self::CustomFunction,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The primary operator key for this kind.
    #[must_use]
    pub fn canonical_operator(&self) -> &str {
        match self {
            Self::Source => "$source",
            Self::Match => "$match",
            Self::AddFields => "$addFields",
            Self::Project => "$project",
            Self::Lookup => "$lookup",
            Self::Group => "$group",
            Self::Window => "$tumblingWindow",
            Self::Merge => "$merge",
            Self::Emit => "$emit",
            Self::CustomFunction => "$function",
            Self::Unknown(op) => op,
        }
    }

    /// Returns true for stages that read from a connection.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source)
    }

    /// Returns true for stages that write to a connection.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Merge | Self::Emit)
    }

    /// Returns true when the operator was not recognized.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Match => write!(f, "match"),
            Self::AddFields => write!(f, "add_fields"),
            Self::Project => write!(f, "project"),
            Self::Lookup => write!(f, "lookup"),
            Self::Group => write!(f, "group"),
            Self::Window => write!(f, "window"),
            Self::Merge => write!(f, "merge"),
            Self::Emit => write!(f, "emit"),
            Self::CustomFunction => write!(f, "custom_function"),
            Self::Unknown(op) => write!(f, "unknown({op})"),
        }
    }
}

impl Serialize for StageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
