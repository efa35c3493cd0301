use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use thiserror::Error;

pub const TEXT_DELETE: &str = "text-delete";
pub const TEXT_INSERT: &str = "text-insert";
pub const TEXT_REPLACE: &str = "text-replace";
pub const TEXT_SWAP: &str = "text-swap";
pub const MULTIPLE: &str = "multiple";

/// Errors raised while building, decoding or applying a single mutation.
#[derive(Error, Debug)]
pub enum MutationError {
    /// A range whose exclusive end lies before its inclusive begin.
    #[error("Invalid mutation range: end {end} precedes begin {begin}")]
    InvalidRange { begin: usize, end: usize },

    /// A known mutation type was missing one of its required fields.
    #[error("Mutation of type '{type_name}' is missing required field '{field}'")]
    MissingField {
        type_name: String,
        field: &'static str,
    },

    /// A known mutation type carried a field of the wrong shape.
    #[error("Mutation of type '{type_name}' has a malformed '{field}' field: {reason}")]
    MalformedField {
        type_name: String,
        field: &'static str,
        reason: String,
    },

    /// The `search` pattern of a `text-replace` mutation is not a valid regex.
    #[error("Invalid search pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A mutator was handed a mutation of a kind it does not apply.
    #[error("Mutator for '{expected}' cannot apply a '{actual}' mutation")]
    UnexpectedKind {
        expected: &'static str,
        actual: String,
    },
}

/// Character positions a mutation affects.
///
/// Offsets count Unicode scalar values from the start of the file. `end` is
/// exclusive; when it is absent the range is a zero-width insertion point at
/// `begin`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "RawMutationRange")]
pub struct MutationRange {
    pub begin: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl MutationRange {
    /// A zero-width range at `begin`.
    pub fn point(begin: usize) -> Self {
        Self { begin, end: None }
    }

    /// A `[begin, end)` range. An `end` before `begin` collapses onto `begin`.
    pub fn span(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end: Some(end.max(begin)),
        }
    }

    /// The position used as the ordering key: `end` if present, else `begin`.
    pub fn effective_end(&self) -> usize {
        self.end.unwrap_or(self.begin).max(self.begin)
    }
}

#[derive(Deserialize)]
struct RawMutationRange {
    begin: usize,
    #[serde(default)]
    end: Option<usize>,
}

impl TryFrom<RawMutationRange> for MutationRange {
    type Error = MutationError;

    fn try_from(raw: RawMutationRange) -> Result<Self, Self::Error> {
        match raw.end {
            Some(end) if end < raw.begin => Err(MutationError::InvalidRange {
                begin: raw.begin,
                end,
            }),
            end => Ok(MutationRange {
                begin: raw.begin,
                end,
            }),
        }
    }
}

/// Kind-specific payload of a [`Mutation`], discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    TextDelete,
    TextInsert {
        insertion: String,
    },
    TextReplace {
        search: String,
        replace: String,
    },
    TextSwap {
        insertion: String,
    },
    Multiple {
        mutations: Vec<Mutation>,
    },
    /// A tag with no built-in variant. Its extra fields are kept verbatim so a
    /// registered plugin mutator can read them.
    Custom {
        type_name: String,
        fields: JsonMap<String, JsonValue>,
    },
}

/// Description of a single edit to be applied to a file.
///
/// On the wire this is the record `{"type": ..., "range": {...}, ...fields}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawMutation", into = "RawMutation")]
pub struct Mutation {
    pub range: MutationRange,
    pub kind: MutationKind,
}

impl Mutation {
    pub fn new(range: MutationRange, kind: MutationKind) -> Self {
        Self { range, kind }
    }

    pub fn text_delete(begin: usize, end: usize) -> Self {
        Self::new(MutationRange::span(begin, end), MutationKind::TextDelete)
    }

    pub fn text_insert(begin: usize, insertion: impl Into<String>) -> Self {
        Self::new(
            MutationRange::point(begin),
            MutationKind::TextInsert {
                insertion: insertion.into(),
            },
        )
    }

    /// A whole-file regex replacement. The range only matters for ordering.
    pub fn text_replace(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self::new(
            MutationRange::point(0),
            MutationKind::TextReplace {
                search: search.into(),
                replace: replace.into(),
            },
        )
    }

    pub fn text_swap(begin: usize, end: usize, insertion: impl Into<String>) -> Self {
        Self::new(
            MutationRange::span(begin, end),
            MutationKind::TextSwap {
                insertion: insertion.into(),
            },
        )
    }

    /// The string tag the mutator registry resolves this mutation by.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            MutationKind::TextDelete => TEXT_DELETE,
            MutationKind::TextInsert { .. } => TEXT_INSERT,
            MutationKind::TextReplace { .. } => TEXT_REPLACE,
            MutationKind::TextSwap { .. } => TEXT_SWAP,
            MutationKind::Multiple { .. } => MULTIPLE,
            MutationKind::Custom { type_name, .. } => type_name,
        }
    }

    pub fn effective_end(&self) -> usize {
        self.range.effective_end()
    }
}

#[derive(Serialize, Deserialize)]
struct RawMutation {
    range: MutationRange,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(flatten)]
    fields: JsonMap<String, JsonValue>,
}

fn take_string(
    fields: &mut JsonMap<String, JsonValue>,
    type_name: &str,
    field: &'static str,
) -> Result<String, MutationError> {
    match fields.remove(field) {
        Some(JsonValue::String(value)) => Ok(value),
        Some(other) => Err(MutationError::MalformedField {
            type_name: type_name.to_string(),
            field,
            reason: format!("expected a string, found {other}"),
        }),
        None => Err(MutationError::MissingField {
            type_name: type_name.to_string(),
            field,
        }),
    }
}

impl TryFrom<RawMutation> for Mutation {
    type Error = MutationError;

    fn try_from(raw: RawMutation) -> Result<Self, Self::Error> {
        let RawMutation {
            range,
            type_name,
            mut fields,
        } = raw;

        let known = match type_name.as_str() {
            TEXT_DELETE => Some(MutationKind::TextDelete),
            TEXT_INSERT => Some(MutationKind::TextInsert {
                insertion: take_string(&mut fields, &type_name, "insertion")?,
            }),
            TEXT_REPLACE => Some(MutationKind::TextReplace {
                search: take_string(&mut fields, &type_name, "search")?,
                replace: take_string(&mut fields, &type_name, "replace")?,
            }),
            TEXT_SWAP => Some(MutationKind::TextSwap {
                insertion: take_string(&mut fields, &type_name, "insertion")?,
            }),
            MULTIPLE => {
                let value = fields
                    .remove("mutations")
                    .ok_or_else(|| MutationError::MissingField {
                        type_name: type_name.clone(),
                        field: "mutations",
                    })?;
                let mutations: Vec<Mutation> =
                    serde_json::from_value(value).map_err(|e| MutationError::MalformedField {
                        type_name: type_name.clone(),
                        field: "mutations",
                        reason: e.to_string(),
                    })?;
                Some(MutationKind::Multiple { mutations })
            }
            _ => None,
        };

        let kind = match known {
            Some(kind) => kind,
            None => MutationKind::Custom { type_name, fields },
        };
        Ok(Mutation { range, kind })
    }
}

fn range_to_value(range: MutationRange) -> JsonValue {
    let mut map = JsonMap::new();
    map.insert("begin".to_string(), JsonValue::from(range.begin));
    if let Some(end) = range.end {
        map.insert("end".to_string(), JsonValue::from(end));
    }
    JsonValue::Object(map)
}

impl RawMutation {
    fn into_value(self) -> JsonValue {
        let mut map = self.fields;
        map.insert("range".to_string(), range_to_value(self.range));
        map.insert("type".to_string(), JsonValue::String(self.type_name));
        JsonValue::Object(map)
    }
}

impl From<Mutation> for RawMutation {
    fn from(mutation: Mutation) -> Self {
        let type_name = mutation.type_name().to_string();
        let mut fields = JsonMap::new();
        match mutation.kind {
            MutationKind::TextDelete => {}
            MutationKind::TextInsert { insertion } | MutationKind::TextSwap { insertion } => {
                fields.insert("insertion".to_string(), JsonValue::String(insertion));
            }
            MutationKind::TextReplace { search, replace } => {
                fields.insert("search".to_string(), JsonValue::String(search));
                fields.insert("replace".to_string(), JsonValue::String(replace));
            }
            MutationKind::Multiple { mutations } => {
                let children = mutations
                    .into_iter()
                    .map(|child| RawMutation::from(child).into_value())
                    .collect();
                fields.insert("mutations".to_string(), JsonValue::Array(children));
            }
            MutationKind::Custom {
                fields: custom_fields,
                ..
            } => fields = custom_fields,
        }
        RawMutation {
            range: mutation.range,
            type_name,
            fields,
        }
    }
}

/// Mutations to be applied to files, keyed by file name.
pub type FileMutations = BTreeMap<String, Vec<Mutation>>;

/// One round of file mutations produced by a [`crate::provider::MutationsProvider`].
///
/// A wave without `fileMutations` (as opposed to an empty mapping) tells the
/// run loop that the source has nothing more to offer.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutationsWave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mutations: Option<FileMutations>,
}

impl MutationsWave {
    /// A wave signalling that no mutations remain.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_file_mutations(file_mutations: FileMutations) -> Self {
        Self {
            file_mutations: Some(file_mutations),
        }
    }

    pub fn mutations_count(&self) -> usize {
        self.file_mutations
            .as_ref()
            .map_or(0, |fm| fm.values().map(Vec::len).sum())
    }
}

/// Combines several mutations into a single `multiple` mutation.
///
/// The combined range starts at the smallest child `begin` and ends at the
/// largest child effective end. Children are stored ordered first-to-last.
/// With no children the result is an empty `multiple` at offset 0.
pub fn combine_mutations<I>(mutations: I) -> Mutation
where
    I: IntoIterator<Item = Mutation>,
{
    let mut children: Vec<Mutation> = mutations.into_iter().collect();
    children.sort_by_key(Mutation::effective_end);

    let begin = children.iter().map(|m| m.range.begin).min();
    let end = children.iter().map(Mutation::effective_end).max();
    let range = match begin {
        Some(begin) => MutationRange { begin, end },
        None => MutationRange::point(0),
    };

    Mutation::new(
        range,
        MutationKind::Multiple {
            mutations: children,
        },
    )
}
