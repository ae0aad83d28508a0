//! Reduced-fidelity projections for values that cannot fit in full.
//!
//! When a value survives neither a direct write nor one retried after
//! cleanup, the facade trades fidelity for survival: it asks a [`Compactor`]
//! for a smaller rendition and stores that instead. Consumers detect the
//! reduced copy by the `"compact": true` tag.
//!
//! Compaction is a pluggable strategy. The facade routes each key to the
//! compactor registered for its namespace prefix, falling back to
//! [`ProfileCompactor`], a generic projection tuned for record-like payloads
//! (profiles, posts, drafts): it keeps identity fields and counters, truncates
//! long text, and drops bulky embedded payloads such as image galleries.

use serde_json::{Map, Value};

/// Longest string a compacted rendition keeps before truncating.
const MAX_STRING_LEN: usize = 500;

/// Suffix appended to truncated string fields.
const TRUNCATION_MARKER: &str = "...[truncated]";

/// Nested arrays/objects larger than this (serialized) are dropped outright.
const MAX_NESTED_BYTES: usize = 256;

/// Field tagging a value as a reduced-fidelity rendition.
pub const COMPACT_FLAG: &str = "compact";

/// A strategy producing a reduced-size rendition of a value.
///
/// Implementations must return a value that is either meaningfully smaller
/// than the input or equal to it; the facade skips the compaction tier when
/// the output equals the input. Any `Fn(&Value) -> Value` closure qualifies.
pub trait Compactor {
    fn compact(&self, value: &Value) -> Value;
}

impl<F> Compactor for F
where
    F: Fn(&Value) -> Value,
{
    fn compact(&self, value: &Value) -> Value {
        self(value)
    }
}

/// Default projection for record-like JSON objects.
///
/// Keeps scalars (ids, flags, counters), truncates strings past
/// [`MAX_STRING_LEN`] (in practice the `data:` URLs of embedded images)
/// and drops nested payloads whose serialized form exceeds
/// [`MAX_NESTED_BYTES`]. Non-objects pass through unchanged: there is no
/// field structure to trade away.
pub struct ProfileCompactor;

impl Compactor for ProfileCompactor {
    fn compact(&self, value: &Value) -> Value {
        let Value::Object(fields) = value else {
            return value.clone();
        };

        let mut reduced = Map::new();
        for (name, field) in fields {
            match field {
                Value::Null | Value::Bool(_) | Value::Number(_) => {
                    reduced.insert(name.clone(), field.clone());
                }
                Value::String(text) => {
                    reduced.insert(name.clone(), Value::String(truncate_text(text)));
                }
                Value::Array(_) | Value::Object(_) => {
                    // Galleries and embedded blobs are what blew the quota
                    if field.to_string().len() <= MAX_NESTED_BYTES {
                        reduced.insert(name.clone(), field.clone());
                    }
                }
            }
        }
        reduced.insert(COMPACT_FLAG.to_string(), Value::Bool(true));
        Value::Object(reduced)
    }
}

fn truncate_text(text: &str) -> String {
    if text.len() <= MAX_STRING_LEN {
        return text.to_string();
    }
    let mut end = MAX_STRING_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}
