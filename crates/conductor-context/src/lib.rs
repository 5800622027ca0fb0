//! Schema Context Builder : selects relevant CRM objects/fields
//! and default values from a vector index before the planner prompts the
//! model, so the model is never asked to hallucinate a field name.

mod builder;
mod defaults;
mod index;
mod injection;
mod report;
mod required_fields;

pub use builder::{SchemaContextBuilder, SelectedField};
pub use index::{FieldDefault, FieldMatch, ObjectMatch, SchemaIndex};
pub use report::{ObjectSelectionReport, SchemaContextReport};
pub use required_fields::required_fields_for;
