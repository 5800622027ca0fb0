use serde::{Deserialize, Serialize};

/// Tunables for the Schema Context Builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContextConfig {
    /// Top-K objects considered for primary/secondary selection.
    #[serde(default = "d_object_top_k")]
    pub object_top_k: usize,
    /// Max semantic distance for an object to qualify as primary/secondary.
    #[serde(default = "d_object_max_distance")]
    pub object_max_distance: f64,

    /// Top-K fields considered per selected object.
    #[serde(default = "d_field_top_k")]
    pub field_top_k: usize,
    /// Max semantic distance for a field to qualify.
    #[serde(default = "d_field_max_distance")]
    pub field_max_distance: f64,
    /// Hard cap on fields injected per object, after hardcoded required
    /// fields are unioned in.
    #[serde(default = "d_field_cap")]
    pub field_cap: usize,
}

impl Default for SchemaContextConfig {
    fn default() -> Self {
        Self {
            object_top_k: d_object_top_k,
            object_max_distance: d_object_max_distance,
            field_top_k: d_field_top_k,
            field_max_distance: d_field_max_distance,
            field_cap: d_field_cap,
        }
    }
}

fn d_object_top_k() -> usize {
    5
}
fn d_object_max_distance() -> f64 {
    1.5
}
fn d_field_top_k() -> usize {
    15
}
fn d_field_max_distance() -> f64 {
    2.0
}
fn d_field_cap() -> usize {
    15
}
