use std::collections::HashMap;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::layout_analyses;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = layout_analyses)]
pub struct LayoutAnalysis {
    pub id: i32,
    pub doc_id: String,
    pub page_count: i32,
    pub total_elements: i32,
    /// JSON-encoded `HashMap<String, i64>`.
    pub element_types: String,
    /// JSON-encoded, opaque per-page element list.
    pub pages: String,
}

impl LayoutAnalysis {
    pub fn element_types_map(&self) -> HashMap<String, i64> {
        serde_json::from_str(&self.element_types).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = layout_analyses)]
pub struct NewLayoutAnalysis {
    pub doc_id: String,
    pub page_count: i32,
    pub total_elements: i32,
    pub element_types: String,
    pub pages: String,
}

impl NewLayoutAnalysis {
    pub fn new(
        doc_id: impl Into<String>,
        page_count: i32,
        element_types: &HashMap<String, i64>,
        pages: &serde_json::Value,
    ) -> Self {
        let total_elements = element_types.values().sum();
        Self {
            doc_id: doc_id.into(),
            page_count,
            total_elements: total_elements as i32,
            element_types: serde_json::to_string(element_types).unwrap_or_else(|_| "{}".to_string()),
            pages: pages.to_string(),
        }
    }
}
