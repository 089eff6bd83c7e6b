use serde::{Deserialize, Serialize};

/// Experiment record as stored by the dashboard.
///
/// Accepts both the dashboard's camelCase fields and the datastore's snake_case columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    #[serde(alias = "project_id")]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    /// Regular expression tested against the full page URL.
    #[serde(alias = "url_pattern")]
    pub url_pattern: String,
    /// CSS selector of the element whose text is replaced.
    pub selector: String,
    #[serde(default, alias = "element_type")]
    pub element_type: ElementType,
    #[serde(default, alias = "original_text")]
    pub original_text: String,
    pub status: ExperimentStatus,
    pub variants: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "start_date")]
    pub start_date: Option<String>,
    /// Externally computed statistics, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ExperimentStats>,
}

impl Experiment {
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

/// One candidate version of the page element. The original text is the control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "is_control")]
    pub is_control: bool,
    /// Share of traffic in percent. 50 means 50%.
    #[serde(default, alias = "traffic_split")]
    pub traffic_split: u32,
}

impl Variant {
    /// A variant with only the fields allocation looks at.
    pub fn new(id: impl Into<String>, is_control: bool, traffic_split: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            content: String::new(),
            is_control,
            traffic_split,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    #[default]
    Headline,
    Subhead,
    Paragraph,
    Button,
    Link,
    Faq,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStats {
    pub visitors: u64,
    pub conversions: u64,
    #[serde(alias = "composite_score")]
    pub composite_score: f64,
    /// 0 to 1.
    pub confidence: f64,
}

/// `TryParse` allows a list element to fail parsing without failing the parsing of the whole list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
