use serde::Serialize;

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_CODE_LANGUAGE: &str = "plaintext";

/// Normalized form of one local wiki page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub title: String,
    pub category: String,
    pub breadcrumbs: Vec<String>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub paragraphs: Vec<String>,
    pub list_items: Vec<String>,
    pub checklist_items: Vec<String>,
    pub code_blocks: Vec<CodeSnippet>,
    pub callouts: Vec<Callout>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CodeSnippet {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Callout {
    pub kind: CalloutKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalloutKind {
    Info,
    Warning,
    Example,
}

impl CalloutKind {
    /// Maps a callout region class to its kind.
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "info-box" => Some(Self::Info),
            "warning-box" => Some(Self::Warning),
            "example-box" => Some(Self::Example),
            _ => None,
        }
    }
}
