use serde_json::{Value, json};

use crate::document::{CalloutKind, DocumentRecord};
use crate::error::SyncError;

/// Longest text run the store accepts inside one rich text object.
pub const MAX_TEXT_RUN_CHARS: usize = 2000;

const SUPPORTED_LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json", "julia",
    "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown", "markup",
    "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php", "plain text",
    "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust", "sass", "scala",
    "scheme", "scss", "shell", "sql", "swift", "typescript", "vb.net", "visual basic", "xml",
    "yaml",
];

const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("csharp", "c#"),
    ("cs", "c#"),
    ("plaintext", "plain text"),
    ("text", "plain text"),
    ("sh", "shell"),
    ("yml", "yaml"),
    ("ts", "typescript"),
    ("js", "javascript"),
    ("py", "python"),
    ("rb", "ruby"),
    ("java/c/c++/c#", "java"),
];

/// A code language tag from the store's allow-list. The only constructor
/// coerces unknown tags to `plain text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLanguage(&'static str);

impl CodeLanguage {
    pub const PLAIN_TEXT: CodeLanguage = CodeLanguage("plain text");

    pub fn from_tag(tag: &str) -> Self {
        let lowered = tag.trim().to_lowercase();
        let canonical = LANGUAGE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, target)| *target)
            .unwrap_or(lowered.as_str());
        SUPPORTED_LANGUAGES
            .iter()
            .copied()
            .find(|supported| *supported == canonical)
            .map(CodeLanguage)
            .unwrap_or(Self::PLAIN_TEXT)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockColor {
    Default,
    BlueBackground,
    YellowBackground,
    GreenBackground,
}

impl BlockColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::BlueBackground => "blue_background",
            Self::YellowBackground => "yellow_background",
            Self::GreenBackground => "green_background",
        }
    }
}

/// One unit of the remote block model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBlock {
    Callout {
        text: String,
        emoji: String,
        color: BlockColor,
    },
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    BulletedItem {
        text: String,
    },
    ToDo {
        text: String,
        checked: bool,
    },
    Code {
        code: String,
        language: CodeLanguage,
    },
    Divider,
    /// A paragraph made of an emoji followed by a mention of another page.
    PageLink {
        emoji: String,
        page_id: String,
    },
}

impl RemoteBlock {
    /// The store's block type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Callout { .. } => "callout",
            Self::Heading { level: 1, .. } => "heading_1",
            Self::Heading { level: 2, .. } => "heading_2",
            Self::Heading { .. } => "heading_3",
            Self::Paragraph { .. } | Self::PageLink { .. } => "paragraph",
            Self::BulletedItem { .. } => "bulleted_list_item",
            Self::ToDo { .. } => "to_do",
            Self::Code { .. } => "code",
            Self::Divider => "divider",
        }
    }

    /// Wire representation accepted by the create and append endpoints.
    pub fn to_json(&self) -> Value {
        let kind = self.kind();
        let body = match self {
            Self::Callout { text, emoji, color } => json!({
                "rich_text": rich_text(text),
                "icon": { "type": "emoji", "emoji": emoji },
                "color": color.as_str(),
            }),
            Self::Heading { text, .. } | Self::Paragraph { text } | Self::BulletedItem { text } => {
                json!({ "rich_text": rich_text(text) })
            }
            Self::ToDo { text, checked } => json!({
                "rich_text": rich_text(text),
                "checked": checked,
            }),
            Self::Code { code, language } => json!({
                "rich_text": rich_text(code),
                "language": language.as_str(),
            }),
            Self::Divider => json!({}),
            Self::PageLink { emoji, page_id } => json!({
                "rich_text": [
                    { "type": "text", "text": { "content": format!("{emoji} ") } },
                    { "type": "mention", "mention": { "type": "page", "page": { "id": page_id } } },
                ],
            }),
        };
        json!({ "object": "block", "type": kind, kind: body })
    }
}

fn rich_text(content: &str) -> Value {
    let runs = split_text_runs(content, MAX_TEXT_RUN_CHARS)
        .into_iter()
        .map(|run| json!({ "type": "text", "text": { "content": run } }))
        .collect::<Vec<_>>();
    Value::Array(runs)
}

fn split_text_runs(content: &str, limit: usize) -> Vec<String> {
    if content.is_empty() {
        return vec![String::new()];
    }
    let chars = content.chars().collect::<Vec<_>>();
    chars
        .chunks(limit.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// Emit checklist items as completed to-do blocks.
    pub checklist_checked: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            checklist_checked: true,
        }
    }
}

fn callout_style(kind: CalloutKind) -> (&'static str, BlockColor) {
    match kind {
        CalloutKind::Warning => ("⚠️", BlockColor::YellowBackground),
        CalloutKind::Example => ("💡", BlockColor::GreenBackground),
        CalloutKind::Info => ("ℹ️", BlockColor::BlueBackground),
    }
}

/// Translate a record into remote blocks: category summary first, then per
/// section heading, paragraphs, callouts, checklist, list items, code.
pub fn translate(
    record: &DocumentRecord,
    options: &TranslateOptions,
) -> Result<Vec<RemoteBlock>, SyncError> {
    let mut blocks = vec![RemoteBlock::Callout {
        text: format!("📁 Category: {}", record.category),
        emoji: "📚".to_string(),
        color: BlockColor::BlueBackground,
    }];

    for section in &record.sections {
        blocks.push(RemoteBlock::Heading {
            level: 2,
            text: section.title.clone(),
        });
        blocks.extend(
            section
                .paragraphs
                .iter()
                .map(|text| RemoteBlock::Paragraph { text: text.clone() }),
        );
        blocks.extend(section.callouts.iter().map(|callout| {
            let (emoji, color) = callout_style(callout.kind);
            RemoteBlock::Callout {
                text: callout.text.clone(),
                emoji: emoji.to_string(),
                color,
            }
        }));
        blocks.extend(section.checklist_items.iter().map(|text| RemoteBlock::ToDo {
            text: text.clone(),
            checked: options.checklist_checked,
        }));
        blocks.extend(
            section
                .list_items
                .iter()
                .map(|text| RemoteBlock::BulletedItem { text: text.clone() }),
        );
        blocks.extend(section.code_blocks.iter().map(|snippet| RemoteBlock::Code {
            code: snippet.code.clone(),
            language: CodeLanguage::from_tag(&snippet.language),
        }));
    }

    if blocks.len() <= 1 {
        return Err(SyncError::TranslationEmpty {
            title: record.title.clone(),
        });
    }
    Ok(blocks)
}

pub fn blocks_to_json(blocks: &[RemoteBlock]) -> Vec<Value> {
    blocks.iter().map(RemoteBlock::to_json).collect()
}

#[cfg(test)]
mod tests {
    use super::{
        BlockColor, CodeLanguage, MAX_TEXT_RUN_CHARS, RemoteBlock, TranslateOptions, translate,
    };
    use crate::document::{Callout, CalloutKind, CodeSnippet, DocumentRecord, Section};
    use crate::error::SyncError;

    fn record(sections: Vec<Section>) -> DocumentRecord {
        DocumentRecord {
            title: "Auth Guide".to_string(),
            category: "Backend".to_string(),
            breadcrumbs: Vec::new(),
            sections,
        }
    }

    #[test]
    fn language_aliases_map_to_canonical_tags() {
        assert_eq!(CodeLanguage::from_tag("csharp").as_str(), "c#");
        assert_eq!(CodeLanguage::from_tag("CS").as_str(), "c#");
        assert_eq!(CodeLanguage::from_tag("yml").as_str(), "yaml");
        assert_eq!(CodeLanguage::from_tag("java/c/c++/c#").as_str(), "java");
        assert_eq!(CodeLanguage::from_tag("Rust").as_str(), "rust");
        assert_eq!(CodeLanguage::from_tag("plaintext").as_str(), "plain text");
    }

    #[test]
    fn unknown_languages_fall_back_to_plain_text() {
        for tag in ["brainfuck", "", "c-sharp", "tsx", "vue"] {
            assert_eq!(CodeLanguage::from_tag(tag), CodeLanguage::PLAIN_TEXT, "{tag}");
        }
    }

    #[test]
    fn translation_follows_section_order() {
        let section = Section {
            title: "Tokens".to_string(),
            paragraphs: vec!["p1".to_string()],
            list_items: vec!["li".to_string()],
            checklist_items: vec!["done".to_string()],
            code_blocks: vec![CodeSnippet {
                language: "csharp".to_string(),
                code: "var x = 1;".to_string(),
            }],
            callouts: vec![
                Callout {
                    kind: CalloutKind::Warning,
                    text: "careful".to_string(),
                },
                Callout {
                    kind: CalloutKind::Example,
                    text: "sample".to_string(),
                },
            ],
        };
        let blocks = translate(&record(vec![section]), &TranslateOptions::default())
            .expect("translate");
        let kinds = blocks.iter().map(RemoteBlock::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                "callout",
                "heading_2",
                "paragraph",
                "callout",
                "callout",
                "to_do",
                "bulleted_list_item",
                "code"
            ]
        );
        assert_eq!(
            blocks[0],
            RemoteBlock::Callout {
                text: "📁 Category: Backend".to_string(),
                emoji: "📚".to_string(),
                color: BlockColor::BlueBackground,
            }
        );
        assert!(matches!(
            &blocks[3],
            RemoteBlock::Callout { color: BlockColor::YellowBackground, .. }
        ));
        assert!(matches!(
            &blocks[4],
            RemoteBlock::Callout { color: BlockColor::GreenBackground, .. }
        ));
        assert_eq!(
            blocks[5],
            RemoteBlock::ToDo {
                text: "done".to_string(),
                checked: true,
            }
        );
        assert_eq!(blocks[7].to_json()["code"]["language"], "c#");
    }

    #[test]
    fn checklist_policy_is_configurable() {
        let section = Section {
            title: "Checks".to_string(),
            checklist_items: vec!["pending".to_string()],
            ..Section::default()
        };
        let blocks = translate(
            &record(vec![section]),
            &TranslateOptions {
                checklist_checked: false,
            },
        )
        .expect("translate");
        assert_eq!(blocks[2].to_json()["to_do"]["checked"], false);
    }

    #[test]
    fn record_without_sections_is_translation_empty() {
        let error = translate(&record(Vec::new()), &TranslateOptions::default())
            .expect_err("must fail");
        assert!(matches!(error, SyncError::TranslationEmpty { .. }));
    }

    #[test]
    fn long_text_is_split_into_runs() {
        let long = "x".repeat(MAX_TEXT_RUN_CHARS * 2 + 5);
        let json = RemoteBlock::Paragraph { text: long }.to_json();
        let runs = json["paragraph"]["rich_text"].as_array().expect("runs");
        assert_eq!(runs.len(), 3);
        assert_eq!(
            runs[2]["text"]["content"].as_str().map(str::len),
            Some(5)
        );
    }

    #[test]
    fn page_link_renders_mention() {
        let json = RemoteBlock::PageLink {
            emoji: "⚙️".to_string(),
            page_id: "abc".to_string(),
        }
        .to_json();
        assert_eq!(json["type"], "paragraph");
        assert_eq!(json["paragraph"]["rich_text"][1]["mention"]["page"]["id"], "abc");
        assert_eq!(RemoteBlock::Divider.to_json()["divider"], serde_json::json!({}));
    }
}
