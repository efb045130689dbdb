use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

use crate::document::{
    Callout, CalloutKind, CodeSnippet, DEFAULT_CATEGORY, DEFAULT_CODE_LANGUAGE, DocumentRecord,
    Section,
};
use crate::error::SyncError;

pub const DEFAULT_TITLE_SUFFIX: &str = " - Hanung's Dev Wiki";

const CALLOUT_CLASSES: [&str; 3] = ["info-box", "warning-box", "example-box"];
const CHECKLIST_CLASS: &str = "checklist";
const SECTION_CLASS: &str = "doc-section";

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Suffix stripped from `<title>` when the article has no `h1`.
    pub title_suffix: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            title_suffix: DEFAULT_TITLE_SUFFIX.to_string(),
        }
    }
}

struct Selectors {
    article_heading: Selector,
    page_title: Selector,
    badge: Selector,
    breadcrumb: Selector,
    section: Selector,
    section_heading: Selector,
    paragraph: Selector,
    list_item: Selector,
    checklist_item: Selector,
    span: Selector,
    code: Selector,
    callout: Selector,
}

impl Selectors {
    fn compile() -> Result<Self> {
        Ok(Self {
            article_heading: selector("article h1")?,
            page_title: selector("title")?,
            badge: selector(".badge")?,
            breadcrumb: selector(".breadcrumb a, .breadcrumb span")?,
            section: selector("article .doc-section")?,
            section_heading: selector("h2")?,
            paragraph: selector("p")?,
            list_item: selector("ul li, ol li")?,
            checklist_item: selector(".checklist-item")?,
            span: selector("span")?,
            code: selector("pre code")?,
            callout: selector(".info-box, .warning-box, .example-box")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|error| anyhow!("invalid selector `{css}`: {error:?}"))
}

/// Structural extractor for wiki pages. Selectors are compiled once and the
/// parser is shared read-only by every worker of a batch.
pub struct DocumentParser {
    selectors: Selectors,
    options: ParserOptions,
}

impl DocumentParser {
    pub fn new(options: ParserOptions) -> Result<Self> {
        Ok(Self {
            selectors: Selectors::compile()?,
            options,
        })
    }

    pub fn parse_file(
        &self,
        path: &Path,
        category_hint: Option<&str>,
    ) -> Result<DocumentRecord, SyncError> {
        let bytes = fs::read(path)
            .map_err(|error| SyncError::parse(path.display().to_string(), error.to_string()))?;
        let html = String::from_utf8_lossy(&bytes);
        self.parse_html(&html, category_hint)
            .map_err(|error| match error {
                SyncError::Parse { reason, .. } => {
                    SyncError::parse(path.display().to_string(), reason)
                }
                other => other,
            })
    }

    pub fn parse_html(
        &self,
        html: &str,
        category_hint: Option<&str>,
    ) -> Result<DocumentRecord, SyncError> {
        let document = Html::parse_document(html);
        let s = &self.selectors;

        let title = self
            .article_title(&document)
            .or_else(|| self.page_title(&document))
            .ok_or_else(|| SyncError::parse("<inline>", "document has no title"))?;

        let category = document
            .select(&s.badge)
            .next()
            .map(|badge| element_text(&badge))
            .filter(|text| !text.is_empty())
            .or_else(|| {
                category_hint
                    .map(str::trim)
                    .filter(|hint| !hint.is_empty())
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let breadcrumbs = document
            .select(&s.breadcrumb)
            .map(|crumb| element_text(&crumb))
            .filter(|text| !text.is_empty() && text != "/")
            .collect();

        let sections = document
            .select(&s.section)
            .filter(|section| !inside_any(section, &[SECTION_CLASS]))
            .filter_map(|section| self.extract_section(section))
            .collect();

        Ok(DocumentRecord {
            title,
            category,
            breadcrumbs,
            sections,
        })
    }

    fn article_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.article_heading)
            .next()
            .map(|heading| element_text(&heading))
            .filter(|text| !text.is_empty())
    }

    fn page_title(&self, document: &Html) -> Option<String> {
        let raw = document
            .select(&self.selectors.page_title)
            .next()
            .map(|title| element_text(&title))?;
        let suffix = self.options.title_suffix.trim();
        let stripped = if suffix.is_empty() {
            raw.as_str()
        } else {
            raw.strip_suffix(suffix).unwrap_or(raw.as_str())
        }
        .trim();
        (!stripped.is_empty()).then(|| stripped.to_string())
    }

    fn extract_section(&self, section: ElementRef<'_>) -> Option<Section> {
        let s = &self.selectors;
        let title = section
            .select(&s.section_heading)
            .next()
            .map(|heading| element_text(&heading))
            .filter(|text| !text.is_empty())?;

        let paragraphs = section
            .select(&s.paragraph)
            .filter(|p| !inside_any(p, &CALLOUT_CLASSES) && !inside_any(p, &[CHECKLIST_CLASS]))
            .map(|p| element_text(&p))
            .filter(|text| !text.is_empty())
            .collect();

        let list_items = section
            .select(&s.list_item)
            .filter(|li| {
                !inside_any(li, &CALLOUT_CLASSES)
                    && !inside_any(li, &[CHECKLIST_CLASS])
                    && !has_any_class(li, &[CHECKLIST_CLASS, "checklist-item"])
            })
            .map(|li| element_text(&li))
            .filter(|text| !text.is_empty())
            .collect();

        let checklist_items = section
            .select(&s.checklist_item)
            .filter(|item| !inside_any(item, &CALLOUT_CLASSES))
            .map(|item| self.checklist_text(item))
            .filter(|text| !text.is_empty())
            .collect();

        let code_blocks = section
            .select(&s.code)
            .filter(|code| {
                !inside_any(code, &CALLOUT_CLASSES) && !inside_any(code, &[CHECKLIST_CLASS])
            })
            .filter_map(|code| {
                let text = code.text().collect::<String>();
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                Some(CodeSnippet {
                    language: code_language(&code),
                    code: text.to_string(),
                })
            })
            .collect();

        let callouts = section
            .select(&s.callout)
            .filter(|callout| {
                !inside_any(callout, &CALLOUT_CLASSES) && !inside_any(callout, &[CHECKLIST_CLASS])
            })
            .filter_map(|callout| {
                let kind = callout_kind(&callout)?;
                let text = element_text(&callout);
                (!text.is_empty()).then_some(Callout { kind, text })
            })
            .collect();

        Some(Section {
            title,
            paragraphs,
            list_items,
            checklist_items,
            code_blocks,
            callouts,
        })
    }

    fn checklist_text(&self, item: ElementRef<'_>) -> String {
        let spans = item
            .select(&self.selectors.span)
            .filter(|span| {
                !span
                    .ancestors()
                    .take_while(|node| node.id() != item.id())
                    .filter_map(ElementRef::wrap)
                    .any(|ancestor| ancestor.value().name() == "span")
            })
            .map(|span| element_text(&span))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();
        if spans.is_empty() {
            element_text(&item)
        } else {
            spans.join(" ")
        }
    }
}

/// Text content with whitespace runs collapsed.
fn element_text(element: &ElementRef<'_>) -> String {
    let raw = element.text().collect::<String>();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_any_class(element: &ElementRef<'_>, classes: &[&str]) -> bool {
    element
        .value()
        .classes()
        .any(|class| classes.contains(&class))
}

/// True when a strict ancestor carries one of `classes`.
fn inside_any(element: &ElementRef<'_>, classes: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| has_any_class(&ancestor, classes))
}

fn callout_kind(element: &ElementRef<'_>) -> Option<CalloutKind> {
    let classes = element.value().classes().collect::<Vec<_>>();
    if classes.contains(&"warning-box") {
        Some(CalloutKind::Warning)
    } else if classes.contains(&"example-box") {
        Some(CalloutKind::Example)
    } else {
        classes.into_iter().find_map(CalloutKind::from_class)
    }
}

fn code_language(code: &ElementRef<'_>) -> String {
    code.value()
        .classes()
        .find_map(|class| class.strip_prefix("language-"))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .unwrap_or(DEFAULT_CODE_LANGUAGE)
        .to_string()
}
