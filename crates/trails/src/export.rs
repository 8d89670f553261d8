//! Markdown rendering of the trail forest and the matching importer.
//! 路徑樹的 Markdown 匯出與對應的匯入解析。
//!
//! ```text
//! # Brie Browser Trails
//!
//! - 🏠[Home]
//!   - [Example](https://example.com)
//!   - [Child]
//! ```

use std::fmt::Write as _;

use url::Url;

use crate::error::ValidationError;
use crate::graph::TrailGraph;
use crate::model::{ParentContext, Trail};

pub(crate) fn render_markdown(graph: &TrailGraph, title: &str) -> String {
    let mut markdown = format!("# {title}\n\n");
    for trail in graph.siblings(&ParentContext::TopLevel) {
        render_trail(graph, trail, 1, &mut markdown);
    }
    markdown
}

fn render_trail(graph: &TrailGraph, trail: &Trail, level: usize, out: &mut String) {
    let indent = "  ".repeat(level - 1);
    let icon = trail.icon.as_deref().unwrap_or("");
    let _ = writeln!(out, "{indent}- {icon}[{}]", trail.name);
    for page in graph.pages_of(trail.id) {
        let _ = writeln!(out, "{indent}  - [{}]({})", page.title, page.url);
    }
    for child in graph.siblings(&ParentContext::Trail(trail.id)) {
        render_trail(graph, child, level + 1, out);
    }
}

/// One trail recovered from markdown, in document order. Parents always come
/// before their children.
/// 從 Markdown 解析出的路徑節點；父節點一定排在子節點之前。
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineTrail {
    pub depth: usize,
    pub parent: Option<usize>,
    pub icon: Option<String>,
    pub name: String,
    pub pages: Vec<OutlinePage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlinePage {
    pub title: String,
    pub url: String,
}

/// Parses text in the export format into a flat outline.
/// 將匯出格式的文字解析為扁平化的大綱。
pub fn parse_markdown(text: &str) -> Result<Vec<OutlineTrail>, ValidationError> {
    let mut outline: Vec<OutlineTrail> = Vec::new();
    // Index into `outline` of the open trail at each depth.
    let mut open: Vec<usize> = Vec::new();
    let mut seen_header = false;

    for (number, raw) in text.lines().enumerate() {
        let line = number + 1;
        let malformed = |reason: &str| ValidationError::MalformedImport {
            line,
            reason: reason.to_string(),
        };
        if raw.trim().is_empty() {
            continue;
        }
        if !seen_header && outline.is_empty() && raw.starts_with("# ") {
            seen_header = true;
            continue;
        }

        let body = raw.trim_start_matches(' ');
        let spaces = raw.len() - body.len();
        if spaces % 2 != 0 {
            return Err(malformed("indentation must be a multiple of two spaces"));
        }
        let level = spaces / 2;
        let item = body
            .strip_prefix("- ")
            .ok_or_else(|| malformed("expected a `- ` bullet"))?
            .trim_end();

        if let Some(page) = parse_page(item) {
            let page = page.map_err(|reason| malformed(&reason))?;
            // A page sits one level below its trail.
            if level == 0 || level > open.len() {
                return Err(malformed("page is not nested under a trail"));
            }
            open.truncate(level);
            let owner = open[level - 1];
            outline[owner].pages.push(page);
            continue;
        }

        let (icon, name) =
            parse_trail(item).ok_or_else(|| malformed("expected `- <icon>[<name>]`"))?;
        if level > open.len() {
            return Err(malformed("trail is nested deeper than its parent"));
        }
        open.truncate(level);
        let parent = open.last().copied();
        outline.push(OutlineTrail {
            depth: level + 1,
            parent,
            icon,
            name,
            pages: Vec::new(),
        });
        open.push(outline.len() - 1);
    }

    Ok(outline)
}

fn parse_page(item: &str) -> Option<Result<OutlinePage, String>> {
    if !item.starts_with('[') || !item.ends_with(')') {
        return None;
    }
    let split = item.rfind("](")?;
    let title = &item[1..split];
    let address = &item[split + 2..item.len() - 1];
    Some(
        Url::parse(address)
            .map(|_| OutlinePage {
                title: title.to_string(),
                url: address.to_string(),
            })
            .map_err(|err| format!("invalid page url `{address}`: {err}")),
    )
}

fn parse_trail(item: &str) -> Option<(Option<String>, String)> {
    let open = item.find('[')?;
    let name = item.strip_suffix(']')?.get(open + 1..)?;
    let icon = &item[..open];
    let icon = (!icon.is_empty()).then(|| icon.to_string());
    Some((icon, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Brie Browser Trails\n\n- 🏠[Home]\n  - [Example](https://example.com/)\n  - [Child]\n    - [Deep](https://example.com/deep)\n- [Second]\n";

    #[test]
    fn parses_nested_outline() {
        let outline = parse_markdown(SAMPLE).unwrap();
        assert_eq!(outline.len(), 3);

        assert_eq!(outline[0].icon.as_deref(), Some("🏠"));
        assert_eq!(outline[0].name, "Home");
        assert_eq!(outline[0].parent, None);
        assert_eq!(outline[0].pages.len(), 1);
        assert_eq!(outline[0].pages[0].title, "Example");

        assert_eq!(outline[1].name, "Child");
        assert_eq!(outline[1].depth, 2);
        assert_eq!(outline[1].parent, Some(0));
        assert_eq!(outline[1].pages[0].url, "https://example.com/deep");

        assert_eq!(outline[2].name, "Second");
        assert_eq!(outline[2].parent, None);
        assert!(outline[2].icon.is_none());
    }

    #[test]
    fn page_title_may_contain_brackets() {
        let outline = parse_markdown("- [T]\n  - [a [b] c](https://example.com/x)\n").unwrap();
        assert_eq!(outline[0].pages[0].title, "a [b] c");
    }

    #[test]
    fn rejects_orphan_page() {
        let err = parse_markdown("# Title\n\n  - [Lost](https://example.com)\n").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MalformedImport {
                line: 3,
                reason: "page is not nested under a trail".into()
            }
        );
    }

    #[test]
    fn rejects_skipped_level_and_bad_url() {
        assert!(matches!(
            parse_markdown("- [A]\n    - [B]\n"),
            Err(ValidationError::MalformedImport { line: 2, .. })
        ));
        assert!(matches!(
            parse_markdown("- [A]\n  - [B](not a url)\n"),
            Err(ValidationError::MalformedImport { line: 2, .. })
        ));
        assert!(matches!(
            parse_markdown("plain text\n"),
            Err(ValidationError::MalformedImport { line: 1, .. })
        ));
    }
}
