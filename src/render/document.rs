use crate::corpus::{RenderUnit, Variant};
use crate::page::PageNumber;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use tempfile::NamedTempFile;

const SUMMARY_SEPARATOR: &str = " • ";

/// Attribute the document sets on `<html>` with its laid-out height in pixels.
pub const PAGE_HEIGHT_ATTR: &str = "data-page-height";

/// Distinct surah names on the page, sorted and joined.
pub fn summary_label(units: &[RenderUnit]) -> String {
    let names: BTreeSet<&str> = units.iter().map(|u| u.group_name.as_str()).collect();
    names.into_iter().collect::<Vec<_>>().join(SUMMARY_SEPARATOR)
}

/// Self-contained HTML for one page. Lives only for a single render attempt.
#[derive(Debug, Clone)]
pub struct RenderDocument {
    pub page: PageNumber,
    pub summary: String,
    pub html: String,
}

impl RenderDocument {
    pub fn build(page: PageNumber, units: &[RenderUnit], variant: Variant) -> Self {
        let summary = summary_label(units);

        let mut body = String::new();
        for unit in units {
            body.push_str(&verse_block(unit, variant));
        }

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<style>
body {{ margin: 0; padding: 0; background: #000000; color: white; }}
.sheet {{ background: #000000; padding: 40px; width: 2000px; max-width: 100%; margin: 20px 20px 20px 0; }}
.header {{ text-align: center; margin-bottom: 20px; padding: 15px; background: #1a1a1a; border-radius: 8px; border: 2px solid white; }}
.header h1 {{ margin: 0; font-family: 'Inter', 'Segoe UI', Roboto, Arial, sans-serif; font-size: 24px; }}
.header h2 {{ margin: 5px 0 0 0; font-family: 'Inter', 'Segoe UI', Roboto, Arial, sans-serif; font-size: 18px; color: #cccccc; font-weight: normal; }}
.verse {{ margin: 30px 0; }}
.arabic {{ direction: rtl; text-align: right; font-family: 'Amiri', 'Scheherazade New', 'Times New Roman', serif; font-size: 72px; line-height: 3.2; }}
.marker {{ color: #cccccc; font-size: .4em; margin-left: 25px; }}
.translation {{ font-family: 'Inter', 'Segoe UI', Roboto, Arial, sans-serif; font-size: 32px; color: #dddddd; line-height: 1.5; }}
</style>
</head>
<body>
<div class="sheet">
<div class="header">
<h1>Page {page}</h1>
<h2>{summary}</h2>
</div>
{body}</div>
<script>
document.documentElement.setAttribute("{height_attr}", Math.ceil(Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)));
</script>
</body>
</html>
"#,
            page = page,
            summary = escape_html(&summary),
            body = body,
            height_attr = PAGE_HEIGHT_ATTR,
        );

        Self {
            page,
            summary,
            html,
        }
    }

    /// Writes the document to a temp file that is removed when dropped.
    pub fn materialize(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("murajaah_page_{}_", self.page))
            .suffix(".html")
            .tempfile()
            .context("Failed to create temporary render document")?;
        file.write_all(self.html.as_bytes())
            .context("Failed to write temporary render document")?;
        file.flush()?;
        Ok(file)
    }
}

fn verse_block(unit: &RenderUnit, variant: Variant) -> String {
    let mut block = format!(
        "<div class=\"verse\"><div class=\"arabic\">{} <span class=\"marker\">{}</span></div>",
        escape_html(&unit.text),
        unit.in_group_seq
    );
    if variant == Variant::Translation {
        if let Some(translation) = &unit.translation {
            block.push_str(&format!(
                "<div class=\"translation\">{}</div>",
                escape_html(translation)
            ));
        }
    }
    block.push_str("</div>\n");
    block
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
