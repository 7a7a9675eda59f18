use scraper::{Html, Selector};

/// Main text and page metadata pulled out of an HTML document.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub text: String,
    pub word_count: i32,
}

/// Extract readable text and metadata from an HTML document.
///
/// Text extraction removes script, style, nav, footer, header and similar
/// chrome elements, then collapses whitespace.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let author = extract_meta(
        &document,
        &["meta[name=\"author\"]", "meta[property=\"article:author\"]"],
    );
    let published_date = extract_meta(
        &document,
        &[
            "meta[property=\"article:published_time\"]",
            "meta[name=\"date\"]",
            "meta[name=\"publish-date\"]",
        ],
    )
    .or_else(|| extract_time_datetime(&document));

    let text = extract_main_text(&document);
    let word_count = text.split_whitespace().count() as i32;

    ExtractedPage {
        title,
        author,
        published_date,
        text,
        word_count,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    // og:title tends to be cleaner than <title> (no site-name suffix).
    if let Some(og) = extract_meta(document, &["meta[property=\"og:title\"]"]) {
        return Some(og);
    }

    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_meta(document: &Html, selectors: &[&str]) -> Option<String> {
    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(content) = document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("content"))
            {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

fn extract_time_datetime(document: &Html) -> Option<String> {
    let selector = Selector::parse("time[datetime]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collect text from the document, skipping non-content elements.
fn extract_main_text(document: &Html) -> String {
    let remove_selectors = [
        "script", "style", "nav", "footer", "header", "noscript", "svg", "aside", "form",
    ];

    let mut skip_ids = std::collections::HashSet::new();

    for sel_str in &remove_selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            for element in document.select(&selector) {
                skip_ids.insert(element.id());
            }
        }
    }

    let mut text_parts = Vec::new();

    for node in document.tree.nodes() {
        // Skip if this node or any ancestor is in the skip set.
        let mut should_skip = false;
        let mut check_id = Some(node.id());
        while let Some(id) = check_id {
            if skip_ids.contains(&id) {
                should_skip = true;
                break;
            }
            check_id = document
                .tree
                .get(id)
                .and_then(|n| n.parent())
                .map(|p| p.id());
        }

        if should_skip {
            continue;
        }

        if let Some(text) = node.value().as_text() {
            let trimmed = text.text.trim();
            if !trimmed.is_empty() {
                text_parts.push(trimmed.to_string());
            }
        }
    }

    collapse_whitespace(&text_parts.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
        <head>
            <title>A Post — Some Blog</title>
            <meta property="og:title" content="A Post">
            <meta name="author" content="Jordan Writer">
            <meta property="article:published_time" content="2024-05-01T09:00:00Z">
        </head>
        <body>
            <nav>Home About Contact</nav>
            <article>
                <h1>A Post</h1>
                <p>This is the main content of the article.</p>
                <p>Second paragraph with more information.</p>
            </article>
            <footer>Copyright</footer>
            <script>alert('bad');</script>
        </body>
        </html>
    "#;

    #[test]
    fn test_extracts_main_text_only() {
        let page = extract_page(PAGE);
        assert!(page.text.contains("main content"));
        assert!(page.text.contains("Second paragraph"));
        assert!(!page.text.contains("Home About"));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("alert"));
    }

    #[test]
    fn test_extracts_metadata() {
        let page = extract_page(PAGE);
        assert_eq!(page.title.as_deref(), Some("A Post"));
        assert_eq!(page.author.as_deref(), Some("Jordan Writer"));
        assert_eq!(
            page.published_date.as_deref(),
            Some("2024-05-01T09:00:00Z")
        );
    }

    #[test]
    fn test_word_count() {
        let page = extract_page("<html><body><p>one two three</p></body></html>");
        assert_eq!(page.word_count, 3);
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let page = extract_page("<html><head><title>Only Title</title></head><body><p>x</p></body></html>");
        assert_eq!(page.title.as_deref(), Some("Only Title"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("hello   world"), "hello world");
        assert_eq!(collapse_whitespace("  a\n\n  b  "), "a b");
    }
}
