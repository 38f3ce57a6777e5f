use crate::model::DetailFields;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use url::Url;

pub const DESCRIPTION_LIMIT: usize = 200;
pub const READ_MORE: &str = "...";

/// Phrases that mark the paragraph carrying the external apply link.
pub const MORE_INFO_PHRASES: &[&str] = &["for more information", "apply here", "apply now"];

/// Checked in this order; the first hit wins, so narrower regions come first.
pub const GAZETTEER: &[&str] = &["Kenya", "East Africa", "Africa", "Global", "Worldwide"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphField {
    Eligibility,
    Benefits,
    Category,
}

/// A whole-paragraph field: the first content paragraph containing any keyword.
#[derive(Debug, Clone, Copy)]
pub struct ParagraphRule {
    pub field: ParagraphField,
    pub keywords: &'static [&'static str],
}

pub const PARAGRAPH_RULES: &[ParagraphRule] = &[
    ParagraphRule {
        field: ParagraphField::Eligibility,
        keywords: &["eligibility", "who can apply", "eligible applicants"],
    },
    ParagraphRule {
        field: ParagraphField::Benefits,
        keywords: &["benefits", "what you get", "award", "prize"],
    },
    ParagraphRule {
        field: ParagraphField::Category,
        keywords: &["category"],
    },
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "table", "tr", "blockquote",
    "section", "figure", "br",
];

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("paragraph selector must parse"));
static BOLD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("strong, b").expect("bold selector must parse"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector must parse"));
static THUMBNAIL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("figure.image-link img").expect("thumbnail selector must parse"));
static TAG_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[rel~="category"], a[rel~="tag"]"#).expect("tag selector must parse")
});
static ENTRY_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.entry-content").expect("content selector must parse"));
static ARTICLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("article selector must parse"));

static DEADLINE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)deadline:\s*(.*)").expect("deadline regex must compile"));
static LEADING_DEADLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^deadline:\s*[^.]*\.?\s*").expect("leading deadline regex must compile")
});
static ORGANIZER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:organi[sz]ed\s+by|organi[sz]er\s*:|hosted\s+by)")
        .expect("organizer regex must compile")
});

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

static DATE_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?i)\b(?:{MONTHS})\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"),
        format!(r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS}),?\s+\d{{4}}\b"),
        r"\b\d{1,2}/\d{1,2}/\d{4}\b".to_string(),
        r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
    ]
    .iter()
    .map(|pat| Regex::new(pat).expect("date shape regex must compile"))
    .collect()
});

static GAZETTEER_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    GAZETTEER
        .iter()
        .map(|name| {
            let pattern = format!(r"\b{}\b", regex::escape(&name.to_lowercase()));
            (
                *name,
                Regex::new(&pattern).expect("gazetteer regex must compile"),
            )
        })
        .collect()
});

/// Runs every field rule over a detail page. Never fails: markup that does
/// not fit a rule leaves that field empty.
pub fn extract_detail(body: &str, detail_url: &str) -> DetailFields {
    let document = Html::parse_document(body);

    let mut fields = DetailFields {
        more_info_link: extract_more_info_link(&document, detail_url),
        deadline: extract_deadline(&document).map(|raw| normalize_deadline(&raw)),
        thumbnail: extract_thumbnail(&document, detail_url),
        tags: extract_tags(&document),
        ..DetailFields::default()
    };

    let Some(content) = main_content(&document) else {
        return fields;
    };

    let lines = content_lines(content);
    fields.description = extract_description(content);
    fields.organizer = extract_organizer(&lines);
    fields.location = detect_location(&lines.join(" "));

    for rule in PARAGRAPH_RULES {
        let value = first_paragraph_matching(content, rule.keywords);
        match rule.field {
            ParagraphField::Eligibility => fields.eligibility = value,
            ParagraphField::Benefits => fields.benefits = value,
            ParagraphField::Category => fields.category = value,
        }
    }

    fields
}

pub fn extract_more_info_link(document: &Html, detail_url: &str) -> Option<String> {
    document.select(&PARAGRAPH).find_map(|p| {
        let text = element_text(p).to_lowercase();
        if !MORE_INFO_PHRASES.iter().any(|phrase| text.contains(*phrase)) {
            return None;
        }
        p.select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map(|href| absolutize_url(Some(detail_url), href))
    })
}

/// Raw text following the first bolded `Deadline:` label.
pub fn extract_deadline(document: &Html) -> Option<String> {
    document.select(&PARAGRAPH).find_map(|p| {
        let bold = p
            .select(&BOLD)
            .map(element_text)
            .find(|text| DEADLINE_LABEL.is_match(text))?;

        capture_after_label(&bold).or_else(|| capture_after_label(&element_text(p)))
    })
}

fn capture_after_label(text: &str) -> Option<String> {
    DEADLINE_LABEL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Narrows a raw deadline to the first recognizable date substring, trying
/// month-day-year, day-month-year, d/m/y and ISO shapes in that order.
pub fn normalize_deadline(raw: &str) -> String {
    DATE_SHAPES
        .iter()
        .find_map(|re| re.find(raw))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub fn extract_thumbnail(document: &Html, detail_url: &str) -> Option<String> {
    let img = document.select(&THUMBNAIL).next()?;
    let src = img
        .value()
        .attr("src")
        .or_else(|| img.value().attr("data-src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())?;
    Some(absolutize_url(Some(detail_url), src))
}

pub fn extract_tags(document: &Html) -> Vec<String> {
    document
        .select(&TAG_LINK)
        .map(element_text)
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub fn main_content(document: &Html) -> Option<ElementRef<'_>> {
    document
        .select(&ENTRY_CONTENT)
        .next()
        .or_else(|| document.select(&ARTICLE).next())
}

/// First two direct-child paragraphs of the content block. Paragraphs nested
/// deeper are boilerplate and ignored.
pub fn extract_description(content: ElementRef<'_>) -> Option<String> {
    let paragraphs = content
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "p")
        .map(element_text)
        .filter(|text| !text.is_empty())
        .take(2)
        .collect::<Vec<_>>();

    // A bare "Deadline: 30th April, 2024" paragraph has no period, so the
    // clause is cut per paragraph before joining.
    let joined = paragraphs
        .iter()
        .enumerate()
        .map(|(idx, text)| match idx {
            0 => LEADING_DEADLINE.replace(text, "").trim().to_string(),
            _ => text.clone(),
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    shape_description(&joined)
}

/// Drops a leading `Deadline: ...` sentence and bounds the length.
pub fn shape_description(raw: &str) -> Option<String> {
    let stripped = LEADING_DEADLINE.replace(raw.trim(), "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return None;
    }

    if stripped.chars().count() <= DESCRIPTION_LIMIT {
        return Some(stripped.to_string());
    }

    let keep = DESCRIPTION_LIMIT - READ_MORE.chars().count();
    let head: String = stripped.chars().take(keep).collect();
    Some(format!("{}{READ_MORE}", head.trim_end()))
}

pub fn extract_organizer(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let label = ORGANIZER_LABEL.find(line)?;
        let rest = line[label.end()..]
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–'))
            .trim();
        (!rest.is_empty()).then(|| rest.to_string())
    })
}

pub fn detect_location(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    GAZETTEER_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&lowered))
        .map(|(name, _)| name.to_string())
}

fn first_paragraph_matching(content: ElementRef<'_>, keywords: &[&str]) -> Option<String> {
    content.select(&PARAGRAPH).find_map(|p| {
        let text = element_text(p);
        let lowered = text.to_lowercase();
        keywords
            .iter()
            .any(|kw| lowered.contains(*kw))
            .then_some(text)
    })
}

/// Content text broken into lines at block elements and `<br>`.
pub fn content_lines(content: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for node in content.descendants() {
        match node.value() {
            Node::Text(text) => {
                for (idx, piece) in text.split('\n').enumerate() {
                    if idx > 0 {
                        flush_line(&mut lines, &mut current);
                    }
                    current.push_str(piece);
                    current.push(' ');
                }
            }
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => {
                flush_line(&mut lines, &mut current);
            }
            _ => {}
        }
    }
    flush_line(&mut lines, &mut current);

    lines
}

fn flush_line(lines: &mut Vec<String>, current: &mut String) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

/// Text nodes concatenated as rendered, whitespace runs collapsed. Inline
/// markup such as `30<sup>th</sup>` stays one word.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn absolutize_url(base_url: Option<&str>, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }

    if let Some(base) = base_url
        && let Ok(base_url) = Url::parse(base)
        && let Ok(joined) = base_url.join(value)
    {
        return joined.to_string();
    }

    value.to_string()
}
