/*
 * format/plain.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Built-in plain reference style.
 */

//! Built-in plain reference style.
//!
//! Renders a record straight from its fields, in the manner of the classic
//! `plain` BibTeX style. Markdown is the usual target:
//!
//! ```text
//! First Author and Second Author. Test title. *Testing Journal*, 2019.
//! ```
//!
//! The HTML target fills the cells of the link-style bibliography table,
//! where Markdown would not be rendered:
//!
//! ```text
//! First Author and Second Author. Test title. <em>Testing Journal</em>, 2019.
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::bibliography::{BibliographyRecord, Name};

static URL_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\url\{([^}]*)\}").expect("Invalid regex pattern for \\url"));

static PAGE_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-+\s*").expect("Invalid regex pattern for page dash"));

/// Output markup of the plain style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Markdown,
    Html,
}

impl Markup {
    fn emph(self, text: &str) -> String {
        match self {
            Markup::Markdown => format!("*{text}*"),
            Markup::Html => format!("<em>{text}</em>"),
        }
    }

    fn link(self, text: &str, url: &str) -> String {
        match self {
            Markup::Markdown => format!("[{text}]({url})"),
            Markup::Html => format!("<a href=\"{}\">{text}</a>", url.replace('"', "&quot;")),
        }
    }

    fn escape(self, text: &str) -> Cow<'_, str> {
        match self {
            Markup::Html if text.contains(['&', '<', '>']) => Cow::Owned(
                text.replace('&', "&amp;")
                    .replace('<', "&lt;")
                    .replace('>', "&gt;"),
            ),
            _ => Cow::Borrowed(text),
        }
    }

    /// Text with its trailing emphasis markup removed.
    fn strip_emph(self, text: &str) -> &str {
        match self {
            Markup::Markdown => text.trim_end_matches('*'),
            Markup::Html => text.strip_suffix("</em>").unwrap_or(text),
        }
    }
}

/// Format `record` as one line of Markdown.
pub fn format_record(record: &BibliographyRecord) -> String {
    format_record_as(record, Markup::Markdown)
}

/// Format `record` as one line in `markup`.
pub fn format_record_as(record: &BibliographyRecord, markup: Markup) -> String {
    Plain { record, markup }.render()
}

struct Plain<'r> {
    record: &'r BibliographyRecord,
    markup: Markup,
}

impl Plain<'_> {
    fn render(&self) -> String {
        let markup = self.markup;
        let mut blocks: Vec<String> = Vec::new();

        if let Some(names) = self.names_block() {
            blocks.push(self.sentence(&names));
        }

        let title = self.field("title");
        match self.record.entry_type.as_str() {
            "article" => {
                self.push_title(&mut blocks, title.as_deref(), false);
                let mut venue = self
                    .field("journal")
                    .map(|journal| markup.emph(&journal))
                    .unwrap_or_default();
                let volume = self.field("volume");
                let pages = self.field("pages").map(|p| dashify(&p));
                if let Some(volume) = &volume {
                    append(&mut venue, ", ", volume);
                    if let Some(number) = self.field("number") {
                        venue.push_str(&format!("({number})"));
                    }
                    if let Some(pages) = &pages {
                        venue.push_str(&format!(":{pages}"));
                    }
                } else if let Some(pages) = &pages {
                    append(&mut venue, ", ", &format!("pages {pages}"));
                }
                if let Some(year) = self.field("year") {
                    append(&mut venue, ", ", &year);
                }
                if !venue.is_empty() {
                    blocks.push(self.sentence(&venue));
                }
            }
            "book" | "booklet" => {
                self.push_title(&mut blocks, title.as_deref(), true);
                self.push_joined(&mut blocks, &["publisher", "address", "year"]);
            }
            "inproceedings" | "incollection" | "conference" => {
                self.push_title(&mut blocks, title.as_deref(), false);
                if let Some(booktitle) = self.field("booktitle") {
                    let mut within = format!("In {}", markup.emph(&booktitle));
                    if let Some(pages) = self.field("pages") {
                        within.push_str(&format!(", pages {}", dashify(&pages)));
                    }
                    blocks.push(self.sentence(&within));
                }
                self.push_joined(&mut blocks, &["publisher", "address", "year"]);
            }
            "phdthesis" | "mastersthesis" | "thesis" => {
                self.push_title(&mut blocks, title.as_deref(), false);
                let kind = match self.record.entry_type.as_str() {
                    "mastersthesis" => "Master's thesis",
                    _ => "PhD thesis",
                };
                let mut tail = kind.to_string();
                for name in ["school", "address", "year"] {
                    if let Some(value) = self.field(name) {
                        append(&mut tail, ", ", &value);
                    }
                }
                blocks.push(self.sentence(&tail));
            }
            "techreport" | "report" => {
                self.push_title(&mut blocks, title.as_deref(), false);
                let mut tail = match self.field("number") {
                    Some(number) => format!("Technical Report {number}"),
                    None => "Technical Report".to_string(),
                };
                for name in ["institution", "address", "year"] {
                    if let Some(value) = self.field(name) {
                        append(&mut tail, ", ", &value);
                    }
                }
                blocks.push(self.sentence(&tail));
            }
            _ => {
                self.push_title(&mut blocks, title.as_deref(), false);
                self.push_joined(&mut blocks, &["howpublished", "note", "year"]);
            }
        }

        if let Some(doi) = self.field("doi") {
            let link = markup.link(&format!("doi:{doi}"), &format!("https://doi.org/{doi}"));
            blocks.push(self.sentence(&link));
        }
        if let Some(url) = self.field("url") {
            blocks.push(self.sentence(&format!("URL: {}", markup.link(&url, &url))));
        }

        blocks.join(" ")
    }

    /// Authors, or editors when there are no authors.
    fn names_block(&self) -> Option<String> {
        let record = self.record;
        if !record.authors.is_empty() {
            return Some(self.join_names(&record.authors));
        }
        match record.editors.len() {
            0 => None,
            1 => Some(format!("{}, editor", self.join_names(&record.editors))),
            _ => Some(format!("{}, editors", self.join_names(&record.editors))),
        }
    }

    fn join_names(&self, names: &[Name]) -> String {
        let names: Vec<String> = names
            .iter()
            .map(|name| self.markup.escape(&name.to_string()).into_owned())
            .collect();
        match names.as_slice() {
            [] => String::new(),
            [one] => one.clone(),
            [first, second] => format!("{first} and {second}"),
            [init @ .., last] => format!("{}, and {last}", init.join(", ")),
        }
    }

    /// A field value with TeX leftovers removed, escaped for the markup.
    fn field(&self, name: &str) -> Option<String> {
        let value = self.record.field(name)?;
        let value = URL_COMMAND.replace_all(value, "$1");
        let cleaned: String = value.chars().filter(|c| !matches!(c, '{' | '}')).collect();
        let cleaned = cleaned.trim();
        (!cleaned.is_empty()).then(|| self.markup.escape(cleaned).into_owned())
    }

    fn push_title(&self, blocks: &mut Vec<String>, title: Option<&str>, emphasize: bool) {
        if let Some(title) = title {
            if emphasize {
                blocks.push(self.sentence(&self.markup.emph(title)));
            } else {
                blocks.push(self.sentence(title));
            }
        }
    }

    fn push_joined(&self, blocks: &mut Vec<String>, names: &[&str]) {
        let values: Vec<String> = names.iter().filter_map(|n| self.field(n)).collect();
        if !values.is_empty() {
            blocks.push(self.sentence(&values.join(", ")));
        }
    }

    /// Terminate with a period unless the text already ends a sentence.
    fn sentence(&self, text: &str) -> String {
        let text = text.trim();
        if self.markup.strip_emph(text).ends_with(['.', '?', '!']) {
            text.to_string()
        } else {
            format!("{text}.")
        }
    }
}

fn dashify(pages: &str) -> String {
    PAGE_DASH.replace_all(pages, "–").into_owned()
}

fn append(target: &mut String, separator: &str, value: &str) {
    if !target.is_empty() {
        target.push_str(separator);
    }
    target.push_str(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn name(given: &str, family: &str) -> Name {
        Name {
            given: given.into(),
            family: family.into(),
            ..Default::default()
        }
    }

    fn record(entry_type: &str, fields: &[(&str, &str)], authors: Vec<Name>) -> BibliographyRecord {
        let fields: IndexMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BibliographyRecord {
            key: "key".into(),
            entry_type: entry_type.into(),
            bibtex_fields: fields.clone(),
            fields,
            authors,
            editors: Vec::new(),
            origin: "test.bib".into(),
        }
    }

    fn two_authors() -> Vec<Name> {
        vec![name("First", "Author"), name("Second", "Author")]
    }

    #[test]
    fn test_simple_article() {
        let r = record(
            "article",
            &[
                ("title", "Test title"),
                ("journal", "Testing Journal"),
                ("year", "2019"),
            ],
            two_authors(),
        );
        assert_eq!(
            format_record(&r),
            "First Author and Second Author. Test title. *Testing Journal*, 2019."
        );
    }

    #[test]
    fn test_article_with_volume_pages_and_doi() {
        let r = record(
            "article",
            &[
                ("title", "Evidence for selective attention in the insect brain"),
                ("journal", "Current Opinion in Insect Science"),
                ("volume", "15"),
                ("pages", "1--7"),
                ("year", "2016"),
                ("doi", "10.1016/j.cois.2016.02.007"),
            ],
            vec![
                name("Benjamin L.", "De Bivort"),
                name("Bruno", "Van Swinderen"),
            ],
        );
        assert_eq!(
            format_record(&r),
            "Benjamin L. De Bivort and Bruno Van Swinderen. Evidence for selective attention in the insect brain. *Current Opinion in Insect Science*, 15:1–7, 2016. [doi:10.1016/j.cois.2016.02.007](https://doi.org/10.1016/j.cois.2016.02.007)."
        );
    }

    #[test]
    fn test_url_command_is_unwrapped() {
        let r = record(
            "article",
            &[
                ("title", "Test Title (TT)"),
                ("journal", "Testing Journal (TJ)"),
                ("year", "2019"),
                ("url", "\\url{https://doi.org/10.21577/0103-5053.20190253}"),
            ],
            two_authors(),
        );
        assert_eq!(
            format_record(&r),
            "First Author and Second Author. Test Title (TT). *Testing Journal (TJ)*, 2019. URL: [https://doi.org/10.21577/0103-5053.20190253](https://doi.org/10.21577/0103-5053.20190253)."
        );
    }

    #[test]
    fn test_book() {
        let r = record(
            "book",
            &[
                ("title", "The TeXbook"),
                ("publisher", "Addison-Wesley"),
                ("address", "Reading, MA"),
                ("year", "1984"),
            ],
            vec![name("Donald E.", "Knuth")],
        );
        assert_eq!(
            format_record(&r),
            "Donald E. Knuth. *The TeXbook*. Addison-Wesley, Reading, MA, 1984."
        );
    }

    #[test]
    fn test_inproceedings() {
        let r = record(
            "inproceedings",
            &[
                ("title", "A paper"),
                ("booktitle", "Proceedings of Things"),
                ("pages", "10-20"),
                ("publisher", "ACM"),
                ("year", "2020"),
            ],
            vec![name("A.", "One"), name("B.", "Two"), name("C.", "Three")],
        );
        assert_eq!(
            format_record(&r),
            "A. One, B. Two, and C. Three. A paper. In *Proceedings of Things*, pages 10–20. ACM, 2020."
        );
    }

    #[test]
    fn test_misc_with_editors_and_question_title() {
        let mut r = record(
            "misc",
            &[("title", "Why cite?"), ("howpublished", "Online"), ("year", "2021")],
            Vec::new(),
        );
        r.editors = vec![name("Ed", "Itor")];
        assert_eq!(
            format_record(&r),
            "Ed Itor, editor. Why cite? Online, 2021."
        );
    }

    #[test]
    fn test_html_markup() {
        let r = record(
            "article",
            &[
                ("title", "Fish & chips"),
                ("journal", "Testing Journal"),
                ("year", "2019"),
                ("doi", "10.1/x"),
            ],
            two_authors(),
        );
        assert_eq!(
            format_record_as(&r, Markup::Html),
            "First Author and Second Author. Fish &amp; chips. <em>Testing Journal</em>, 2019. <a href=\"https://doi.org/10.1/x\">doi:10.1/x</a>."
        );

        let book = record("book", &[("title", "Why?")], Vec::new());
        assert_eq!(format_record_as(&book, Markup::Html), "<em>Why?</em>");
    }

    #[test]
    fn test_thesis() {
        let r = record(
            "phdthesis",
            &[("title", "Deep things"), ("school", "MIT"), ("year", "2001")],
            vec![name("Some", "Student")],
        );
        assert_eq!(
            format_record(&r),
            "Some Student. Deep things. PhD thesis, MIT, 2001."
        );
    }
}
