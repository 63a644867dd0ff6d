// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Body and subject formatting for email.

/// Wrap width for HTML-to-text conversion.
const TEXT_WIDTH: usize = 100;

/// Subject used when the inbound message had none.
pub const DEFAULT_SUBJECT: &str = "Agent Response";

/// Renders runner markdown as an HTML email body.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = comrak::Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    comrak::markdown_to_html(markdown, &options)
}

/// Flattens an HTML body to plain text. Falls back to the raw input if the
/// HTML cannot be read.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| html.to_string())
}

/// Builds the subject of a reply, adding a single `Re:` prefix.
pub fn reply_subject(subject: &str, is_reply: bool) -> String {
    let subject = subject.trim();
    let subject = if subject.is_empty() {
        DEFAULT_SUBJECT
    } else {
        subject
    };
    let already = subject
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("re:"));
    if is_reply && !already {
        format!("Re: {subject}")
    } else {
        subject.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Q3 report", true), "Re: Q3 report");
        assert_eq!(reply_subject("RE: Q3 report", true), "RE: Q3 report");
        assert_eq!(reply_subject("Q3 report", false), "Q3 report");
        assert_eq!(reply_subject("  ", true), "Re: Agent Response");
    }

    #[test]
    fn markdown_renders_to_html() {
        let html = markdown_to_html("# Summary\n\n**done** and ~~dropped~~");
        assert!(html.contains("<h1>Summary</h1>"));
        assert!(html.contains("<strong>done</strong>"));
        assert!(html.contains("<del>dropped</del>"));
    }

    #[test]
    fn html_flattens_to_text() {
        let text = html_to_text("<div><p>First</p><p>Second</p></div>");
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
        assert!(!text.contains('<'));
    }
}
