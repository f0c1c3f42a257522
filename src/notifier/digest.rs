//! HTML digest rendering.

use std::fmt::Write;

use crate::models::CleanRecord;
use crate::utils::escape_html;

/// Fixed text around the article list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestTemplate {
    pub heading: String,
    pub greeting: String,
    pub intro: String,
    pub sign_off: String,
}

impl Default for DigestTemplate {
    fn default() -> Self {
        Self {
            heading: "🗞 Weekly Tech News Digest".to_string(),
            greeting: "Hello!".to_string(),
            intro: "Here are this week's top technology articles:".to_string(),
            sign_off: "Best,<br>The Automated News Bot 🤖".to_string(),
        }
    }
}

/// Render one HTML document with a list item per record, in the given order.
///
/// `sign_off` is inserted verbatim; every other string is escaped.
pub fn render_digest(records: &[CleanRecord], template: &DigestTemplate) -> String {
    let mut html = String::new();
    html.push_str("<html>\n<body style=\"font-family:Arial, sans-serif; color:#333;\">\n");
    html.push_str("<div style=\"background:#f5f5f5; padding:20px; border-radius:8px;\">\n");
    let _ = writeln!(html, "<h2 style=\"color:#0078D7;\">{}</h2>", escape_html(&template.heading));
    let _ = writeln!(html, "<p>{}</p>", escape_html(&template.greeting));
    let _ = writeln!(html, "<p>{}</p>", escape_html(&template.intro));
    html.push_str("<ul style=\"line-height:1.6;\">\n");
    for record in records {
        let _ = writeln!(
            html,
            "<li><a href=\"{}\" target=\"_blank\" style=\"color:#0078D7; text-decoration:none;\">{}</a><br>\
             <small>By {} — {}</small></li>",
            escape_html(&record.url),
            escape_html(&record.title),
            escape_html(&record.author),
            escape_html(&record.pub_date),
        );
    }
    html.push_str("</ul>\n");
    let _ = writeln!(html, "<p>{}</p>", template.sign_off);
    html.push_str("</div>\n</body>\n</html>\n");
    html
}
