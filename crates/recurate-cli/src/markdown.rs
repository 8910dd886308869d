//! Markdown to HTML for transcript responses.
//!
//! Responses in a transcript are markdown. The panel needs the rendered
//! markup, so render it the way a chat UI would: plain semantic HTML,
//! no ids or embeds.

use markdown_weaver::{Options, Parser};

pub fn md_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_GFM
}

/// Render `markdown` to an HTML fragment.
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, md_options());

    let mut html_buf = String::with_capacity(markdown.len() * 3 / 2);
    markdown_weaver::html::push_html(&mut html_buf, parser);
    html_buf
}
