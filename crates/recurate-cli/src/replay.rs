//! Scripted sessions.
//!
//! A script is JSONL, one command per line:
//!
//! ```text
//! {"cmd":"adopt","markdown":"Use **Rust** here.","messageId":"m1"}
//! {"cmd":"annotate","kind":"highlight","start":4,"end":8}
//! {"cmd":"older"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use miette::{IntoDiagnostic, Result, WrapErr, miette};
use recurate_core::{
    AdoptOutcome, AnnotationId, AnnotationKind, Fragment, Response, ResponseSession,
};
use serde::Deserialize;
use smol_str::SmolStr;

use crate::markdown::render_markdown;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Offer a response. Either `html` or `markdown` must be set.
    #[serde(rename_all = "camelCase")]
    Adopt {
        #[serde(default)]
        html: Option<String>,
        #[serde(default)]
        markdown: Option<String>,
        /// Plain text. Derived from the markup when absent.
        #[serde(default)]
        text: Option<String>,
        message_id: SmolStr,
    },
    /// Select raw offsets and annotate them.
    Annotate {
        kind: AnnotationKind,
        start: usize,
        end: usize,
    },
    Select {
        index: usize,
    },
    Remove {
        id: AnnotationId,
    },
    Clear,
    Older,
    Newer,
}

impl Command {
    /// Apply to `session`. `Ok(false)` when the command changed nothing.
    pub fn apply(self, session: &mut ResponseSession) -> Result<bool> {
        match self {
            Command::Adopt {
                html,
                markdown,
                text,
                message_id,
            } => {
                let html = match (html, markdown) {
                    (Some(html), _) => html,
                    (None, Some(markdown)) => render_markdown(&markdown),
                    (None, None) => {
                        return Err(miette!("adopt {} needs html or markdown", message_id));
                    }
                };
                let text = text.unwrap_or_else(|| Fragment::parse(&html).text_content());
                let outcome = session.adopt_response(Response::new(html, text, message_id));
                Ok(outcome == AdoptOutcome::Adopted)
            }
            Command::Annotate { kind, start, end } => {
                let Some(sample) = session.sample_selection(start, end, None) else {
                    tracing::warn!(start, end, "selection resolves to nothing");
                    return Ok(false);
                };
                match session.add_annotation(kind, &sample) {
                    Some(id) => {
                        tracing::info!(annotation = %id, %kind, text = %sample.text, "annotated");
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Command::Select { index } => Ok(session.select(index)),
            Command::Remove { id } => Ok(session.remove_annotation(&id)),
            Command::Clear => {
                let had = session.has_annotations();
                session.clear_annotations();
                Ok(had)
            }
            Command::Older => Ok(session.go_older()),
            Command::Newer => Ok(session.go_newer()),
        }
    }
}

/// Parse a script into commands.
pub fn parse_script(script: &str) -> Result<Vec<Command>> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line)
                .into_diagnostic()
                .wrap_err_with(|| format!("script line {}", n + 1))
        })
        .collect()
}

/// Run every command of `script` against `session`. Returns how many changed it.
pub fn run_script(session: &mut ResponseSession, script: &str) -> Result<usize> {
    let mut changed = 0;
    for command in parse_script(script)? {
        tracing::debug!(?command, "replay");
        if command.apply(session)? {
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recurate_core::SessionConfig;

    const SCRIPT: &str = r#"
# two responses, annotate the older one
{"cmd":"adopt","html":"<p>First answer about parsers.</p>","messageId":"m1"}
{"cmd":"adopt","markdown":"Second answer with **bold** claims.","messageId":"m2"}
{"cmd":"annotate","kind":"verify","start":25,"end":28}
{"cmd":"older"}
{"cmd":"annotate","kind":"highlight","start":20,"end":22}
"#;

    #[test]
    fn test_replay_rolling() {
        let mut session = ResponseSession::new(SessionConfig::rolling());
        let changed = run_script(&mut session, SCRIPT).unwrap();
        assert_eq!(changed, 5);
        assert_eq!(session.position(), Some((1, 2)));
        insta::assert_snapshot!(session.feedback_text(), @r#"
        [Feedback on your previous response]

        KEEP — I found these points valuable:
        - "parsers."

        [Your message below]
        "#);
        insta::assert_snapshot!(
            session.current_overlay_markup(),
            @r#"<p>First answer about <mark class="annotation-highlight" data-annotation-id="a-1" data-annotation-kind="highlight">parsers.</mark></p>"#
        );

        assert!(session.go_newer());
        assert_eq!(session.annotations()[0].source_text, "claims.");
    }

    #[test]
    fn test_no_op_commands() {
        let mut session = ResponseSession::default();
        let changed = run_script(
            &mut session,
            r#"{"cmd":"older"}
{"cmd":"clear"}
{"cmd":"annotate","kind":"strikethrough","start":0,"end":3}"#,
        )
        .unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = parse_script("{\"cmd\":\"clear\"}\n{\"cmd\":\"explode\"}").unwrap_err();
        assert!(format!("{err}").contains("line 2"));
    }

    #[test]
    fn test_adopt_needs_markup() {
        let mut session = ResponseSession::default();
        let err = run_script(&mut session, r#"{"cmd":"adopt","messageId":"m1"}"#);
        assert!(err.is_err());
    }
}
