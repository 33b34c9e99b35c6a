use regex::Regex;
use std::sync::OnceLock;

struct CleanPatterns {
    selection_marks: Regex,
    plus_runs: Regex,
    nav_tokens: Regex,
    decorations: Regex,
    dot_runs: Regex,
    slash_runs: Regex,
    email_spacing: Regex,
    inline_space: Regex,
    line_edges: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static CleanPatterns {
    static PATTERNS: OnceLock<CleanPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CleanPatterns {
        selection_marks: Regex::new(r"(?i):(un)?selected:").expect("static pattern"),
        plus_runs: Regex::new(r"\+\+").expect("static pattern"),
        nav_tokens: Regex::new(
            r"(?i)\b(ACCESS|KARRIERE|NEWS|NEUIGKEITEN|ENGLISH|DEUTSCH|KONTAKT|ÜBER\s+UNS|FORSCHUNG\s*&\s*ENTWICKLUNG|DIENSTLEISTUNGEN\s*&\s*PRODUKTE|PRODUKTE|IMPRESSUM)\b",
        )
        .expect("static pattern"),
        decorations: Regex::new(r"[-•=]{2,}|[_*~#]{3,}").expect("static pattern"),
        dot_runs: Regex::new(r"\.{3,}").expect("static pattern"),
        slash_runs: Regex::new(r"[\\|/]{2,}").expect("static pattern"),
        email_spacing: Regex::new(r"([A-Za-z0-9_.+-]+@[A-Za-z0-9-]+\.[A-Za-z0-9-.]+)\s*")
            .expect("static pattern"),
        inline_space: Regex::new(r"[ \t]+").expect("static pattern"),
        line_edges: Regex::new(r"[ \t]*\n[ \t]*").expect("static pattern"),
        blank_lines: Regex::new(r"\n{2,}").expect("static pattern"),
    })
}

/// Strips extraction noise from document text before chunking.
///
/// Removes selection-mark artifacts, navigation boilerplate tokens, and
/// decoration runs, then collapses repeated blank lines and inline
/// whitespace. Newlines survive so chunk boundary search still sees them.
/// Idempotent: `clean_text(clean_text(x)) == clean_text(x)`.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let p = patterns();
    let t = p.selection_marks.replace_all(text, "");
    let t = p.nav_tokens.replace_all(&t, "");
    let t = p.plus_runs.replace_all(&t, "");
    let t = p.decorations.replace_all(&t, "");
    let t = p.dot_runs.replace_all(&t, "...");
    let t = p.slash_runs.replace_all(&t, "");
    let t = p.email_spacing.replace_all(&t, "$1 ");
    let t = p.inline_space.replace_all(&t, " ");
    let t = p.line_edges.replace_all(&t, "\n");
    let t = p.blank_lines.replace_all(&t, "\n");
    t.trim().to_string()
}
