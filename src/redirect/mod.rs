//! Redirect rule emitter
//!
//! Renders `moved` events as permanent (301) redirects:
//!
//! ```text
//! # Generated URL Redirects
//! # Generated: 2024-05-01T12:00:00Z
//! # Total redirects: 1
//!
//! RewriteEngine On                          ← Apache only
//!
//! # x.png
//! RewriteRule ^a/x\.png$ /b/x.png [R=301,L] ← Apache
//!
//! # x.png
//! location = /a/x.png {                     ← Nginx
//!     return 301 /b/x.png;
//! }
//! ```
//!
//! Output is a pure function of the events, dialect and timestamp.

use crate::error::{StoreError, StoreResult};
use crate::inventory::format_instant;
use crate::reconcile::MoveEvent;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Web server rule syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `mod_rewrite` rules for `.htaccess`
    Apache,
    /// `location` blocks
    Nginx,
}

impl Dialect {
    /// Suffix of the generated file
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Apache => "htaccess",
            Dialect::Nginx => "nginx.conf",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Apache => "Apache",
            Dialect::Nginx => "Nginx",
        }
    }
}

/// What `emit` (or a mapping export) did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// No events, no file written
    NothingToEmit,
    /// File written with this many rules
    Written { rules: usize },
}

/// Render rules for every event
pub fn render(events: &[MoveEvent], dialect: Dialect, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(out, "# Generated URL Redirects");
    let _ = writeln!(out, "# Generated: {}", format_instant(generated_at));
    let _ = writeln!(out, "# Total redirects: {}", events.len());
    out.push('\n');

    if events.is_empty() {
        return out;
    }

    if dialect == Dialect::Apache {
        out.push_str("RewriteEngine On\n\n");
    }

    for event in events {
        let _ = writeln!(out, "# {}", single_line(&event.filename));
        match dialect {
            Dialect::Apache => {
                let pattern = format!("^{}$", regex::escape(event.old_path.trim_start_matches('/')));
                let _ = writeln!(
                    out,
                    "RewriteRule {} {} [R=301,L]",
                    apache_arg(&pattern),
                    apache_arg(&apache_target(&event.new_path))
                );
            }
            Dialect::Nginx => {
                let _ = writeln!(out, "location = {} {{", nginx_arg(&event.old_path));
                let _ = writeln!(
                    out,
                    "    return 301 {};",
                    nginx_arg(&event.new_path.replace('$', "%24"))
                );
                out.push_str("}\n");
            }
        }
        out.push('\n');
    }

    out
}

/// Write rules to `path`; an empty event list writes nothing
pub fn emit(
    events: &[MoveEvent],
    dialect: Dialect,
    generated_at: DateTime<Utc>,
    path: &Path,
) -> StoreResult<EmitOutcome> {
    if events.is_empty() {
        return Ok(EmitOutcome::NothingToEmit);
    }

    let text = render(events, dialect, generated_at);
    fs::write(path, text).map_err(|e| StoreError::io(path, e))?;

    debug!(
        "Wrote {} {} redirect(s) to {}",
        events.len(),
        dialect.name(),
        path.display()
    );
    Ok(EmitOutcome::Written {
        rules: events.len(),
    })
}

/// Characters that end or alter an unquoted nginx argument
const NGINX_SPECIAL: &[char] = &['"', '\'', ';', '{', '}', '$', '#', '\\'];

/// Double-quote an Apache argument that contains whitespace or quotes
///
/// Apache only unescapes `\"` inside quotes, so other backslashes stay as written.
fn apache_arg(arg: &str) -> String {
    if arg.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Substitution path with `$` and `%` taken literally
fn apache_target(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
        .replace('$', "\\$")
        .replace('%', "\\%")
}

/// Double-quote an nginx argument that contains whitespace or syntax characters
fn nginx_arg(arg: &str) -> String {
    if arg.chars().any(|c| c.is_whitespace() || NGINX_SPECIAL.contains(&c)) {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::MoveStatus;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn event(old: &str, new: &str) -> MoveEvent {
        MoveEvent {
            old_url: old.into(),
            new_url: new.into(),
            old_path: old.into(),
            new_path: new.into(),
            filename: new.rsplit('/').next().unwrap_or(new).into(),
            size: 1,
            hash: "h".into(),
            status: MoveStatus::Moved,
        }
    }

    #[test]
    fn test_apache_rules() {
        let text = render(&[event("/a/x.png", "/b/x.png")], Dialect::Apache, at());
        assert_eq!(
            text,
            "# Generated URL Redirects\n\
             # Generated: 2024-05-01T12:00:00Z\n\
             # Total redirects: 1\n\
             \n\
             RewriteEngine On\n\
             \n\
             # x.png\n\
             RewriteRule ^a/x\\.png$ /b/x.png [R=301,L]\n\
             \n"
        );
    }

    #[test]
    fn test_nginx_rules() {
        let text = render(&[event("/a/x.png", "/b/x.png")], Dialect::Nginx, at());
        assert!(text.ends_with(
            "# x.png\n\
             location = /a/x.png {\n    return 301 /b/x.png;\n}\n\n"
        ));
        assert!(!text.contains("RewriteEngine"));
    }

    #[test]
    fn test_whitespace_arguments_quoted() {
        let events = [event("/a/hero banner.png", "/b/hero banner.png")];

        let apache = render(&events, Dialect::Apache, at());
        assert!(apache.contains("RewriteRule \"^a/hero banner\\.png$\" \"/b/hero banner.png\" [R=301,L]"));

        let nginx = render(&events, Dialect::Nginx, at());
        assert!(nginx.contains("location = \"/a/hero banner.png\" {"));
        assert!(nginx.contains("return 301 \"/b/hero banner.png\";"));
    }

    #[test]
    fn test_nginx_syntax_characters_quoted() {
        let events = [event("/a/photo{1};.png", "/b/price$5.png")];

        let nginx = render(&events, Dialect::Nginx, at());

        assert!(nginx.contains("location = \"/a/photo{1};.png\" {\n"));
        assert!(nginx.contains("    return 301 /b/price%245.png;\n"));
    }

    #[test]
    fn test_nginx_variable_in_target_encoded() {
        let events = [event("/a/$x.png", "/b/$x {1}.png")];

        let nginx = render(&events, Dialect::Nginx, at());

        assert!(nginx.contains("location = \"/a/$x.png\" {"));
        assert!(nginx.contains("return 301 \"/b/%24x {1}.png\";"));
    }

    #[test]
    fn test_apache_substitution_escapes() {
        let events = [event("/a/100%.png", "/b/$1 100%.png")];

        let apache = render(&events, Dialect::Apache, at());

        assert!(apache.contains("RewriteRule ^a/100%\\.png$ \"/b/\\$1 100\\%.png\" [R=301,L]"));
    }

    #[test]
    fn test_empty_render_is_header_only() {
        let text = render(&[], Dialect::Apache, at());
        assert_eq!(
            text,
            "# Generated URL Redirects\n# Generated: 2024-05-01T12:00:00Z\n# Total redirects: 0\n\n"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let events = [event("/a.png", "/x/a.png"), event("/b.png", "/x/b.png")];
        assert_eq!(
            render(&events, Dialect::Nginx, at()),
            render(&events, Dialect::Nginx, at())
        );
    }

    #[test]
    fn test_emit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("redirects.htaccess");

        assert_eq!(
            emit(&[], Dialect::Apache, at(), &path).unwrap(),
            EmitOutcome::NothingToEmit
        );
        assert!(!path.exists());

        let outcome = emit(&[event("/a.png", "/b.png")], Dialect::Apache, at(), &path).unwrap();
        assert_eq!(outcome, EmitOutcome::Written { rules: 1 });
        assert!(fs::read_to_string(&path).unwrap().contains("RewriteRule ^a\\.png$ /b.png"));
    }
}
