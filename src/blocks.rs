//! HCL block locator
//!
//! Finds the top-level block that encloses a given line by scanning block
//! headers and balancing braces. This is deliberately not a full HCL parser:
//! it only needs block kind, labels and span, and it must keep working on
//! files the validator already rejected.

use crate::extract::UNKNOWN_LINE;
use regex::Regex;

/// Context of the block enclosing a diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Block kind, e.g. "resource" or "variable".
    pub kind: String,
    /// Full identity string: kind plus unquoted labels,
    /// e.g. "resource aws_instance web".
    pub identity: String,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
}

/// Net brace depth change of one line, ignoring braces inside strings and
/// after comment markers.
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    let mut in_string = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '\\' if in_string => {
                chars.next();
            }
            '#' if !in_string => break,
            '/' if !in_string && chars.peek() == Some(&'/') => break,
            '{' if !in_string => delta += 1,
            '}' if !in_string => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Locate the top-level block whose span contains `line` (1-based).
///
/// Returns `None` when the line is unknown, outside every block, or the file
/// is too mangled to balance.
pub fn locate_enclosing_block(source: &str, line: i64) -> Option<BlockContext> {
    if line == UNKNOWN_LINE || line < 1 {
        return None;
    }

    let header_re = Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_-]*)((?:\s+"[^"]*")*)\s*\{"#).ok()?;
    let label_re = Regex::new(r#""([^"]*)""#).ok()?;

    let lines: Vec<&str> = source.lines().collect();
    let mut depth = 0i64;
    let mut current: Option<(String, String, usize)> = None;

    for (idx, text) in lines.iter().enumerate() {
        if depth == 0 {
            if let Some(caps) = header_re.captures(text) {
                let kind = caps.get(1).map(|m| m.as_str().to_string())?;
                let mut identity_parts = vec![kind.clone()];
                if let Some(labels) = caps.get(2) {
                    for label in label_re.captures_iter(labels.as_str()) {
                        identity_parts.push(label[1].to_string());
                    }
                }
                current = Some((kind, identity_parts.join(" "), idx));
            }
        }

        depth += brace_delta(text);
        if depth < 0 {
            // Unbalanced close brace; give up rather than misattribute.
            return None;
        }

        if depth == 0 {
            if let Some((kind, identity, start_idx)) = current.take() {
                let start_line = (start_idx + 1) as i64;
                let end_line = (idx + 1) as i64;
                if start_line <= line && line <= end_line {
                    return Some(BlockContext {
                        kind,
                        identity,
                        start_line,
                        end_line,
                        content: lines[start_idx..=idx].join("\n"),
                    });
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"variable "region" {
  type = string
}

resource "aws_instance" "web" {
  ami = var.ami
  tags = {
    Name = "web"
  }
}

output "ip" {
  value = aws_instance.web.public_ip
}
"#;

    #[test]
    fn locates_resource_block_with_nested_braces() {
        let block = locate_enclosing_block(SOURCE, 7).unwrap();
        assert_eq!(block.kind, "resource");
        assert_eq!(block.identity, "resource aws_instance web");
        assert_eq!(block.start_line, 5);
        assert_eq!(block.end_line, 10);
        assert!(block.content.starts_with("resource \"aws_instance\""));
    }

    #[test]
    fn locates_single_label_block() {
        let block = locate_enclosing_block(SOURCE, 2).unwrap();
        assert_eq!(block.identity, "variable region");
        assert_eq!(block.start_line, 1);
        assert_eq!(block.end_line, 3);
    }

    #[test]
    fn line_between_blocks_resolves_to_nothing() {
        assert!(locate_enclosing_block(SOURCE, 4).is_none());
    }

    #[test]
    fn unknown_line_resolves_to_nothing() {
        assert!(locate_enclosing_block(SOURCE, UNKNOWN_LINE).is_none());
        assert!(locate_enclosing_block(SOURCE, 0).is_none());
    }

    #[test]
    fn braces_in_strings_and_comments_do_not_break_balance() {
        let source = "resource \"null_resource\" \"x\" {\n  # comment with {\n  value = \"}\"\n}\n";
        let block = locate_enclosing_block(source, 3).unwrap();
        assert_eq!(block.end_line, 4);
    }

    #[test]
    fn unbalanced_source_gives_up() {
        let source = "}\nresource \"a\" \"b\" {\n}\n";
        assert!(locate_enclosing_block(source, 2).is_none());
    }
}
