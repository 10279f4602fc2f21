//! Markdown to plain-text extraction.
//!
//! The loader indexes what a reader sees, not the markup: heading hashes,
//! emphasis markers, code fences, link targets, HTML tags and front-matter are
//! removed while the words are kept. Paragraph breaks survive as blank lines
//! so the chunker can still split on them.

/// Convert Markdown source into plain text.
pub fn markdown_to_text(markdown: &str) -> String {
    let body = strip_front_matter(markdown);

    let mut lines: Vec<String> = Vec::new();
    let mut in_fence: Option<&str> = None;

    for raw in body.lines() {
        let trimmed = raw.trim();

        if let Some(fence) = in_fence {
            if trimmed.starts_with(fence) {
                in_fence = None;
            } else {
                lines.push(raw.trim_end().to_string());
            }
            continue;
        }
        if trimmed.starts_with("```") {
            in_fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            in_fence = Some("~~~");
            continue;
        }

        if let Some(line) = convert_line(trimmed) {
            lines.push(line);
        }
    }

    collapse_blank_lines(&lines)
}

fn strip_front_matter(markdown: &str) -> &str {
    let Some(rest) = markdown.strip_prefix("---\n") else {
        return markdown;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => markdown,
    }
}

/// Convert one line outside code fences. `None` drops the line entirely.
fn convert_line(line: &str) -> Option<String> {
    if is_horizontal_rule(line) {
        return Some(String::new());
    }

    let mut line = line;
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.trim_start();
    }

    if line.starts_with('#') {
        let stripped = line.trim_start_matches('#');
        if stripped.is_empty() || stripped.starts_with(' ') {
            line = stripped.trim();
        }
    }

    if line.starts_with('|') {
        return convert_table_row(line);
    }

    for bullet in ["- [ ] ", "- [x] ", "- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            line = rest;
            break;
        }
    }

    Some(strip_inline(line).trim().to_string())
}

fn is_horizontal_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|m| compact.chars().all(|c| c == *m))
}

fn convert_table_row(line: &str) -> Option<String> {
    if line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ')) {
        return None;
    }
    let cells: Vec<String> = line
        .split('|')
        .map(|cell| strip_inline(cell.trim()))
        .filter(|cell| !cell.is_empty())
        .collect();
    Some(cells.join(" "))
}

/// Remove inline markup: links and images keep their text, tags and
/// emphasis markers disappear.
fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '!' if chars.get(i + 1) == Some(&'[') => {
                if let Some((text, next)) = parse_link(&chars, i + 1) {
                    out.push_str(&text);
                    i = next;
                } else {
                    out.push('!');
                    i += 1;
                }
            }
            '[' => {
                if let Some((text, next)) = parse_link(&chars, i) {
                    out.push_str(&text);
                    i = next;
                } else {
                    out.push('[');
                    i += 1;
                }
            }
            '<' => match find_tag_end(&chars, i) {
                Some(end) => i = end + 1,
                None => {
                    out.push('<');
                    i += 1;
                }
            },
            '`' | '*' => i += 1,
            '_' if chars.get(i + 1) == Some(&'_') => i += 2,
            '~' if chars.get(i + 1) == Some(&'~') => i += 2,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Parse `[text](target)` starting at `open` (the `[`). Returns the stripped
/// text and the index just past the closing parenthesis.
fn parse_link(chars: &[char], open: usize) -> Option<(String, usize)> {
    let close = (open + 1..chars.len()).find(|&j| chars[j] == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let paren_close = (close + 2..chars.len()).find(|&j| chars[j] == ')')?;
    let text: String = chars[open + 1..close].iter().collect();
    Some((strip_inline(&text), paren_close + 1))
}

fn find_tag_end(chars: &[char], open: usize) -> Option<usize> {
    let first = chars.get(open + 1)?;
    if !(first.is_ascii_alphabetic() || *first == '/' || *first == '!') {
        return None;
    }
    (open + 1..chars.len()).find(|&j| chars[j] == '>')
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out = String::new();
    let mut pending_blank = false;

    for line in lines {
        if line.trim().is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push_str("\n\n");
            pending_blank = false;
        } else if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_and_emphasis() {
        let text = markdown_to_text("# Add Employee\n\nUse the **Add** button in _HR_ > `Employees`.");
        assert_eq!(text, "Add Employee\n\nUse the Add button in _HR_ > Employees.");
    }

    #[test]
    fn test_links_and_images_keep_text() {
        let text = markdown_to_text("See [the guide](https://example.com/guide) and ![logo](logo.png).");
        assert_eq!(text, "See the guide and logo.");
    }

    #[test]
    fn test_html_tags_removed_comparisons_kept() {
        let text = markdown_to_text("<b>Note</b>: 3 < 5 days<br/>");
        assert_eq!(text, "Note: 3 < 5 days");
    }

    #[test]
    fn test_front_matter_removed() {
        let text = markdown_to_text("---\ntitle: Leave\n---\nEmployees get 20 days leave.");
        assert_eq!(text, "Employees get 20 days leave.");
    }

    #[test]
    fn test_code_fence_content_kept() {
        let text = markdown_to_text("Run:\n\n```bash\nhrms sync --all\n```\n\nDone.");
        assert_eq!(text, "Run:\n\nhrms sync --all\n\nDone.");
    }

    #[test]
    fn test_lists_tables_and_rules() {
        let md = "- first\n* second\n\n---\n\n| Type | Days |\n|------|------|\n| Annual | 20 |";
        let text = markdown_to_text(md);
        assert_eq!(text, "first\nsecond\n\nType Days\nAnnual 20");
    }

    #[test]
    fn test_blank_runs_collapse() {
        let text = markdown_to_text("\n\nA\n\n\n\nB\n\n");
        assert_eq!(text, "A\n\nB");
    }
}
