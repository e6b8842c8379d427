//! SIC/XE source reader: a free-format line parser.
//!
//! Source format:
//! - **`.` in column 1**: comment line
//! - **Column 1 non-blank**: label field
//! - **Next field**: mnemonic (`+` prefix for format 4)
//! - **Next field**: operands (`#`/`@` marker, `,` separated, quotes respected)
//! - **Anything after**: remarks (ignored)

use crate::directives::Directive;
use crate::error::ErrorKind;
use crate::line::{AddrMode, Line};

/// Instructions written without an operand; the rest of their line is a remark.
const NO_OPERAND_INSNS: &[&str] = &["RSUB", "FIX", "FLOAT", "HIO", "NORM", "SIO", "TIO"];

// ---------------------------------------------------------------------------
//  Source line parsing
// ---------------------------------------------------------------------------

/// Parse a whole source text into lines. Comments and blank lines are
/// dropped; line numbers refer to the original text.
pub fn parse_source(source: &str) -> Vec<Line> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| parse_source_line(raw, i + 1))
        .collect()
}

/// Parse one raw line. Returns `None` for comments and blank lines.
pub fn parse_source_line(raw: &str, number: usize) -> Option<Line> {
    let raw = raw.trim_end();
    if raw.trim().is_empty() || raw.starts_with('.') {
        return None;
    }

    let has_label = !raw.starts_with(char::is_whitespace);
    let mut fields = split_fields(raw).into_iter();

    let mut line = Line {
        number,
        ..Default::default()
    };

    if has_label {
        line.label = fields.next().unwrap_or_default().to_uppercase();
        if !crate::symbol::is_label(&line.label) {
            line.error = Some(ErrorKind::Syntax);
        }
    }

    let Some(mnemonic) = fields.next() else {
        // Label only, no mnemonic.
        line.error = Some(ErrorKind::Syntax);
        return Some(line);
    };
    line.mnemonic = mnemonic.to_uppercase();

    let takes_operand = match Directive::from_mnemonic(&line.mnemonic) {
        Some(directive) => directive.takes_operand(),
        None => !NO_OPERAND_INSNS.contains(&line.base_mnemonic()),
    };
    if !takes_operand {
        return Some(line);
    }
    let Some(field) = fields.next() else {
        return Some(line);
    };

    let mut field = field.as_str();
    if let Some(mode) = field.chars().next().and_then(AddrMode::from_marker) {
        line.mode = mode;
        field = &field[1..];
    }

    let data_list = Directive::from_mnemonic(&line.mnemonic).is_some_and(|d| d.is_data_list());
    if data_list {
        line.operand1 = upper_outside_quotes(field);
        return Some(line);
    }

    let mut operands = split_operands(field).into_iter();
    line.operand1 = upper_outside_quotes(&operands.next().unwrap_or_default());
    line.operand2 = operands.next().unwrap_or_default().to_uppercase();
    if operands.next().is_some() {
        line.error = Some(ErrorKind::Syntax);
    }

    Some(line)
}

/// Split a line into whitespace-separated fields, keeping quoted text
/// (`C'A B'`) together.
fn split_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for ch in text.chars() {
        if ch == '\'' {
            in_quote = !in_quote;
        }
        if ch.is_whitespace() && !in_quote {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

/// Split an operand field on commas that are not inside quotes.
pub fn split_operands(text: &str) -> Vec<String> {
    let mut operands = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for ch in text.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            ',' if !in_quote => operands.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() || !operands.is_empty() {
        operands.push(current);
    }
    operands
}

/// Uppercase everything except quoted text.
fn upper_outside_quotes(text: &str) -> String {
    let mut in_quote = false;
    text.chars()
        .map(|ch| {
            if ch == '\'' {
                in_quote = !in_quote;
            }
            if in_quote {
                ch
            } else {
                ch.to_ascii_uppercase()
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comment_and_blank() {
        assert!(parse_source_line(". this is a comment", 1).is_none());
        assert!(parse_source_line("   ", 2).is_none());
    }

    #[test]
    fn test_parse_labeled_instruction() {
        let line = parse_source_line("FIRST    STL     RETADR", 1).unwrap();
        assert_eq!(line.label, "FIRST");
        assert_eq!(line.mnemonic, "STL");
        assert_eq!(line.operand1, "RETADR");
        assert_eq!(line.mode, AddrMode::Simple);
        assert!(line.error.is_none());
    }

    #[test]
    fn test_parse_unlabeled_immediate() {
        let line = parse_source_line("         LDB     #length", 4).unwrap();
        assert!(!line.has_label());
        assert_eq!(line.mode, AddrMode::Immediate);
        assert_eq!(line.operand1, "LENGTH");
        assert_eq!(line.number, 4);
    }

    #[test]
    fn test_parse_indexed() {
        let line = parse_source_line("         STCH    BUFFER,X   store char", 1).unwrap();
        assert_eq!(line.operand1, "BUFFER");
        assert_eq!(line.operand2, "X");
    }

    #[test]
    fn test_parse_extended_indirect() {
        let line = parse_source_line("         +J      @RETADR", 1).unwrap();
        assert_eq!(line.mnemonic, "+J");
        assert_eq!(line.mode, AddrMode::Indirect);
        assert_eq!(line.operand1, "RETADR");
    }

    #[test]
    fn test_parse_no_operand_remark() {
        let line = parse_source_line("         RSUB    return to caller", 1).unwrap();
        assert_eq!(line.mnemonic, "RSUB");
        assert!(line.operand1.is_empty());
        let line = parse_source_line("         LTORG   pool here", 1).unwrap();
        assert!(line.operand1.is_empty());
    }

    #[test]
    fn test_parse_quoted_literal() {
        let line = parse_source_line("         LDA     =C'e f'", 1).unwrap();
        assert_eq!(line.operand1, "=C'e f'");
    }

    #[test]
    fn test_parse_data_list_kept_whole() {
        let line = parse_source_line("DATA     BYTE    X'05',C'A,B',7", 1).unwrap();
        assert_eq!(line.operand1, "X'05',C'A,B',7");
        assert!(line.operand2.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_source_line("LONELY", 1).unwrap().error, Some(ErrorKind::Syntax));
        assert_eq!(
            parse_source_line("         ADDR    A,S,T", 1).unwrap().error,
            Some(ErrorKind::Syntax)
        );
        assert_eq!(parse_source_line("1BAD     LDA     X", 1).unwrap().error, Some(ErrorKind::Syntax));
    }

    #[test]
    fn test_parse_source_numbers_lines() {
        let src = "COPY     START   1000\n. comment\n         RSUB\n";
        let lines = parse_source(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[1].number, 3);
    }

    #[test]
    fn test_split_operands() {
        assert_eq!(split_operands("A,S"), vec!["A", "S"]);
        assert_eq!(split_operands("C'1,2',X"), vec!["C'1,2'", "X"]);
        assert!(split_operands("").is_empty());
    }
}
