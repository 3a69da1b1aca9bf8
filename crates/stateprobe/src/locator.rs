//! Block location inside indentation-delimited documents.
//!
//! The locator never builds a syntax tree. A document is a list of lines;
//! a block opens on a line the dialect recognises and runs until the next
//! non-ignored line that is indented no deeper than the opening line.
//! Blocks never nest: once inside a block, deeper lines are consumed
//! without being considered as openings.
//!
//! ```text
//!   - name: install          <- opens "install", depth 2
//!     copy:                  \
//!       dest: /etc/app.yml    } inside (depth > 2)
//!     # comment              /  ignored, never a boundary
//!   - name: restart          <- depth 2 <= 2, closes "install"
//! ```

use std::collections::BTreeSet;

/// Grammar rules a dialect supplies to the locator.
pub trait BlockGrammar {
    /// Marker that starts a comment line after leading whitespace
    fn comment_marker(&self) -> &'static str {
        "#"
    }

    /// Identity of the block opened by this (trimmed) line, if it opens one
    fn block_identity(&self, trimmed: &str) -> Option<String>;

    /// Blocks consist of their opening line only
    fn single_line_blocks(&self) -> bool {
        false
    }

    /// Value of the first of `fields` (in list order) assigned on this line
    fn field_assignment(&self, line: &str, fields: &[String]) -> Option<String>;

    /// Interpolation delimiters of the dialect's template language
    fn template_markers(&self) -> &'static [&'static str];

    /// Whether a field value may be substituted by a mutation.
    ///
    /// Templated values and values containing whitespace are left alone.
    fn is_mutation_candidate(&self, value: &str) -> bool {
        !self.template_markers().iter().any(|m| value.contains(m))
            && !value.chars().any(char::is_whitespace)
    }
}

/// Number of leading space or tab characters
#[must_use]
pub fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn indent_prefix(line: &str) -> &str {
    let n = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..n]
}

/// A text document split into lines, terminators kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    lines: Vec<String>,
}

impl Document {
    /// Split text into lines, preserving every byte
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    /// Reassemble the document text
    #[must_use]
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }

    /// Lines including their terminators
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the document has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text of lines `start..=end`
    #[must_use]
    pub fn span_text(&self, span: &BlockSpan) -> String {
        self.lines[span.start..=span.end].concat()
    }

    /// Insert whole lines after `index`, terminating `index` first if needed
    fn insert_lines_after(&mut self, index: usize, new_lines: Vec<String>) {
        if let Some(line) = self.lines.get_mut(index) {
            if !line.ends_with('\n') {
                line.push('\n');
            }
        }
        let at = index + 1;
        let _ = self.lines.splice(at..at, new_lines);
    }
}

/// Lines `start..=end` of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    /// Opening line index
    pub start: usize,
    /// Last line index (inclusive)
    pub end: usize,
    /// Indentation depth of the opening line
    pub depth: usize,
    /// Identity the opening line declared
    pub identity: String,
}

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Not inside a matching block
    Outside,
    /// Inside a block opened at `start` with indentation `depth`
    Inside { start: usize, depth: usize },
}

/// Block scanner and editor over one grammar.
#[derive(Clone, Copy)]
pub struct Locator<'g> {
    grammar: &'g dyn BlockGrammar,
}

impl std::fmt::Debug for Locator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("comment_marker", &self.grammar.comment_marker())
            .field("single_line_blocks", &self.grammar.single_line_blocks())
            .finish()
    }
}

impl<'g> Locator<'g> {
    /// Create a locator for the given grammar
    #[must_use]
    pub fn new(grammar: &'g dyn BlockGrammar) -> Self {
        Self { grammar }
    }

    /// Blank lines and comment lines take no part in block structure
    #[must_use]
    pub fn is_ignored(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with(self.grammar.comment_marker())
    }

    fn open(&self, index: usize, line: &str, name: &str) -> ScanState {
        match self.grammar.block_identity(line.trim()) {
            Some(identity) if identity == name => ScanState::Inside {
                start: index,
                depth: indentation(line),
            },
            _ => ScanState::Outside,
        }
    }

    fn close(start: usize, end: usize, depth: usize, name: &str) -> BlockSpan {
        BlockSpan {
            start,
            end,
            depth,
            identity: name.to_string(),
        }
    }

    /// Every block named `name`, in document order
    #[must_use]
    pub fn spans(&self, document: &Document, name: &str) -> Vec<BlockSpan> {
        let mut spans = Vec::new();
        let mut state = ScanState::Outside;

        for (index, line) in document.lines().iter().enumerate() {
            if self.is_ignored(line) {
                continue;
            }
            state = match state {
                ScanState::Inside { start, depth } if indentation(line) > depth => {
                    ScanState::Inside { start, depth }
                }
                ScanState::Inside { start, depth } => {
                    spans.push(Self::close(start, index - 1, depth, name));
                    self.open(index, line, name)
                }
                ScanState::Outside => self.open(index, line, name),
            };
            if self.grammar.single_line_blocks() {
                if let ScanState::Inside { start, depth } = state {
                    spans.push(Self::close(start, start, depth, name));
                    state = ScanState::Outside;
                }
            }
        }

        if let ScanState::Inside { start, depth } = state {
            spans.push(Self::close(start, document.len() - 1, depth, name));
        }
        spans
    }

    /// First block named `name`
    #[must_use]
    pub fn locate_block(&self, document: &Document, name: &str) -> Option<BlockSpan> {
        self.spans(document, name).into_iter().next()
    }

    /// Insert `content`, indented like the block, after every block named `name`.
    ///
    /// Returns the number of insertions; blank `content` inserts nothing.
    pub fn insert_after(&self, document: &mut Document, name: &str, content: &str) -> usize {
        if content.trim().is_empty() {
            return 0;
        }
        let spans = self.spans(document, name);
        for span in spans.iter().rev() {
            let indent = indent_prefix(&document.lines()[span.start]).to_string();
            document.insert_lines_after(span.end, reindent(content, &indent));
        }
        spans.len()
    }

    /// Emit every block named `name` a second time, right after itself.
    ///
    /// Returns the number of duplicated blocks.
    pub fn duplicate_block(&self, document: &mut Document, name: &str) -> usize {
        let spans = self.spans(document, name);
        for span in spans.iter().rev() {
            let copy = document.lines()[span.start..=span.end].to_vec();
            document.insert_lines_after(span.end, copy);
        }
        spans.len()
    }

    /// Insert `property` as the first line inside every block named `name`.
    ///
    /// The property takes the indentation of the block's first inner line,
    /// or the opening indentation plus two spaces for a one-line block.
    pub fn insert_property(&self, document: &mut Document, name: &str, property: &str) -> usize {
        let spans = self.spans(document, name);
        for span in spans.iter().rev() {
            let inner = document.lines()[span.start + 1..=span.end]
                .iter()
                .find(|line| !self.is_ignored(line))
                .map(|line| indent_prefix(line).to_string());
            let indent = inner.unwrap_or_else(|| {
                format!("{}  ", indent_prefix(&document.lines()[span.start]))
            });
            document.insert_lines_after(span.start, reindent(property, &indent));
        }
        spans.len()
    }

    /// Rewrite the opening line of every block named `name`.
    ///
    /// `rewrite` returns `None` to leave a line untouched. Returns the
    /// number of changed lines.
    pub fn rewrite_openings<F>(&self, document: &mut Document, name: &str, mut rewrite: F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut changed = 0;
        for span in self.spans(document, name) {
            let line = &document.lines[span.start];
            let (body, terminator) = match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line.as_str(), ""),
            };
            if let Some(new_body) = rewrite(body) {
                document.lines[span.start] = format!("{new_body}{terminator}");
                changed += 1;
            }
        }
        changed
    }

    /// Values assigned to any of `fields` inside blocks named `scope`
    #[must_use]
    pub fn field_values(
        &self,
        document: &Document,
        scope: &str,
        fields: &[String],
    ) -> BTreeSet<String> {
        let mut values = BTreeSet::new();
        for span in self.spans(document, scope) {
            for line in &document.lines()[span.start..=span.end] {
                if self.is_ignored(line) {
                    continue;
                }
                if let Some(value) = self.grammar.field_assignment(line, fields) {
                    let _ = values.insert(value);
                }
            }
        }
        values
    }
}

/// Split `content` into lines, each prefixed with `indent`.
///
/// Empty lines stay empty and the last line is always terminated.
fn reindent(content: &str, indent: &str) -> Vec<String> {
    content
        .split_inclusive('\n')
        .map(|line| {
            let mut out = if line.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{}", line.trim_end_matches('\n'))
            };
            out.push('\n');
            out
        })
        .collect()
}

/// Strip one pair of matching surrounding quotes
#[must_use]
pub fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// Minimal grammar: `- name: X` opens, `key: value` fields.
    struct TestGrammar {
        single_line: bool,
    }

    impl BlockGrammar for TestGrammar {
        fn block_identity(&self, trimmed: &str) -> Option<String> {
            trimmed
                .strip_prefix("- name:")
                .map(|rest| strip_quotes(rest).to_string())
        }

        fn single_line_blocks(&self) -> bool {
            self.single_line
        }

        fn field_assignment(&self, line: &str, fields: &[String]) -> Option<String> {
            let trimmed = line.trim().trim_start_matches("- ");
            let (key, value) = trimmed.split_once(':')?;
            fields
                .iter()
                .find(|f| f.as_str() == key.trim())
                .map(|_| strip_quotes(value).to_string())
                .filter(|v| !v.is_empty())
        }

        fn template_markers(&self) -> &'static [&'static str] {
            &["{{", "}}"]
        }
    }

    const GRAMMAR: TestGrammar = TestGrammar { single_line: false };

    const TASKS: &str = "\
- name: install
  copy:
    src: cfg.yml
    dest: /etc/app/cfg.yml

# trailing comment
- name: restart
  service:
    name: app
";

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_indentation() {
        assert_eq!(indentation("    x"), 4);
        assert_eq!(indentation("\tx"), 1);
        assert_eq!(indentation("x"), 0);
    }

    #[test]
    fn test_document_round_trip() {
        let doc = Document::parse(TASKS);
        assert_eq!(doc.to_text(), TASKS);
        let doc = Document::parse("a\nb");
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.to_text(), "a\nb");
    }

    #[test]
    fn test_locate_block_extent() {
        let doc = Document::parse(TASKS);
        let locator = Locator::new(&GRAMMAR);
        let span = locator.locate_block(&doc, "install").unwrap();
        assert_eq!(span.start, 0);
        // blank and comment lines before the next task stay in the span
        assert_eq!(span.end, 5);
        assert_eq!(span.depth, 0);

        let span = locator.locate_block(&doc, "restart").unwrap();
        assert_eq!(span.start, 6);
        assert_eq!(span.end, 8);
    }

    #[test]
    fn test_locate_block_exact_name() {
        let doc = Document::parse(TASKS);
        let locator = Locator::new(&GRAMMAR);
        assert!(locator.locate_block(&doc, "inst").is_none());
        assert!(locator.locate_block(&doc, "install2").is_none());
    }

    #[test]
    fn test_commented_opening_ignored() {
        let doc = Document::parse("# - name: install\n- name: other\n  x: 1\n");
        let locator = Locator::new(&GRAMMAR);
        assert!(locator.locate_block(&doc, "install").is_none());
    }

    #[test]
    fn test_blocks_never_nest() {
        let text = "\
- name: outer
  block:
    - name: outer
      debug: msg=x
- name: next
";
        let doc = Document::parse(text);
        let locator = Locator::new(&GRAMMAR);
        let spans = locator.spans(&doc, "outer");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, 3);
    }

    #[test]
    fn test_multiple_blocks_same_name() {
        let text = "- name: a\n  x: 1\n- name: b\n- name: a\n  x: 2\n";
        let doc = Document::parse(text);
        let locator = Locator::new(&GRAMMAR);
        let spans = locator.spans(&doc, "a");
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (0, 1));
        assert_eq!((spans[1].start, spans[1].end), (3, 4));
    }

    #[test]
    fn test_indented_blocks() {
        let text = "tasks:\n  - name: a\n    x: 1\n  - name: b\n";
        let doc = Document::parse(text);
        let span = Locator::new(&GRAMMAR).locate_block(&doc, "a").unwrap();
        assert_eq!((span.start, span.end, span.depth), (1, 2, 2));
    }

    #[test]
    fn test_single_line_blocks() {
        let grammar = TestGrammar { single_line: true };
        let doc = Document::parse("- name: a\n  x: 1\n- name: a\n");
        let spans = Locator::new(&grammar).spans(&doc, "a");
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (0, 0));
        assert_eq!((spans[1].start, spans[1].end), (2, 2));
    }

    #[test]
    fn test_insert_after_mid_document() {
        let text = "- name: a\n  x: 1\n- name: b\n";
        let mut doc = Document::parse(text);
        let locator = Locator::new(&GRAMMAR);
        let n = locator.insert_after(&mut doc, "a", "- name: hook\n  script: s\n");
        assert_eq!(n, 1);
        assert_eq!(
            doc.to_text(),
            "- name: a\n  x: 1\n- name: hook\n  script: s\n- name: b\n"
        );
    }

    #[test]
    fn test_insert_after_reindents() {
        let text = "tasks:\n  - name: a\n    x: 1\n";
        let mut doc = Document::parse(text);
        let _ = Locator::new(&GRAMMAR).insert_after(&mut doc, "a", "- name: p\n  y: 2");
        assert_eq!(
            doc.to_text(),
            "tasks:\n  - name: a\n    x: 1\n  - name: p\n    y: 2\n"
        );
    }

    #[test]
    fn test_insert_after_unterminated_last_line() {
        let mut doc = Document::parse("- name: a\n  x: 1");
        let _ = Locator::new(&GRAMMAR).insert_after(&mut doc, "a", "- name: p\n");
        assert_eq!(doc.to_text(), "- name: a\n  x: 1\n- name: p\n");
    }

    #[test]
    fn test_insert_after_blank_content_is_noop() {
        for content in ["", "\n", "  \n\n"] {
            let mut doc = Document::parse("- name: a\n  x: 1");
            assert_eq!(Locator::new(&GRAMMAR).insert_after(&mut doc, "a", content), 0);
            assert_eq!(doc.to_text(), "- name: a\n  x: 1");
        }
    }

    #[test]
    fn test_insert_after_missing_block_is_noop() {
        let mut doc = Document::parse(TASKS);
        let n = Locator::new(&GRAMMAR).insert_after(&mut doc, "missing", "x\n");
        assert_eq!(n, 0);
        assert_eq!(doc.to_text(), TASKS);
    }

    #[test]
    fn test_insert_after_keeps_block_locatable() {
        let mut doc = Document::parse(TASKS);
        let locator = Locator::new(&GRAMMAR);
        let _ = locator.insert_after(&mut doc, "install", "- name: hook\n");
        let span = locator.locate_block(&doc, "install").unwrap();
        let hook = locator.locate_block(&doc, "hook").unwrap();
        assert!(span.end < hook.start);
    }

    #[test]
    fn test_duplicate_block() {
        let text = "- name: a\n  x: 1\n- name: b\n";
        let mut doc = Document::parse(text);
        let n = Locator::new(&GRAMMAR).duplicate_block(&mut doc, "a");
        assert_eq!(n, 1);
        assert_eq!(
            doc.to_text(),
            "- name: a\n  x: 1\n- name: a\n  x: 1\n- name: b\n"
        );
    }

    #[test]
    fn test_duplicate_every_match() {
        let text = "- name: a\n- name: b\n- name: a\n";
        let mut doc = Document::parse(text);
        let n = Locator::new(&GRAMMAR).duplicate_block(&mut doc, "a");
        assert_eq!(n, 2);
        assert_eq!(
            doc.to_text(),
            "- name: a\n- name: a\n- name: b\n- name: a\n- name: a\n"
        );
    }

    #[test]
    fn test_insert_property() {
        let text = "- name: a\n  apt: name=x\n- name: b\n";
        let mut doc = Document::parse(text);
        let n = Locator::new(&GRAMMAR).insert_property(&mut doc, "a", "check_mode: true");
        assert_eq!(n, 1);
        assert_eq!(
            doc.to_text(),
            "- name: a\n  check_mode: true\n  apt: name=x\n- name: b\n"
        );
    }

    #[test]
    fn test_insert_property_one_line_block() {
        let mut doc = Document::parse("  - name: a\n");
        let _ = Locator::new(&GRAMMAR).insert_property(&mut doc, "a", "k: v");
        assert_eq!(doc.to_text(), "  - name: a\n    k: v\n");
    }

    #[test]
    fn test_rewrite_openings() {
        let mut doc = Document::parse("- name: a\n  x: 1\n- name: a");
        let n = Locator::new(&GRAMMAR)
            .rewrite_openings(&mut doc, "a", |line| Some(format!("{line} # seen")));
        assert_eq!(n, 2);
        assert_eq!(doc.to_text(), "- name: a # seen\n  x: 1\n- name: a # seen");
    }

    #[test]
    fn test_field_values_scoped() {
        let doc = Document::parse(TASKS);
        let locator = Locator::new(&GRAMMAR);
        let values = locator.field_values(&doc, "install", &fields(&["dest"]));
        assert_eq!(values.into_iter().collect::<Vec<_>>(), ["/etc/app/cfg.yml"]);

        // "name: app" lives in "restart", not "install"
        let values = locator.field_values(&doc, "install", &fields(&["name"]));
        assert_eq!(values.into_iter().collect::<Vec<_>>(), ["install"]);
    }

    #[test]
    fn test_field_values_skip_comments() {
        let text = "- name: a\n  # dest: /secret\n  dest: /public\n";
        let doc = Document::parse(text);
        let values = Locator::new(&GRAMMAR).field_values(&doc, "a", &fields(&["dest"]));
        assert!(!values.contains("/secret"));
        assert!(values.contains("/public"));
    }

    #[test]
    fn test_field_values_deduplicated() {
        let text = "- name: a\n  dest: x\n- name: a\n  dest: x\n";
        let doc = Document::parse(text);
        let values = Locator::new(&GRAMMAR).field_values(&doc, "a", &fields(&["dest"]));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_mutation_candidate() {
        assert!(GRAMMAR.is_mutation_candidate("cfg.yml"));
        assert!(!GRAMMAR.is_mutation_candidate("{{ item }}"));
        assert!(!GRAMMAR.is_mutation_candidate("my file"));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'a'"), "a");
        assert_eq!(strip_quotes("\"a b\""), "a b");
        assert_eq!(strip_quotes(" a "), "a");
        assert_eq!(strip_quotes("'a\""), "'a\"");
        assert_eq!(strip_quotes("'"), "'");
    }
}
