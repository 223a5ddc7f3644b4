//! HCL text writer
//!
//! Small line-oriented writer for the generated `.tf` files. Output is fully
//! determined by the call sequence: two-space indentation, `=` aligned within
//! an attribute group the way `terraform fmt` lays it out.

/// Spaces per nesting level.
pub const INDENT: usize = 2;

#[derive(Debug, Default)]
pub struct HclWriter {
    out: String,
    indent: usize,
}

impl HclWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer whose first line starts `spaces` columns in.
    pub fn with_indent(spaces: usize) -> Self {
        Self {
            out: String::new(),
            indent: spaces,
        }
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    /// Write one indented line. Empty text writes a bare newline.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            self.out.extend(std::iter::repeat(' ').take(self.indent));
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `header {` and indent.
    pub fn open(&mut self, header: impl AsRef<str>) {
        let header = header.as_ref();
        if header.is_empty() {
            self.open_line("{");
        } else {
            self.open_line(format!("{} {{", header));
        }
    }

    /// Write `text` verbatim and indent (for openers like `value = jsonencode({`).
    pub fn open_line(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.indent += INDENT;
    }

    pub fn close(&mut self) {
        self.close_line("}");
    }

    /// Dedent and write `text` (for closers like `})` or `},`).
    pub fn close_line(&mut self, text: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(INDENT);
        self.line(text);
    }

    /// `name {}`
    pub fn empty_block(&mut self, name: impl AsRef<str>) {
        self.line(format!("{} {{}}", name.as_ref()));
    }

    pub fn attr(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.line(format!("{} = {}", key.as_ref(), value.as_ref()));
    }

    /// Consecutive attributes with their `=` signs aligned.
    pub fn attrs<K: AsRef<str>, V: AsRef<str>>(&mut self, pairs: &[(K, V)]) {
        let width = pairs
            .iter()
            .map(|(k, _)| k.as_ref().len())
            .max()
            .unwrap_or(0);
        for (key, value) in pairs {
            self.line(format!(
                "{:<width$} = {}",
                key.as_ref(),
                value.as_ref(),
                width = width
            ));
        }
    }

    /// One attribute with its key padded to `width`, for groups that mix
    /// attributes and nested objects.
    pub fn attr_padded(&mut self, key: &str, value: impl AsRef<str>, width: usize) {
        self.line(format!("{:<width$} = {}", key, value.as_ref(), width = width));
    }

    /// Append text that was rendered elsewhere (already indented).
    pub fn push_raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Quote a string literal, escaping backslashes, quotes, control characters and
/// template sequences so the value reaches Terraform unchanged.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

pub fn bool_lit(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
