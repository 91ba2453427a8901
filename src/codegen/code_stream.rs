use std::fmt::{self, Write};


/// Text sink which re-indents generated C code by counting braces
#[derive(Debug, Default, Clone)]
pub struct CodeStream {
    buffer: String,
    indent: usize,
    /// Text written since the last newline
    pending: String,
}

const INDENT: &str = "    ";

impl CodeStream {
    pub fn new() -> Self {
        CodeStream { buffer: String::new(), indent: 0, pending: String::new() }
    }

    /// Writes each line of `code`, existing leading whitespace is replaced
    pub fn line(&mut self, code: &str) {
        for line in code.lines() {
            self.write_line(line.trim());
        }
    }

    pub fn blank(&mut self) {
        self.buffer.push('\n');
    }

    fn write_line(&mut self, line: &str) {
        if line.is_empty() {
            self.blank();
            return;
        }

        let opens = line.matches('{').count();
        let closes = line.matches('}').count();
        // A line starting with a close brace is dedented before being written
        let leading_closes = line.chars().take_while(|c| *c == '}').count();
        self.indent = self.indent.saturating_sub(leading_closes);

        for _ in 0..self.indent {
            self.buffer.push_str(INDENT);
        }
        self.buffer.push_str(line);
        self.buffer.push('\n');

        self.indent = (self.indent + opens).saturating_sub(closes - leading_closes);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(mut self) -> String {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.write_line(pending.trim());
        }
        self.buffer
    }
}

impl Write for CodeStream {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if c == '\n' {
                let pending = std::mem::take(&mut self.pending);
                self.write_line(pending.trim());
            } else {
                self.pending.push(c);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CodeStream;

    #[test]
    fn test_indentation_follows_braces() {
        let mut stream = CodeStream::new();
        stream.line("if(x) {\ny = 1;\n}\nz = 2;");

        assert_eq!(stream.as_str(), "if(x) {\n    y = 1;\n}\nz = 2;\n");
    }

    #[test]
    fn test_else_on_closing_line() {
        let mut stream = CodeStream::new();
        stream.line("if(x) {\na();\n} else {\nb();\n}");

        assert_eq!(stream.as_str(), "if(x) {\n    a();\n} else {\n    b();\n}\n");
    }

    #[test]
    fn test_formatted_writes_are_joined() {
        use std::fmt::Write;

        let mut stream = CodeStream::new();
        writeln!(stream, "for(unsigned int i = 0; i < {}; i++) {{", 10).unwrap();
        writeln!(stream, "x[i] = {};", 0).unwrap();
        writeln!(stream, "}}").unwrap();

        assert_eq!(stream.into_string(), "for(unsigned int i = 0; i < 10; i++) {\n    x[i] = 0;\n}\n");
    }
}
