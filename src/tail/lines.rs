//! Reassembly of complete lines from raw tail chunks.
//!
//! The journal is consumed line-by-line, but a poll can end in the middle of
//! a line that the writer has not finished yet. The assembler buffers the
//! partial remainder across polls and only releases newline-terminated
//! lines.

/// Accumulates raw text chunks and yields complete lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line completed by it, in order.
    /// Trailing `\r` from CRLF terminators is stripped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}
