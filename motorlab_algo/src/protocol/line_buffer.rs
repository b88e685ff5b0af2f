//! Byte-to-line assembly for the serial link.

use heapless::Vec;

use super::ProtocolError;

/// Default capacity, enough for the longest command with generous numeric arguments.
pub const LINE_CAPACITY: usize = 96;

/// Accumulates bytes until `\n`. Carriage returns are dropped and a line that
/// overruns the capacity is discarded as a whole and reported once its
/// terminator arrives.
pub struct LineBuffer<const N: usize = LINE_CAPACITY> {
    buf: Vec<u8, N>,
    overflowed: bool, // Rest of the current line is being skipped
    complete: bool,   // Previous push returned a line; clear before reuse
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Feeds one byte. Returns the finished line once `\n` arrives.
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, ProtocolError>> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        match byte {
            b'\r' => None,
            b'\n' => {
                self.complete = true;
                if core::mem::take(&mut self.overflowed) {
                    return Some(Err(ProtocolError::LineTooLong));
                }
                Some(core::str::from_utf8(&self.buf).map_err(|_| ProtocolError::UnknownCommand))
            }
            _ => {
                if !self.overflowed && self.buf.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<const N: usize>(lb: &mut LineBuffer<N>, bytes: &[u8]) -> std::vec::Vec<Result<String, ProtocolError>> {
        let mut lines = std::vec::Vec::new();
        for &b in bytes {
            if let Some(line) = lb.push(b) {
                lines.push(line.map(|s| s.to_string()));
            }
        }
        lines
    }

    #[test]
    fn test_splits_lines_and_strips_cr() {
        let mut lb: LineBuffer = LineBuffer::new();
        let lines = feed(&mut lb, b"GET_SPEED\r\nSTOP\n");
        assert_eq!(lines, vec![Ok("GET_SPEED".to_string()), Ok("STOP".to_string())]);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut lb: LineBuffer = LineBuffer::new();
        assert!(feed(&mut lb, b"SET_SP").is_empty());
        assert_eq!(feed(&mut lb, b"EED 100\n"), vec![Ok("SET_SPEED 100".to_string())]);
    }

    #[test]
    fn test_overlong_line_rejected_then_recovers() {
        let mut lb: LineBuffer<8> = LineBuffer::new();
        let lines = feed(&mut lb, b"START_COAST_DOWN\nSTOP\n");
        assert_eq!(lines, vec![Err(ProtocolError::LineTooLong), Ok("STOP".to_string())]);
    }

    #[test]
    fn test_empty_line() {
        let mut lb: LineBuffer = LineBuffer::new();
        assert_eq!(feed(&mut lb, b"\n"), vec![Ok(String::new())]);
    }
}
