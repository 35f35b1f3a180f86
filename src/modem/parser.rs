//! Line-oriented AT response parser.
//!
//! Fed one byte at a time as they arrive from the serial port. A response
//! line is the content between two consecutive `\r\n` boundaries, so bytes
//! before the first boundary (the echoed command) never count. When the
//! latest line is a final result code the whole captured list freezes as
//! the parsed response.

const FINAL_RESPONSES: [&str; 3] = ["OK", "ERROR", "NO CARRIER"];
const ERROR_PREFIXES: [&str; 2] = ["+CME ERROR:", "+CMS ERROR:"];

/// Incremental parser for one AT transaction.
#[derive(Debug, Default)]
pub struct AtParser {
    current: String,
    lines: Vec<String>,
    response: Option<Vec<String>>,
    seen_boundary: bool,
}

impl AtParser {
    /// Fresh parser with no buffered data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all buffered data and any parsed response.
    pub fn reset(&mut self) {
        self.current.clear();
        self.lines.clear();
        self.response = None;
        self.seen_boundary = false;
    }

    /// Feed the parser one byte.
    pub fn feed(&mut self, byte: u8) {
        if self.response.is_some() {
            return;
        }

        self.current.push(char::from(byte));
        if !self.current.ends_with("\r\n") {
            return;
        }

        let content = self.current[..self.current.len() - 2].to_string();
        self.current.clear();

        if self.seen_boundary && !content.is_empty() {
            let terminal = is_final(&content);
            self.lines.push(content);
            if terminal {
                self.response = Some(self.lines.clone());
            }
        }
        self.seen_boundary = true;
    }

    /// The complete response, or `None` while the transaction is open.
    pub fn response(&self) -> Option<&[String]> {
        self.response.as_deref()
    }
}

fn is_final(line: &str) -> bool {
    FINAL_RESPONSES.iter().any(|f| line == *f)
        || ERROR_PREFIXES.iter().any(|p| line.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(parser: &mut AtParser, data: &str) {
        for byte in data.bytes() {
            parser.feed(byte);
        }
    }

    #[test]
    fn parses_query_response() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\n+CSQ: 17,0\r\n\r\nOK\r\n");

        assert_eq!(
            parser.response(),
            Some(&["+CSQ: 17,0".to_string(), "OK".to_string()][..])
        );
    }

    #[test]
    fn echoed_command_is_not_a_line() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "AT+CSQ\r\r\n+CSQ: 17,0\r\nOK\r\n");

        assert_eq!(
            parser.response(),
            Some(&["+CSQ: 17,0".to_string(), "OK".to_string()][..])
        );
    }

    #[test]
    fn incomplete_transaction_has_no_response() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\n+CREG: 0,1\r\n");

        assert_eq!(parser.response(), None);
    }

    #[test]
    fn cme_error_terminates() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\n+CME ERROR: SIM not inserted\r\n");

        assert_eq!(
            parser.response(),
            Some(&["+CME ERROR: SIM not inserted".to_string()][..])
        );
    }

    #[test]
    fn no_carrier_terminates() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\nNO CARRIER\r\n");

        assert_eq!(parser.response(), Some(&["NO CARRIER".to_string()][..]));
    }

    #[test]
    fn bytes_after_completion_are_ignored() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\nOK\r\n\r\nGARBAGE\r\n");

        assert_eq!(parser.response(), Some(&["OK".to_string()][..]));
    }

    #[test]
    fn reset_clears_state() {
        let mut parser = AtParser::new();
        feed_str(&mut parser, "\r\nOK\r\n");
        parser.reset();

        assert_eq!(parser.response(), None);
        feed_str(&mut parser, "\r\nERROR\r\n");
        assert_eq!(parser.response(), Some(&["ERROR".to_string()][..]));
    }
}
