//! AT command wire format
//!
//! Commands are ASCII lines terminated by `\r\n`. The device echoes the
//! command, sends its response and ends with an `O` line; errors are reported
//! as `E-1` or `E` followed by three digits.
//!
//! Page reads break the line discipline: the response to
//! `AT+EFLASHRP=<page>;0;840` is the echo, exactly
//! [`PAGE_PAYLOAD_LEN`] raw bytes and the [`TRAILER`].

use eflash_core::page::PAGE_PAYLOAD_LEN;

/// Line terminator for commands
pub const LINE_END: &str = "\r\n";

/// Prefix of every command
pub const COMMAND_PREFIX: &str = "AT";

/// Read one page of external flash
pub const READ_PAGE: &str = "EFLASHRP";

/// Enter test mode, required before flash access
pub const TEST_MODE: &str = "TST";

/// Line that ends a successful response
pub const OK_LINE: &str = "O";

/// Bytes that follow the page data of a read-page response
pub const TRAILER: &[u8] = b"O\r\n";

/// Build the message for `cmd` with optional arguments
///
/// Commands that already start with `AT` are sent verbatim.
pub fn command_message(cmd: &str, args: Option<&str>) -> String {
    let mut message = if cmd.starts_with(COMMAND_PREFIX) {
        cmd.to_string()
    } else {
        format!("{}+{}", COMMAND_PREFIX, cmd)
    };
    if let Some(args) = args {
        message.push('=');
        message.push_str(args);
    }
    message
}

/// Full read-page command, terminator included
///
/// The address and the length argument are lower-case hex without prefix.
pub fn read_page_command(address: u32) -> String {
    let args = format!("{:x};0;{:x}", address, PAGE_PAYLOAD_LEN);
    let mut command = command_message(READ_PAGE, Some(&args));
    command.push_str(LINE_END);
    command
}

/// Bytes expected in response to a read-page command of `command_len` bytes
pub fn expected_response_len(command_len: usize) -> usize {
    command_len + PAGE_PAYLOAD_LEN + TRAILER.len()
}

/// Error code of a response line, if it is an error line
///
/// Only the start of the line is checked: `E-1` or `E` and three digits,
/// anything after the code is ignored.
pub fn error_code(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('E')?;
    if rest.starts_with("-1") {
        return Some(&rest[..2]);
    }
    let digits = rest.get(..3)?;
    digits
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_page_command() {
        assert_eq!(read_page_command(0x40), "AT+EFLASHRP=40;0;840\r\n");
        assert_eq!(read_page_command(0xABCD), "AT+EFLASHRP=abcd;0;840\r\n");
        assert_eq!(read_page_command(0), "AT+EFLASHRP=0;0;840\r\n");
    }

    #[test]
    fn test_expected_len() {
        let command = read_page_command(0x40);
        assert_eq!(expected_response_len(command.len()), 2115 + command.len());
    }

    #[test]
    fn test_command_message() {
        assert_eq!(command_message("TST", None), "AT+TST");
        assert_eq!(command_message("SN", Some("1")), "AT+SN=1");
        assert_eq!(command_message("AT+TST", None), "AT+TST");
    }

    #[test]
    fn test_error_code() {
        assert_eq!(error_code("E-1"), Some("-1"));
        assert_eq!(error_code("E042"), Some("042"));
        assert_eq!(error_code("E42"), None);
        assert_eq!(error_code("EFLASH"), None);
        assert_eq!(error_code("O"), None);
    }

    #[test]
    fn test_error_code_with_trailing_text() {
        assert_eq!(error_code("E-1 busy"), Some("-1"));
        assert_eq!(error_code("E101: flash locked"), Some("101"));
        assert_eq!(error_code("E4x2"), None);
        assert_eq!(error_code("OE-1"), None);
    }
}
