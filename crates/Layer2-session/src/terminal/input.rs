//! Input encoding for session PTYs.
//!
//! Converts keys typed into a terminal surface into the byte sequences the
//! agent CLI expects.

/// Bracketed-paste wrapped newline. Agent CLIs read it as a literal newline
/// in the prompt instead of a submit.
pub const SHIFT_ENTER: &[u8] = b"\x1b[200~\n\x1b[201~";

const PASTE_START: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

/// Keys a surface forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Ctrl + letter
    Ctrl(char),
    Enter,
    ShiftEnter,
    Tab,
    BackTab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Delete,
    PageUp,
    PageDown,
}

/// Convert a key to bytes for the PTY.
///
/// Returns None for combinations with no terminal encoding.
pub fn encode_key(key: Key) -> Option<Vec<u8>> {
    let bytes = match key {
        Key::Char(ch) => {
            let mut buffer = [0u8; 4];
            ch.encode_utf8(&mut buffer).as_bytes().to_vec()
        }
        Key::Ctrl(ch) => {
            let lowercase = ch.to_ascii_lowercase();
            if !lowercase.is_ascii_lowercase() {
                return None;
            }
            vec![(lowercase as u8 - b'a') + 1]
        }
        Key::Enter => vec![b'\r'],
        Key::ShiftEnter => SHIFT_ENTER.to_vec(),
        Key::Tab => vec![b'\t'],
        Key::BackTab => b"\x1b[Z".to_vec(),
        Key::Backspace => vec![0x7f],
        Key::Escape => vec![0x1b],
        Key::Up => b"\x1b[A".to_vec(),
        Key::Down => b"\x1b[B".to_vec(),
        Key::Right => b"\x1b[C".to_vec(),
        Key::Left => b"\x1b[D".to_vec(),
        Key::Home => b"\x1b[H".to_vec(),
        Key::End => b"\x1b[F".to_vec(),
        Key::Delete => b"\x1b[3~".to_vec(),
        Key::PageUp => b"\x1b[5~".to_vec(),
        Key::PageDown => b"\x1b[6~".to_vec(),
    };
    Some(bytes)
}

/// Wrap pasted text in bracketed-paste markers
pub fn encode_paste(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + PASTE_START.len() + PASTE_END.len());
    bytes.extend_from_slice(PASTE_START);
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(PASTE_END);
    bytes
}
