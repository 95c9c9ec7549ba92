//! Remote terminal plumbing: telnet option negotiation, turning client bytes
//! into key and resize events, and drawing frames for a remote screen.

use std::io;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::queue;
use crossterm::style::{Attribute, ResetColor, SetAttribute};
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::{Frame, Terminal, TerminalOptions, Viewport};
use termwiz::input::{InputEvent, InputParser, KeyCode as TermKey, Modifiers};
use tracing::debug;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;
const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;
const OPT_NAWS: u8 = 31;

/// Longest subnegotiation payload kept. Anything longer is dropped.
const MAX_SUBNEGOTIATION: usize = 64;
/// Bytes the key parser may swallow without producing an event before it is reset.
const MAX_UNRESOLVED: usize = 64;

/// Options sent on connect: the server echoes, suppresses go-ahead (character
/// mode), and asks the client to report its window size.
pub fn negotiation() -> [u8; 9] {
    [
        IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_NAWS,
    ]
}

/// A decoded unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum TelnetState {
    #[default]
    Data,
    /// A CR was seen; a following LF or NUL belongs to it.
    CarriageReturn,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationIac,
}

/// Separates telnet commands from terminal data. State carries across reads,
/// so every byte is looked at once.
#[derive(Debug, Default)]
struct TelnetFilter {
    state: TelnetState,
    subnegotiation: Vec<u8>,
}

impl TelnetFilter {
    fn filter(&mut self, bytes: &[u8], data: &mut Vec<u8>, inputs: &mut Vec<Input>) {
        for &byte in bytes {
            self.state = match self.state {
                TelnetState::Data => data_byte(byte, data),
                TelnetState::CarriageReturn => match byte {
                    b'\n' | 0 => TelnetState::Data,
                    _ => data_byte(byte, data),
                },
                TelnetState::Command => match byte {
                    WILL..=DONT => TelnetState::Option,
                    SB => {
                        self.subnegotiation.clear();
                        TelnetState::Subnegotiation
                    }
                    // IAC IAC is a literal 0xFF, never valid text on its own.
                    _ => TelnetState::Data,
                },
                TelnetState::Option => TelnetState::Data,
                TelnetState::Subnegotiation => {
                    if byte == IAC {
                        TelnetState::SubnegotiationIac
                    } else {
                        self.push_subnegotiation(byte)
                    }
                }
                TelnetState::SubnegotiationIac => match byte {
                    SE => {
                        inputs.extend(naws_resize(&self.subnegotiation));
                        self.subnegotiation.clear();
                        TelnetState::Data
                    }
                    IAC => self.push_subnegotiation(IAC),
                    _ => TelnetState::Subnegotiation,
                },
            };
        }
    }

    fn push_subnegotiation(&mut self, byte: u8) -> TelnetState {
        if self.subnegotiation.len() >= MAX_SUBNEGOTIATION {
            debug!(
                len = self.subnegotiation.len(),
                "telnet_subnegotiation_discarded"
            );
            self.subnegotiation.clear();
            return TelnetState::Data;
        }
        self.subnegotiation.push(byte);
        TelnetState::Subnegotiation
    }
}

fn data_byte(byte: u8, data: &mut Vec<u8>) -> TelnetState {
    match byte {
        IAC => TelnetState::Command,
        b'\r' => {
            data.push(byte);
            TelnetState::CarriageReturn
        }
        0 => TelnetState::Data,
        _ => {
            data.push(byte);
            TelnetState::Data
        }
    }
}

fn naws_resize(data: &[u8]) -> Option<Input> {
    match data {
        [OPT_NAWS, w_hi, w_lo, h_hi, h_lo] => {
            let width = u16::from_be_bytes([*w_hi, *w_lo]);
            let height = u16::from_be_bytes([*h_hi, *h_lo]);
            (width > 0 && height > 0).then_some(Input::Resize { width, height })
        }
        _ => None,
    }
}

/// Incremental decoder for a telnet client's byte stream.
///
/// Telnet commands are stripped here; the remaining terminal bytes go through
/// termwiz's key parser. A trailing ESC is held back in case the rest of an
/// escape sequence is still in flight; `flush` resolves it once the line goes
/// quiet.
pub struct InputDecoder {
    telnet: TelnetFilter,
    parser: InputParser,
    unresolved: usize,
}

impl Default for InputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDecoder {
    pub fn new() -> Self {
        Self {
            telnet: TelnetFilter::default(),
            parser: InputParser::new(),
            unresolved: 0,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Input> {
        let mut data = Vec::with_capacity(bytes.len());
        let mut inputs = Vec::new();
        self.telnet.filter(bytes, &mut data, &mut inputs);
        if !data.is_empty() {
            self.parse(&data, true, &mut inputs);
        }
        inputs
    }

    pub fn flush(&mut self) -> Vec<Input> {
        let mut inputs = Vec::new();
        self.parse(&[], false, &mut inputs);
        inputs
    }

    fn parse(&mut self, data: &[u8], maybe_more: bool, inputs: &mut Vec<Input>) {
        let mut produced = false;
        self.parser.parse(
            data,
            |event| {
                produced = true;
                if let InputEvent::Key(key) = event
                    && let Some(key) = to_key_event(key)
                {
                    inputs.push(Input::Key(key));
                }
            },
            maybe_more,
        );

        if produced || !maybe_more {
            self.unresolved = 0;
        } else {
            self.unresolved += data.len();
        }
        if self.unresolved > MAX_UNRESOLVED {
            debug!(bytes = self.unresolved, "input_discarded");
            self.parser = InputParser::new();
            self.unresolved = 0;
        }
    }
}

fn to_key_event(key: termwiz::input::KeyEvent) -> Option<KeyEvent> {
    let mut modifiers = KeyModifiers::NONE;
    if key.modifiers.contains(Modifiers::SHIFT) {
        modifiers |= KeyModifiers::SHIFT;
    }
    if key.modifiers.contains(Modifiers::CTRL) {
        modifiers |= KeyModifiers::CONTROL;
    }
    if key.modifiers.contains(Modifiers::ALT) {
        modifiers |= KeyModifiers::ALT;
    }

    let code = match key.key {
        TermKey::Char(c) if c.is_control() => return None,
        TermKey::Char(c) => KeyCode::Char(c),
        TermKey::Enter => KeyCode::Enter,
        TermKey::Tab if modifiers.contains(KeyModifiers::SHIFT) => KeyCode::BackTab,
        TermKey::Tab => KeyCode::Tab,
        TermKey::Backspace => KeyCode::Backspace,
        TermKey::Escape => KeyCode::Esc,
        TermKey::UpArrow | TermKey::ApplicationUpArrow => KeyCode::Up,
        TermKey::DownArrow | TermKey::ApplicationDownArrow => KeyCode::Down,
        TermKey::LeftArrow | TermKey::ApplicationLeftArrow => KeyCode::Left,
        TermKey::RightArrow | TermKey::ApplicationRightArrow => KeyCode::Right,
        TermKey::Home => KeyCode::Home,
        TermKey::End => KeyCode::End,
        TermKey::PageUp => KeyCode::PageUp,
        TermKey::PageDown => KeyCode::PageDown,
        TermKey::Insert => KeyCode::Insert,
        TermKey::Delete => KeyCode::Delete,
        TermKey::Function(n) => KeyCode::F(n),
        _ => return None,
    };
    Some(KeyEvent::new(code, modifiers))
}

/// A client's screen. ratatui draws into an in-memory crossterm backend and
/// each call hands back the bytes to send.
pub struct Screen {
    terminal: Terminal<CrosstermBackend<Vec<u8>>>,
    area: Rect,
}

impl Screen {
    pub fn new(width: u16, height: u16) -> io::Result<Self> {
        let area = Rect::new(0, 0, width, height);
        Ok(Self {
            terminal: fixed_terminal(area)?,
            area,
        })
    }

    /// Switch the client to the alternate screen with a hidden cursor.
    pub fn enter(&mut self) -> io::Result<Vec<u8>> {
        queue!(
            self.terminal.backend_mut().writer_mut(),
            EnterAlternateScreen,
            Hide,
            Clear(ClearType::All)
        )?;
        Ok(self.take_output())
    }

    /// Restore the client's normal screen.
    pub fn leave(&mut self) -> io::Result<Vec<u8>> {
        queue!(
            self.terminal.backend_mut().writer_mut(),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Show,
            LeaveAlternateScreen
        )?;
        Ok(self.take_output())
    }

    /// Start over at a new size. The next frame is drawn in full on a
    /// cleared screen.
    pub fn resize(&mut self, width: u16, height: u16) -> io::Result<()> {
        let area = Rect::new(0, 0, width, height);
        let mut terminal = fixed_terminal(area)?;
        queue!(
            terminal.backend_mut().writer_mut(),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Clear(ClearType::All)
        )?;
        self.terminal = terminal;
        self.area = area;
        Ok(())
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> io::Result<Vec<u8>> {
        self.terminal.draw(render)?;
        Ok(self.take_output())
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(self.terminal.backend_mut().writer_mut())
    }
}

// A fixed viewport never asks the backend for its size, which would query
// the server's own tty.
fn fixed_terminal(area: Rect) -> io::Result<Terminal<CrosstermBackend<Vec<u8>>>> {
    Terminal::with_options(
        CrosstermBackend::new(Vec::new()),
        TerminalOptions {
            viewport: Viewport::Fixed(area),
        },
    )
}
