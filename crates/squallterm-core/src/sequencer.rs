//! Command dispatch: parser events to screen operations.
//!
//! The sequencer owns the per-sequence scratch state (OSC payload buffer,
//! active DCS handler, consecutive-print counter) and the dispatch tables
//! keyed by `(category, final byte, intermediates, private marker)`.
//! Unknown sequences are logged at trace level and discarded.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::cell::Color;
use crate::charset::CharsetId;
use crate::event::{CursorDisplay, CursorShape};
use crate::log::trace;
use crate::parser::{Params, Perform};
use crate::screen::{DynamicColorName, Screen, StatusStringRequest, VtType, hex_decode};
use crate::sixel::SixelDecoder;

/// Longest OSC / buffered-DCS payload accepted. Overlong payloads are
/// truncated and the whole sequence discarded.
pub const MAX_STRING_PAYLOAD: usize = 64 * 1024;

/// Active handler for DCS passthrough bytes.
#[derive(Debug, Default)]
enum DcsHandler {
    #[default]
    None,
    Sixel(Box<SixelDecoder>),
    /// XTGETTCAP: buffered hex-encoded capability names.
    Tcap(Vec<u8>),
    /// DECRQSS: buffered setting selector.
    StatusString(Vec<u8>),
    Ignored,
}

/// Scratch state between parser events.
#[derive(Debug, Default)]
pub struct Sequencer {
    osc: Vec<u8>,
    osc_overflow: bool,
    dcs: DcsHandler,
    /// Consecutive text-output operations; nonzero iff the immediately
    /// preceding operation printed a character.
    instruction_counter: u32,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Screen {
    /// Feed PTY bytes through the parser and dispatch every complete
    /// sequence. All side effects are applied before this returns.
    pub fn write(&mut self, bytes: &[u8]) {
        let mut parser = std::mem::take(&mut self.parser);
        let mut sequencer = std::mem::take(&mut self.sequencer);
        {
            let mut executor = Executor {
                screen: self,
                seq: &mut sequencer,
            };
            parser.feed(bytes, &mut executor);
        }
        self.parser = parser;
        self.sequencer = sequencer;
        self.sink().screen_updated();
        #[cfg(debug_assertions)]
        self.assert_invariants();
    }
}

/// One `write` call's view: the screen plus the sequencer scratch state.
struct Executor<'a> {
    screen: &'a mut Screen,
    seq: &'a mut Sequencer,
}

impl Executor<'_> {
    /// Mark the current operation as non-text, ending any grapheme run.
    fn break_text_run(&mut self) {
        self.seq.instruction_counter = 0;
    }

    fn csi_private(&mut self, marker: u8, params: &Params, intermediates: &[u8], final_byte: u8) {
        match (marker, intermediates, final_byte) {
            (b'?', b"", b'h') => {
                for i in 0..params.len().max(1) {
                    self.screen.set_dec_mode(params.get(i), true);
                }
            }
            (b'?', b"", b'l') => {
                for i in 0..params.len().max(1) {
                    self.screen.set_dec_mode(params.get(i), false);
                }
            }
            // DECRQM, DEC private flavor.
            (b'?', b"$", b'p') => self.screen.request_dec_mode(params.get(0)),
            // DECXCPR.
            (b'?', b"", b'n') if params.get(0) == 6 => {
                self.screen.report_extended_cursor_position();
            }
            // XTSAVE / XTRESTORE.
            (b'?', b"", b's') => {
                let codes: Vec<u16> = params.iter().map(|g| g.first().copied().unwrap_or(0)).collect();
                self.screen.save_modes(&codes);
            }
            (b'?', b"", b'r') => {
                let codes: Vec<u16> = params.iter().map(|g| g.first().copied().unwrap_or(0)).collect();
                self.screen.restore_modes(&codes);
            }
            // XTSMGRAPHICS.
            (b'?', b"", b'S') => {
                let values: Vec<u16> = (2..params.len()).map(|i| params.get(i)).collect();
                self.screen
                    .sm_graphics(params.get(0), params.get(1), &values);
            }
            // DA2.
            (b'>', b"", b'c') if params.get(0) == 0 => self.screen.send_terminal_id(),
            // Screen capture: CSI > Ps ; Ps t (logical flag, line count).
            (b'>', b"", b't') => {
                let logical = params.get(0) == 1;
                let lines = params.get_or(1, self.screen.page_size().lines);
                self.screen.capture_buffer(lines, logical);
            }
            // Mark the current line for marker navigation.
            (b'>', b"", b'M') => self.screen.set_mark(),
            // DA3.
            (b'=', b"", b'c') if params.get(0) == 0 => self.screen.send_unit_id(),
            _ => {
                trace!(
                    marker,
                    final_byte,
                    "unhandled private CSI sequence discarded"
                );
            }
        }
    }

    fn csi_standard(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
        match (intermediates, final_byte) {
            (b"", b'A') => self.screen.move_cursor_up(params.get_or(0, 1)),
            (b"", b'B') => self.screen.move_cursor_down(params.get_or(0, 1)),
            (b"", b'C') => self.screen.move_cursor_forward(params.get_or(0, 1)),
            (b"", b'D') => self.screen.move_cursor_backward(params.get_or(0, 1)),
            (b"", b'E') => self.screen.move_cursor_to_next_line(params.get_or(0, 1)),
            (b"", b'F') => self.screen.move_cursor_to_prev_line(params.get_or(0, 1)),
            (b"", b'G') | (b"", b'`') => {
                self.screen.move_cursor_to_column(params.get_or(0, 1) - 1);
            }
            (b"", b'H') | (b"", b'f') => {
                let line = params.get_or(0, 1) - 1;
                let column = params.get_or(1, 1) - 1;
                self.screen.move_cursor_to(line, column);
            }
            (b"", b'I') => self.screen.cursor_forward_tab(params.get_or(0, 1)),
            (b"", b'J') => match params.get(0) {
                0 => self.screen.clear_to_end_of_screen(),
                1 => self.screen.clear_to_begin_of_screen(),
                2 => self.screen.clear_screen(),
                3 => self.screen.clear_scrollback(),
                _ => {}
            },
            (b"", b'K') => match params.get(0) {
                0 => self.screen.clear_to_end_of_line(),
                1 => self.screen.clear_to_begin_of_line(),
                2 => self.screen.clear_line(),
                _ => {}
            },
            (b"", b'L') => self.screen.insert_lines(params.get_or(0, 1)),
            (b"", b'M') => self.screen.delete_lines(params.get_or(0, 1)),
            (b"", b'P') => self.screen.delete_characters(params.get_or(0, 1)),
            (b"", b'S') => self.screen.scroll_up(params.get_or(0, 1)),
            (b"", b'T') if params.len() <= 1 => self.screen.scroll_down(params.get_or(0, 1)),
            (b"", b'X') => self.screen.erase_characters(params.get_or(0, 1)),
            (b"", b'Z') => self.screen.cursor_backward_tab(params.get_or(0, 1)),
            (b"", b'@') => self.screen.insert_characters(params.get_or(0, 1)),
            (b"", b'a') => self.screen.move_cursor_forward(params.get_or(0, 1)),
            (b"", b'b') => self.screen.repeat_last_character(params.get_or(0, 1)),
            (b"", b'c') if params.get(0) == 0 => self.screen.send_device_attributes(),
            (b"", b'd') => self.screen.move_cursor_to_line(params.get_or(0, 1) - 1),
            (b"", b'e') => self.screen.move_cursor_down(params.get_or(0, 1)),
            (b"", b'g') => match params.get(0) {
                0 => self.screen.clear_tab_under_cursor(),
                3 => self.screen.clear_all_tabs(),
                _ => {}
            },
            (b"", b'h') => {
                for i in 0..params.len().max(1) {
                    self.screen.set_ansi_mode(params.get(i), true);
                }
            }
            (b"", b'l') => {
                for i in 0..params.len().max(1) {
                    self.screen.set_ansi_mode(params.get(i), false);
                }
            }
            (b"", b'm') => apply_sgr(self.screen, params),
            (b"", b'n') => match params.get(0) {
                5 => self.screen.device_status_report(),
                6 => self.screen.report_cursor_position(),
                _ => {}
            },
            (b"", b'r') => {
                let top = match params.get(0) {
                    0 => None,
                    v => Some(v),
                };
                let bottom = match params.get(1) {
                    0 => None,
                    v => Some(v),
                };
                self.screen.set_top_bottom_margin(top, bottom);
            }
            (b"", b's') => {
                if params.is_empty() {
                    self.screen.save_cursor();
                } else {
                    let left = match params.get(0) {
                        0 => None,
                        v => Some(v),
                    };
                    let right = match params.get(1) {
                        0 => None,
                        v => Some(v),
                    };
                    self.screen.set_left_right_margin(left, right);
                }
            }
            (b"", b't') => {
                self.screen
                    .window_op(params.get(0), params.get(1), params.get(2));
            }
            (b"", b'u') => self.screen.restore_cursor(),
            // DECSCUSR.
            (b" ", b'q') => {
                let (display, shape) = match params.get(0) {
                    0 | 1 => (CursorDisplay::Blinking, CursorShape::Block),
                    2 => (CursorDisplay::Steady, CursorShape::Block),
                    3 => (CursorDisplay::Blinking, CursorShape::Underscore),
                    4 => (CursorDisplay::Steady, CursorShape::Underscore),
                    5 => (CursorDisplay::Blinking, CursorShape::Bar),
                    _ => (CursorDisplay::Steady, CursorShape::Bar),
                };
                self.screen.set_cursor_style(display, shape);
            }
            // DECSTR.
            (b"!", b'p') => self.screen.reset_soft(),
            // DECSCL.
            (b"\"", b'p') => {
                let level = match params.get(0) {
                    61 => VtType::VT100,
                    62 => VtType::VT220,
                    63 => VtType::VT320,
                    64 => VtType::VT420,
                    65 => VtType::VT525,
                    _ => return,
                };
                self.screen.select_conformance_level(level);
            }
            // DECRQM, ANSI flavor.
            (b"$", b'p') => self.screen.request_ansi_mode(params.get(0)),
            // DECRQPSR: only the tab-stop report is supported.
            (b"$", b'w') => {
                if params.get(0) == 2 {
                    self.screen.request_tab_stops();
                }
            }
            // DECCRA. Page parameters (5 and 8) are accepted and ignored.
            (b"$", b'v') => {
                let top = params.get_or(0, 1) - 1;
                let left = params.get_or(1, 1) - 1;
                let bottom = params.get_or(2, self.screen.page_size().lines) - 1;
                let right = params.get_or(3, self.screen.page_size().columns) - 1;
                let to_top = params.get_or(5, 1) - 1;
                let to_left = params.get_or(6, 1) - 1;
                self.screen
                    .copy_area(top, left, bottom, right, to_top, to_left);
            }
            // DECERA.
            (b"$", b'z') => {
                let top = params.get_or(0, 1) - 1;
                let left = params.get_or(1, 1) - 1;
                let bottom = params.get_or(2, self.screen.page_size().lines) - 1;
                let right = params.get_or(3, self.screen.page_size().columns) - 1;
                self.screen.erase_area(top, left, bottom, right);
            }
            // DECFRA.
            (b"$", b'x') => {
                let ch = char::from_u32(u32::from(params.get(0))).unwrap_or(' ');
                let top = params.get_or(1, 1) - 1;
                let left = params.get_or(2, 1) - 1;
                let bottom = params.get_or(3, self.screen.page_size().lines) - 1;
                let right = params.get_or(4, self.screen.page_size().columns) - 1;
                self.screen.fill_area(ch, top, left, bottom, right);
            }
            // DECIC / DECDC.
            (b"'", b'}') => self.screen.insert_columns(params.get_or(0, 1)),
            (b"'", b'~') => self.screen.delete_columns(params.get_or(0, 1)),
            _ => {
                trace!(final_byte, "unhandled CSI sequence discarded");
            }
        }
    }

    fn dispatch_osc(&mut self) {
        let payload = std::mem::take(&mut self.seq.osc);
        if std::mem::take(&mut self.seq.osc_overflow) {
            trace!("overlong OSC payload discarded");
            return;
        }
        // Codes like OSC 104 may arrive without any `;` or payload.
        let (code_bytes, rest_bytes) = match payload.iter().position(|&b| b == b';') {
            Some(split) => (&payload[..split], &payload[split + 1..]),
            None => (&payload[..], &payload[..0]),
        };
        let Ok(code) = core::str::from_utf8(code_bytes) else {
            return;
        };
        let Ok(code) = code.parse::<u16>() else {
            return;
        };
        let rest = String::from_utf8_lossy(rest_bytes).into_owned();

        match code {
            0 | 1 | 2 => self.screen.set_window_title(&rest),
            4 => {
                // OSC 4 ; index ; spec [; index ; spec]...
                let mut fields = rest.split(';');
                while let (Some(index), Some(spec)) = (fields.next(), fields.next()) {
                    let Ok(index) = index.parse::<u8>() else {
                        continue;
                    };
                    if spec == "?" {
                        self.screen.request_indexed_color(index);
                    } else if let Some(color) = crate::palette::RgbColor::parse(spec) {
                        self.screen.set_indexed_color(index, color);
                    }
                }
            }
            7 => self.screen.set_working_directory(&rest),
            8 => {
                // OSC 8 ; params ; uri — params are colon-separated k=v.
                let Some(split) = rest.find(';') else {
                    return;
                };
                let (link_params, uri) = rest.split_at(split);
                let uri = &uri[1..];
                let tag = link_params
                    .split(':')
                    .find_map(|kv| kv.strip_prefix("id="));
                self.screen.hyperlink(tag, uri);
            }
            10 | 11 | 12 => {
                let name = match code {
                    10 => DynamicColorName::Foreground,
                    11 => DynamicColorName::Background,
                    _ => DynamicColorName::Cursor,
                };
                if rest == "?" {
                    self.screen.request_dynamic_color(name);
                } else if let Some(color) = crate::palette::RgbColor::parse(&rest) {
                    self.screen.set_dynamic_color(name, color);
                }
            }
            52 => {
                // OSC 52 ; clipboard ; base64-data. Clipboard reads are
                // refused: no reply, no callback.
                let Some(split) = rest.find(';') else {
                    return;
                };
                let data = &rest[split + 1..];
                if data == "?" {
                    return;
                }
                if let Ok(decoded) = BASE64.decode(data) {
                    let text = String::from_utf8_lossy(&decoded).into_owned();
                    self.screen.copy_to_clipboard(&text);
                }
            }
            104 => {
                if rest.is_empty() {
                    self.screen.reset_indexed_color(None);
                } else {
                    for index in rest.split(';').filter_map(|s| s.parse::<u8>().ok()) {
                        self.screen.reset_indexed_color(Some(index));
                    }
                }
            }
            110 => self.screen.reset_dynamic_color(DynamicColorName::Foreground),
            111 => self.screen.reset_dynamic_color(DynamicColorName::Background),
            112 => self.screen.reset_dynamic_color(DynamicColorName::Cursor),
            777 => {
                // OSC 777 ; notify ; title ; body.
                let mut fields = rest.splitn(3, ';');
                if fields.next() == Some("notify") {
                    let title = fields.next().unwrap_or_default().to_string();
                    let body = fields.next().unwrap_or_default().to_string();
                    self.screen.notify(&title, &body);
                }
            }
            _ => {
                trace!(code, "unhandled OSC discarded");
            }
        }
    }

    fn finish_dcs(&mut self) {
        match std::mem::take(&mut self.seq.dcs) {
            DcsHandler::None | DcsHandler::Ignored => {}
            DcsHandler::Sixel(decoder) => {
                if let Some((format, size, pixels)) = decoder.finish() {
                    self.screen.sixel_image(format, size, pixels);
                }
            }
            DcsHandler::Tcap(payload) => {
                for hex_name in payload.split(|&b| b == b';') {
                    match hex_decode(hex_name)
                        .and_then(|name| String::from_utf8(name).ok())
                    {
                        Some(name) => self.screen.request_capability(&name),
                        None => self.screen.reply_str("\x1bP0+r\x1b\\"),
                    }
                }
            }
            DcsHandler::StatusString(payload) => {
                let request = match payload.as_slice() {
                    b"m" => Some(StatusStringRequest::Sgr),
                    b"\"p" => Some(StatusStringRequest::ConformanceLevel),
                    b" q" => Some(StatusStringRequest::CursorStyle),
                    b"r" => Some(StatusStringRequest::TopBottomMargin),
                    b"s" => Some(StatusStringRequest::LeftRightMargin),
                    b"$|" => Some(StatusStringRequest::ColumnsPerPage),
                    b"*|" => Some(StatusStringRequest::LinesPerScreen),
                    b"t" => Some(StatusStringRequest::LinesPerPage),
                    _ => None,
                };
                match request {
                    Some(request) => self.screen.request_status_string(request),
                    None => self.screen.reply_status_string_invalid(),
                }
            }
        }
    }
}

impl Perform for Executor<'_> {
    fn print(&mut self, ch: char) {
        let consecutive = self.seq.instruction_counter > 0;
        self.screen.write_text(ch, consecutive);
        self.seq.instruction_counter = self.seq.instruction_counter.saturating_add(1);
    }

    fn execute(&mut self, byte: u8) {
        self.break_text_run();
        match byte {
            0x07 => self.screen.bell(),
            0x08 => self.screen.backspace(),
            0x09 => self.screen.move_cursor_to_next_tab(),
            0x0A..=0x0C => self.screen.linefeed(),
            0x0D => self.screen.carriage_return(),
            // SO / SI: lock GL onto G1 / G0.
            0x0E => self.screen.lock_shift(1),
            0x0F => self.screen.lock_shift(0),
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8) {
        self.break_text_run();
        match (intermediates, final_byte) {
            (b"", b'7') => self.screen.save_cursor(),
            (b"", b'8') => self.screen.restore_cursor(),
            (b"", b'D') => self.screen.index(),
            (b"", b'E') => self.screen.next_line(),
            (b"", b'H') => self.screen.set_tab_under_cursor(),
            (b"", b'M') => self.screen.reverse_index(),
            (b"", b'6') => self.screen.back_index(),
            (b"", b'9') => self.screen.forward_index(),
            (b"", b'N') => self.screen.single_shift(2),
            (b"", b'O') => self.screen.single_shift(3),
            (b"", b'c') => self.screen.reset_hard(),
            (b"", b'=') => self.screen.set_application_keypad_mode(true),
            (b"", b'>') => self.screen.set_application_keypad_mode(false),
            (b"", b'n') => self.screen.lock_shift(2),
            (b"", b'o') => self.screen.lock_shift(3),
            (b"", b'\\') => {} // ST after a string sequence
            (b"#", b'8') => self.screen.screen_alignment_pattern(),
            (b"(", designator) => {
                self.screen
                    .designate_charset(0, CharsetId::from_designator(designator));
            }
            (b")", designator) => {
                self.screen
                    .designate_charset(1, CharsetId::from_designator(designator));
            }
            (b"*", designator) => {
                self.screen
                    .designate_charset(2, CharsetId::from_designator(designator));
            }
            (b"+", designator) => {
                self.screen
                    .designate_charset(3, CharsetId::from_designator(designator));
            }
            _ => {
                trace!(final_byte, "unhandled ESC sequence discarded");
            }
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
        self.break_text_run();
        match intermediates.first().copied() {
            Some(marker @ b'<'..=b'?') => {
                self.csi_private(marker, params, &intermediates[1..], final_byte);
            }
            _ => self.csi_standard(params, intermediates, final_byte),
        }
    }

    fn osc_start(&mut self) {
        self.break_text_run();
        self.seq.osc.clear();
        self.seq.osc_overflow = false;
    }

    fn osc_put(&mut self, byte: u8) {
        if self.seq.osc.len() < MAX_STRING_PAYLOAD {
            self.seq.osc.push(byte);
        } else {
            self.seq.osc_overflow = true;
        }
    }

    fn osc_end(&mut self) {
        self.dispatch_osc();
    }

    fn hook(&mut self, params: &Params, intermediates: &[u8], final_byte: u8) {
        self.break_text_run();
        self.seq.dcs = match (intermediates, final_byte) {
            (b"", b'q') => DcsHandler::Sixel(Box::new(SixelDecoder::new(params))),
            (b"+", b'q') => DcsHandler::Tcap(Vec::new()),
            (b"$", b'q') => DcsHandler::StatusString(Vec::new()),
            _ => {
                trace!(final_byte, "unhandled DCS sequence discarded");
                DcsHandler::Ignored
            }
        };
    }

    fn put(&mut self, byte: u8) {
        match &mut self.seq.dcs {
            DcsHandler::Sixel(decoder) => decoder.put(byte),
            DcsHandler::Tcap(buf) | DcsHandler::StatusString(buf) => {
                if buf.len() < MAX_STRING_PAYLOAD {
                    buf.push(byte);
                } else {
                    self.seq.dcs = DcsHandler::Ignored;
                }
            }
            DcsHandler::None | DcsHandler::Ignored => {}
        }
    }

    fn unhook(&mut self) {
        self.finish_dcs();
    }
}

/// Fold one SGR parameter list into the screen's current rendition.
fn apply_sgr(screen: &mut Screen, params: &Params) {
    use crate::cell::StyleFlags;

    let rendition = screen.rendition_mut();
    if params.is_empty() {
        rendition.reset();
        return;
    }

    let mut i = 0;
    while i < params.len() {
        let group = params.group(i);
        let code = group.first().copied().unwrap_or(0);
        match code {
            0 => rendition.reset(),
            1 => rendition.flags.insert(StyleFlags::BOLD),
            2 => rendition.flags.insert(StyleFlags::FAINT),
            3 => rendition.flags.insert(StyleFlags::ITALIC),
            4 => {
                rendition.flags.remove(StyleFlags::ANY_UNDERLINE);
                match group.get(1).copied().unwrap_or(1) {
                    0 => {}
                    2 => rendition.flags.insert(StyleFlags::DOUBLE_UNDERLINE),
                    3 => rendition.flags.insert(StyleFlags::CURLY_UNDERLINE),
                    4 => rendition.flags.insert(StyleFlags::DOTTED_UNDERLINE),
                    5 => rendition.flags.insert(StyleFlags::DASHED_UNDERLINE),
                    _ => rendition.flags.insert(StyleFlags::UNDERLINE),
                }
            }
            5 | 6 => rendition.flags.insert(StyleFlags::BLINK),
            7 => rendition.flags.insert(StyleFlags::INVERSE),
            8 => rendition.flags.insert(StyleFlags::HIDDEN),
            9 => rendition.flags.insert(StyleFlags::CROSSED_OUT),
            21 => {
                rendition.flags.remove(StyleFlags::ANY_UNDERLINE);
                rendition.flags.insert(StyleFlags::DOUBLE_UNDERLINE);
            }
            22 => rendition.flags.remove(StyleFlags::BOLD | StyleFlags::FAINT),
            23 => rendition.flags.remove(StyleFlags::ITALIC),
            24 => rendition.flags.remove(StyleFlags::ANY_UNDERLINE),
            25 => rendition.flags.remove(StyleFlags::BLINK),
            27 => rendition.flags.remove(StyleFlags::INVERSE),
            28 => rendition.flags.remove(StyleFlags::HIDDEN),
            29 => rendition.flags.remove(StyleFlags::CROSSED_OUT),
            30..=37 => rendition.fg = Color::Indexed((code - 30) as u8),
            38 => {
                let (color, consumed) = parse_extended_color(params, i);
                if let Some(color) = color {
                    rendition.fg = color;
                }
                i += consumed;
            }
            39 => rendition.fg = Color::Default,
            40..=47 => rendition.bg = Color::Indexed((code - 40) as u8),
            48 => {
                let (color, consumed) = parse_extended_color(params, i);
                if let Some(color) = color {
                    rendition.bg = color;
                }
                i += consumed;
            }
            49 => rendition.bg = Color::Default,
            51 => rendition.flags.insert(StyleFlags::FRAMED),
            53 => rendition.flags.insert(StyleFlags::OVERLINE),
            54 => rendition.flags.remove(StyleFlags::FRAMED),
            55 => rendition.flags.remove(StyleFlags::OVERLINE),
            58 => {
                let (color, consumed) = parse_extended_color(params, i);
                if let Some(color) = color {
                    rendition.underline_color = color;
                }
                i += consumed;
            }
            59 => rendition.underline_color = Color::Undefined,
            90..=97 => rendition.fg = Color::Bright((code - 90) as u8),
            100..=107 => rendition.bg = Color::Bright((code - 100) as u8),
            _ => {
                trace!(code, "unhandled SGR parameter ignored");
            }
        }
        i += 1;
    }
}

/// Parse a 38/48/58 extended color, in either the colon-subparameter or the
/// legacy semicolon form. Returns the color and how many *extra* top-level
/// parameter groups were consumed.
fn parse_extended_color(params: &Params, at: usize) -> (Option<Color>, usize) {
    let group = params.group(at);
    if group.len() > 1 {
        // Colon form: 38:5:n or 38:2[:colorspace]:r:g:b.
        let color = match group.get(1).copied() {
            Some(5) => group.get(2).map(|&n| Color::Indexed(n.min(255) as u8)),
            Some(2) => {
                let rgb: Vec<u16> = match group.len() {
                    // 38:2:r:g:b
                    5 => group[2..5].to_vec(),
                    // 38:2:colorspace:r:g:b
                    6.. => group[3..6].to_vec(),
                    _ => return (None, 0),
                };
                Some(Color::Rgb(
                    rgb[0].min(255) as u8,
                    rgb[1].min(255) as u8,
                    rgb[2].min(255) as u8,
                ))
            }
            _ => None,
        };
        (color, 0)
    } else {
        // Semicolon form: consume following parameter groups.
        match params.get(at + 1) {
            5 => (
                Some(Color::Indexed(params.get(at + 2).min(255) as u8)),
                2,
            ),
            2 => (
                Some(Color::Rgb(
                    params.get(at + 2).min(255) as u8,
                    params.get(at + 3).min(255) as u8,
                    params.get(at + 4).min(255) as u8,
                )),
                4,
            ),
            _ => (None, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::StyleFlags;
    use crate::event::{EventSink, NullSink, ScreenType};
    use crate::grid::{CellPos, PageSize};
    use crate::input::{MouseProtocol, MouseTransport};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn screen(lines: u16, columns: u16) -> Screen {
        Screen::new(PageSize::new(lines, columns), 100, Box::new(NullSink))
    }

    #[test]
    fn text_and_controls_flow_to_the_grid() {
        let mut s = screen(2, 5);
        s.write(b"ab\r\ncd");
        assert_eq!(s.render_text(), "ab   \ncd   \n");
        assert_eq!(s.cursor().pos, CellPos::new(1, 2));
    }

    #[test]
    fn cup_moves_one_based() {
        let mut s = screen(5, 10);
        s.write(b"\x1b[3;7H");
        assert_eq!(s.cursor().pos, CellPos::new(2, 6));
        s.write(b"\x1b[H");
        assert_eq!(s.cursor().pos, CellPos::new(0, 0));
    }

    #[test]
    fn sgr_attributes_accumulate() {
        let mut s = screen(1, 10);
        s.write(b"\x1b[1;3;4m");
        let flags = s.rendition().flags;
        assert!(flags.contains(StyleFlags::BOLD));
        assert!(flags.contains(StyleFlags::ITALIC));
        assert!(flags.contains(StyleFlags::UNDERLINE));
        s.write(b"\x1b[22;24m");
        let flags = s.rendition().flags;
        assert!(!flags.contains(StyleFlags::BOLD));
        assert!(!flags.contains(StyleFlags::UNDERLINE));
        assert!(flags.contains(StyleFlags::ITALIC));
    }

    #[test]
    fn sgr_extended_colors_both_forms() {
        let mut s = screen(1, 10);
        s.write(b"\x1b[38;2;10;20;30m");
        assert_eq!(s.rendition().fg, Color::Rgb(10, 20, 30));
        s.write(b"\x1b[48;5;100m");
        assert_eq!(s.rendition().bg, Color::Indexed(100));
        s.write(b"\x1b[38:2:1:2:3m");
        assert_eq!(s.rendition().fg, Color::Rgb(1, 2, 3));
        s.write(b"\x1b[38:5:42m");
        assert_eq!(s.rendition().fg, Color::Indexed(42));
        // Colon form with an (empty) colorspace subparameter.
        s.write(b"\x1b[58:2::9:8:7m");
        assert_eq!(s.rendition().underline_color, Color::Rgb(9, 8, 7));
    }

    #[test]
    fn sgr_curly_underline_subparam() {
        let mut s = screen(1, 10);
        s.write(b"\x1b[4:3m");
        assert!(s.rendition().flags.contains(StyleFlags::CURLY_UNDERLINE));
        s.write(b"\x1b[4:0m");
        assert!(!s.rendition().flags.contains(StyleFlags::CURLY_UNDERLINE));
    }

    #[test]
    fn sgr_zero_resets_everything() {
        let mut s = screen(1, 10);
        s.write(b"\x1b[1;38;2;9;9;9;48;5;3m\x1b[m");
        assert_eq!(s.rendition(), crate::cell::Rendition::default());
    }

    #[test]
    fn reverse_index_scenario() {
        let mut s = screen(5, 5);
        s.write(b"12345\r\n67890\r\nABCDE\r\nFGHIJ\r\nKLMNO");
        s.write(b"\x1b[1;2H");
        s.write(b"\x1bM");
        assert_eq!(s.render_text(), "     \n12345\n67890\nABCDE\nFGHIJ\n");
    }

    #[test]
    fn decstbm_and_index_scenario() {
        let mut s = screen(5, 5);
        s.write(b"12345\r\n67890\r\nABCDE\r\nFGHIJ\r\nKLMNO");
        s.write(b"\x1b[2;4r");
        s.write(b"\x1b[4;3H");
        s.write(b"\x1bD");
        assert_eq!(s.render_text(), "12345\nABCDE\nFGHIJ\n     \nKLMNO\n");
    }

    #[test]
    fn osc_title_and_hyperlink() {
        let mut s = screen(1, 10);
        s.write(b"\x1b]2;my title\x07");
        assert_eq!(s.window_title(), "my title");

        s.write(b"\x1b]8;;https://example\x1b\\X\x1b]8;;\x1b\\Y");
        let line = &s.grid().page()[0];
        let x_link = line.cells()[0].hyperlink;
        assert_eq!(
            s.hyperlinks().get(x_link).map(|l| l.uri.as_str()),
            Some("https://example")
        );
        assert_eq!(line.cells()[1].hyperlink, 0);
    }

    #[test]
    fn osc_8_id_param_shares_entry() {
        let mut s = screen(1, 10);
        s.write(b"\x1b]8;id=x;https://a\x1b\\A\x1b]8;;\x1b\\");
        s.write(b"\x1b]8;id=x;https://a\x1b\\B\x1b]8;;\x1b\\");
        let line = &s.grid().page()[0];
        assert_eq!(line.cells()[0].hyperlink, line.cells()[1].hyperlink);
    }

    #[test]
    fn decrqm_reply_matches_mode_state() {
        let mut s = screen(2, 2);
        s.write(b"\x1b[?1000h");
        s.write(b"\x1b[?1000$p");
        assert_eq!(s.drain_replies(), b"\x1b[?1000;1$y");
    }

    #[test]
    fn dsr_and_cpr_replies() {
        let mut s = screen(5, 5);
        s.write(b"\x1b[3;4H\x1b[6n\x1b[5n");
        assert_eq!(s.drain_replies(), b"\x1b[3;4R\x1b[0n");
    }

    #[test]
    fn da_requests() {
        let mut s = screen(2, 2);
        s.write(b"\x1b[c");
        assert!(s.drain_replies().starts_with(b"\x1b[?65;"));
        s.write(b"\x1b[>c");
        let reply = s.drain_replies();
        assert!(reply.starts_with(b"\x1b[>65;"));
        assert!(reply.ends_with(b";0c"));
        s.write(b"\x1b[=c");
        assert_eq!(s.drain_replies(), b"\x1bP!|00000000\x1b\\");
    }

    #[test]
    fn decrqss_roundtrip_through_dcs() {
        let mut s = screen(10, 20);
        s.write(b"\x1b[3;8r");
        s.write(b"\x1bP$qr\x1b\\");
        assert_eq!(s.drain_replies(), b"\x1bP1$r3;8r\x1b\\");

        s.write(b"\x1bP$qzz\x1b\\");
        assert_eq!(s.drain_replies(), b"\x1bP0$r\x1b\\");
    }

    #[test]
    fn xtgettcap_roundtrip_through_dcs() {
        let mut s = screen(24, 80);
        // "TN" hex-encoded is 544E.
        s.write(b"\x1bP+q544E\x1b\\");
        let reply = s.drain_replies();
        let expected_value = crate::screen::hex_encode(b"xterm-256color");
        let expected = format!("\x1bP1+r544E={expected_value}\x1b\\");
        assert_eq!(reply, expected.as_bytes());

        s.write(b"\x1bP+q7A7A\x1b\\");
        assert_eq!(s.drain_replies(), b"\x1bP0+r\x1b\\");
    }

    #[test]
    fn sixel_dcs_produces_an_image() {
        let mut s = screen(4, 4);
        s.set_cell_pixel_size(2, 6);
        s.write(b"\x1bPq~~\x1b\\");
        assert_eq!(s.images().len(), 1);
        assert!(s.grid().page()[0].cells()[0].image.is_some());
    }

    #[test]
    fn xtsave_xtrestore_roundtrip() {
        let mut s = screen(2, 2);
        s.write(b"\x1b[?2004h");
        s.write(b"\x1b[?2004s");
        s.write(b"\x1b[?2004l");
        assert!(!s.modes().enabled(crate::modes::DecMode::BracketedPaste));
        s.write(b"\x1b[?2004r");
        assert!(s.modes().enabled(crate::modes::DecMode::BracketedPaste));
    }

    #[test]
    fn charset_designation_maps_line_drawing() {
        let mut s = screen(1, 5);
        s.write(b"\x1b(0qqx\x1b(Bq");
        assert_eq!(s.render_text(), "──│q \n");
    }

    #[test]
    fn grapheme_run_breaks_on_control() {
        let mut s = screen(1, 5);
        // The combining mark right after 'e' joins it; after a cursor
        // movement a new mark starts its own cell.
        s.write("e\u{0301}".as_bytes());
        assert_eq!(s.grid().page()[0].cells()[0].text(), "e\u{0301}");
        s.write(b"\x1b[1;1H");
        s.write("\u{0301}".as_bytes());
        assert_eq!(s.grid().page()[0].cells()[0].text(), "\u{0301}");
    }

    /// Sink that records interesting callbacks for assertions.
    #[derive(Default)]
    struct Recording {
        titles: Vec<String>,
        clipboard: Vec<String>,
        notifications: Vec<(String, String)>,
        bells: usize,
        buffers: Vec<ScreenType>,
        mouse: Vec<(MouseProtocol, bool)>,
        transports: Vec<MouseTransport>,
        bracketed: Vec<bool>,
    }

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Recording>>);

    impl EventSink for SharedSink {
        fn set_window_title(&mut self, title: &str) {
            self.0.borrow_mut().titles.push(title.to_string());
        }
        fn copy_to_clipboard(&mut self, data: &str) {
            self.0.borrow_mut().clipboard.push(data.to_string());
        }
        fn notify(&mut self, title: &str, body: &str) {
            self.0
                .borrow_mut()
                .notifications
                .push((title.to_string(), body.to_string()));
        }
        fn bell(&mut self) {
            self.0.borrow_mut().bells += 1;
        }
        fn buffer_changed(&mut self, screen_type: ScreenType) {
            self.0.borrow_mut().buffers.push(screen_type);
        }
        fn set_mouse_protocol(&mut self, protocol: MouseProtocol, enable: bool) {
            self.0.borrow_mut().mouse.push((protocol, enable));
        }
        fn set_mouse_transport(&mut self, transport: MouseTransport) {
            self.0.borrow_mut().transports.push(transport);
        }
        fn set_bracketed_paste(&mut self, enable: bool) {
            self.0.borrow_mut().bracketed.push(enable);
        }
    }

    fn recording_screen(lines: u16, columns: u16) -> (Screen, Rc<RefCell<Recording>>) {
        let sink = SharedSink::default();
        let record = sink.0.clone();
        (
            Screen::new(PageSize::new(lines, columns), 100, Box::new(sink)),
            record,
        )
    }

    #[test]
    fn osc_52_decodes_clipboard_payload() {
        let (mut s, record) = recording_screen(1, 5);
        // "hi" in base64 is aGk=.
        s.write(b"\x1b]52;c;aGk=\x07");
        assert_eq!(record.borrow().clipboard, vec!["hi".to_string()]);
        // Queries are refused silently.
        s.write(b"\x1b]52;c;?\x07");
        assert_eq!(record.borrow().clipboard.len(), 1);
        assert!(s.drain_replies().is_empty());
    }

    #[test]
    fn osc_777_notification() {
        let (mut s, record) = recording_screen(1, 5);
        s.write(b"\x1b]777;notify;Build;done\x1b\\");
        assert_eq!(
            record.borrow().notifications,
            vec![("Build".to_string(), "done".to_string())]
        );
    }

    #[test]
    fn bell_and_buffer_events_fire() {
        let (mut s, record) = recording_screen(2, 2);
        s.write(b"\x07\x1b[?1049h\x1b[?1049l");
        let record = record.borrow();
        assert_eq!(record.bells, 1);
        assert_eq!(
            record.buffers,
            vec![ScreenType::Alternate, ScreenType::Primary]
        );
    }

    #[test]
    fn mouse_mode_sequences_reach_the_sink() {
        let (mut s, record) = recording_screen(2, 2);
        s.write(b"\x1b[?1002h\x1b[?1006h\x1b[?2004h");
        let record = record.borrow();
        assert_eq!(
            record.mouse,
            vec![(MouseProtocol::ButtonTracking, true)]
        );
        assert_eq!(record.transports, vec![MouseTransport::Sgr]);
        assert_eq!(record.bracketed, vec![true]);
    }

    #[test]
    fn unknown_sequences_are_silently_discarded() {
        let mut s = screen(2, 5);
        s.write(b"a\x1b[99999z\x1b]9999;x\x07\x1bPzjunk\x1b\\b");
        assert_eq!(s.render_text(), "ab   \n     \n");
        assert!(s.drain_replies().is_empty());
    }

    #[test]
    fn deccra_copies_rectangle() {
        let mut s = screen(4, 4);
        s.write(b"ab\r\ncd");
        // Copy rows 1-2, cols 1-2 to row 3, col 3.
        s.write(b"\x1b[1;1;2;2;1;3;3;1$v");
        assert_eq!(s.render_text(), "ab  \ncd  \n  ab\n  cd\n");
    }

    #[test]
    fn decfra_fills_rectangle() {
        let mut s = screen(2, 4);
        // Fill with '*' (42).
        s.write(b"\x1b[42;1;2;2;3$x");
        assert_eq!(s.render_text(), " ** \n ** \n");
    }

    #[test]
    fn decic_decdc_shift_columns() {
        let mut s = screen(2, 5);
        s.write(b"abcd\r\nefgh");
        s.write(b"\x1b[1;2H");
        s.write(b"\x1b[1'}");
        assert_eq!(s.render_text(), "a bcd\ne fgh\n");
        s.write(b"\x1b[1'~");
        assert_eq!(s.render_text(), "abcd \nefgh \n");
    }

    #[test]
    fn rep_repeats_through_sequencer() {
        let mut s = screen(1, 8);
        s.write(b"x\x1b[3b");
        assert_eq!(s.render_text(), "xxxx    \n");
    }
}
