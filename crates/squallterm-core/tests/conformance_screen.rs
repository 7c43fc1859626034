//! End-to-end conformance scenarios: PTY bytes in, rendered page text and
//! reply bytes out.
//!
//! Page text is compared with trailing blanks preserved and `\n` between
//! lines, matching how a renderer would consume the grid.

use std::cell::RefCell;
use std::rc::Rc;

use squallterm_core::{
    CellPos, EventSink, InputGenerator, LineOffset, Modifier, MouseProtocol, MouseTransport,
    NullSink, PageSize, Screen, ScreenType,
};

fn screen(lines: u16, columns: u16) -> Screen {
    Screen::new(PageSize::new(lines, columns), 1000, Box::new(NullSink))
}

#[test]
fn basic_text_with_autowrap() {
    let mut s = screen(3, 5);
    s.write(b"ab");
    assert_eq!(s.cursor().pos, CellPos::new(0, 2));
    s.write(b"CD");
    assert_eq!(s.render_text(), "abCD \n     \n     \n");
    assert_eq!(s.cursor().pos, CellPos::new(0, 4));
}

#[test]
fn autowrap_across_lines() {
    let mut s = screen(3, 5);
    s.write(b"ab");
    assert_eq!(s.cursor().pos, CellPos::new(0, 2));
    s.write(b"CDEFG");
    assert_eq!(s.render_text(), "abCDE\nFG   \n     \n");
    assert_eq!(s.cursor().pos, CellPos::new(1, 2));
}

#[test]
fn reverse_index_at_top_of_page() {
    let mut s = screen(5, 5);
    s.write(b"12345\r\n67890\r\nABCDE\r\nFGHIJ\r\nKLMNO");
    s.write(b"\x1b[1;2H");
    s.write(b"\x1bM");
    assert_eq!(s.render_text(), "     \n12345\n67890\nABCDE\nFGHIJ\n");
}

#[test]
fn index_inside_scroll_region() {
    let mut s = screen(5, 5);
    s.write(b"12345\r\n67890\r\nABCDE\r\nFGHIJ\r\nKLMNO");
    s.write(b"\x1b[2;4r");
    s.write(b"\x1b[4;3H");
    s.write(b"\x1bD");
    assert_eq!(s.render_text(), "12345\nABCDE\nFGHIJ\n     \nKLMNO\n");
    assert_eq!(
        s.primary_grid().history_len(),
        0,
        "margin scrolls never reach history"
    );
}

#[test]
fn hyperlink_applies_only_between_open_and_close() {
    let mut s = screen(1, 10);
    s.write(b"\x1b]8;;https://example\x1b\\X\x1b]8;;\x1b\\Y");
    let line = &s.grid().page()[0];
    let x = &line.cells()[0];
    let y = &line.cells()[1];
    assert_eq!(
        s.hyperlinks().get(x.hyperlink).map(|l| l.uri.as_str()),
        Some("https://example")
    );
    assert_eq!(y.hyperlink, 0);
}

#[test]
fn mode_query_reflects_mouse_tracking() {
    let mut s = screen(3, 5);
    s.write(b"\x1b[?1000h");
    s.write(b"\x1b[?1000$p");
    assert_eq!(s.drain_replies(), b"\x1b[?1000;1$y");

    s.write(b"\x1b[?1000l\x1b[?1000$p");
    assert_eq!(s.drain_replies(), b"\x1b[?1000;2$y");
}

#[test]
fn cursor_position_report_is_one_based() {
    let mut s = screen(10, 20);
    s.write(b"\x1b[5;9H\x1b[6n");
    assert_eq!(s.drain_replies(), b"\x1b[5;9R");
}

#[test]
fn origin_mode_reports_relative_position() {
    let mut s = screen(10, 20);
    s.write(b"\x1b[3;8r\x1b[?6h");
    s.write(b"\x1b[2;2H\x1b[6n");
    assert_eq!(s.drain_replies(), b"\x1b[2;2R");
    assert_eq!(s.cursor().pos, CellPos::new(3, 1), "real position is offset");
}

#[test]
fn alternate_screen_roundtrip_preserves_primary() {
    let mut s = screen(3, 8);
    s.write(b"primary");
    s.write(b"\x1b[?1049h");
    assert_eq!(s.screen_type(), ScreenType::Alternate);
    assert_eq!(s.render_text(), "        \n        \n        \n");
    s.write(b"other");
    s.write(b"\x1b[?1049l");
    assert_eq!(s.screen_type(), ScreenType::Primary);
    assert_eq!(s.render_text(), "primary \n        \n        \n");
}

#[test]
fn scrollback_accumulates_and_clears() {
    let mut s = screen(2, 3);
    s.write(b"one\r\ntwo\r\nthr\r\nfou");
    assert_eq!(s.render_text(), "thr\nfou\n");
    assert_eq!(s.primary_grid().history_len(), 2);
    assert_eq!(
        s.primary_grid().line(LineOffset(-2)).unwrap().text(),
        "one"
    );

    s.write(b"\x1b[3J");
    assert_eq!(s.primary_grid().history_len(), 0);
    assert_eq!(s.render_text(), "thr\nfou\n", "page untouched by ED 3");
}

#[test]
fn resize_reflow_preserves_wrapped_text() {
    let mut s = screen(3, 6);
    s.write(b"hello!");
    s.resize(PageSize::new(3, 3));
    let joined: String = (-(s.primary_grid().history_len() as i32)..3)
        .filter_map(|off| s.primary_grid().line(LineOffset(off)))
        .map(|line| line.text().trim_end().to_string())
        .collect();
    assert_eq!(joined, "hello!");
}

#[test]
fn wide_characters_wrap_as_units() {
    let mut s = screen(2, 4);
    s.write("ab中".as_bytes());
    let line = &s.grid().page()[0];
    assert_eq!(line.cells()[2].base_char(), '中');
    assert!(line.cells()[3].is_wide_continuation());

    // Another wide char cannot split: it wraps whole.
    s.write("中".as_bytes());
    let line1 = &s.grid().page()[1];
    assert_eq!(line1.cells()[0].base_char(), '中');
}

#[test]
fn tab_stops_walk_and_report() {
    let mut s = screen(2, 24);
    s.write(b"\tx");
    assert_eq!(s.cursor().pos, CellPos::new(0, 9));

    s.write(b"\x1bP2$u\x1b\\"); // query goes via DECRQPSR in real traffic
    s.drain_replies();
    s.write(b"\x1b[2$w");
    assert_eq!(s.drain_replies(), b"\x1bP2$u1/9/17\x1b\\");
}

#[test]
fn decstr_after_decset_restores_defaults() {
    let mut s = screen(5, 10);
    s.write(b"\x1b[?6h\x1b[2;4r\x1b[1;4;31m");
    s.write(b"\x1b[!p");
    assert!(!s.cursor().origin_mode);
    assert!(s.cursor().auto_wrap);
    assert_eq!(s.margin().top, 0);
    assert_eq!(s.margin().bottom, 4);
    assert_eq!(s.rendition(), squallterm_core::Rendition::default());
}

#[test]
fn hard_reset_equals_construction() {
    let mut s = screen(4, 6);
    s.write(b"junk\x1b[?1049h\x1b[2;3r\x1b[31mmore\x1b]2;t\x07");
    s.write(b"\x1bc");

    let fresh = screen(4, 6);
    assert_eq!(s.render_text(), fresh.render_text());
    assert_eq!(s.cursor().pos, fresh.cursor().pos);
    assert_eq!(s.margin(), fresh.margin());
    assert_eq!(s.window_title(), fresh.window_title());
    assert_eq!(s.screen_type(), ScreenType::Primary);
    assert_eq!(s.primary_grid().history_len(), 0);
    assert!(s.hyperlinks().is_empty());
    assert!(s.images().is_empty());
}

#[test]
fn capture_replies_in_osc_314_chunks() {
    let mut s = screen(3, 10);
    s.write(b"first\r\nsecond");
    s.write(b"\x1b[>0;3t");
    let reply = String::from_utf8(s.drain_replies()).unwrap();
    assert!(reply.starts_with("\x1b]314;first\nsecond\n"));
    assert!(reply.ends_with("\x1b]314;\x1b\\"));
}

// ── Screen ↔ InputGenerator wiring ─────────────────────────────────

/// Host-side sink that forwards mode side effects into an InputGenerator,
/// the way a terminal session object wires the two halves together.
#[derive(Clone)]
struct InputWiring(Rc<RefCell<InputGenerator>>);

impl EventSink for InputWiring {
    fn set_bracketed_paste(&mut self, enable: bool) {
        self.0.borrow_mut().set_bracketed_paste(enable);
    }
    fn use_application_cursor_keys(&mut self, enable: bool) {
        self.0.borrow_mut().set_cursor_keys_mode(if enable {
            squallterm_core::KeyMode::Application
        } else {
            squallterm_core::KeyMode::Normal
        });
    }
    fn set_application_keypad_mode(&mut self, enable: bool) {
        self.0.borrow_mut().set_application_keypad_mode(enable);
    }
    fn set_mouse_protocol(&mut self, protocol: MouseProtocol, enable: bool) {
        self.0.borrow_mut().set_mouse_protocol(protocol, enable);
    }
    fn set_mouse_transport(&mut self, transport: MouseTransport) {
        self.0.borrow_mut().set_mouse_transport(transport);
    }
    fn set_generate_focus_events(&mut self, enable: bool) {
        self.0.borrow_mut().set_generate_focus_events(enable);
    }
}

#[test]
fn decset_drives_input_generator_through_the_sink() {
    let input = Rc::new(RefCell::new(InputGenerator::new()));
    let mut s = Screen::new(
        PageSize::new(5, 10),
        100,
        Box::new(InputWiring(input.clone())),
    );

    // Application reconfigures input behavior through the output stream.
    s.write(b"\x1b[?2004h\x1b[?1h\x1b[?1006h\x1b[?1000h\x1b[?1004h");

    let mut input = input.borrow_mut();
    input.generate_paste("p");
    input.generate_key(squallterm_core::Key::UpArrow, Modifier::empty());
    input.generate_mouse_press(squallterm_core::MouseButton::Left, Modifier::empty(), 2, 3);
    input.generate_focus_in();

    assert_eq!(
        input.peek(),
        b"\x1b[200~p\x1b[201~\x1bOA\x1b[<0;3;2M\x1b[I".as_slice()
    );
}

#[test]
fn ctrl_key_seed_table() {
    let mut input = InputGenerator::new();
    let seeds: &[(char, u8)] = &[
        (' ', 0x00),
        ('A', 0x01),
        ('[', 0x1B),
        ('\\', 0x1C),
        (']', 0x1D),
        ('^', 0x1E),
        ('_', 0x1F),
    ];
    for &(ch, expected) in seeds {
        input.generate_char(ch, Modifier::CONTROL);
        assert_eq!(input.peek(), &[expected], "Ctrl+{ch:?}");
        input.consume(1);
    }
    for (i, ch) in ('A'..='Z').enumerate() {
        input.generate_char(ch, Modifier::CONTROL);
        assert_eq!(input.peek(), &[(i + 1) as u8]);
        input.consume(1);
    }
}
