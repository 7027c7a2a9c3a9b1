//! Used to color and otherwise style bits of output. Styling is off when NO_COLOR is set or
//! stdout isn't a terminal.
use nu_ansi_term::{Color, Style};
use std::io::IsTerminal;
use std::sync::LazyLock;

static ENABLED: LazyLock<bool> =
    LazyLock::new(|| std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal());

pub trait Styling {
    fn explain_title(&self) -> String;
    fn explain_text(&self) -> String;
    fn hex_offset(&self) -> String;
    fn hex_hex(&self) -> String;
    fn hex_ascii(&self) -> String;
    fn table_header(&self) -> String;
    fn table_sep(&self) -> String;
    fn table_field(&self) -> String;
    fn warn(&self) -> String;
}

impl<T: AsRef<str>> Styling for T {
    fn explain_title(&self) -> String {
        paint(Style::new().bold(), self.as_ref())
    }

    fn explain_text(&self) -> String {
        paint(Style::new().italic(), self.as_ref())
    }

    fn hex_offset(&self) -> String {
        paint(Color::Blue.normal(), self.as_ref())
    }

    fn hex_hex(&self) -> String {
        paint(Style::new(), self.as_ref())
    }

    fn hex_ascii(&self) -> String {
        paint(Color::Green.normal(), self.as_ref())
    }

    fn table_header(&self) -> String {
        paint(Style::new().bold(), self.as_ref())
    }

    fn table_sep(&self) -> String {
        paint(Color::DarkGray.normal(), self.as_ref())
    }

    fn table_field(&self) -> String {
        paint(Style::new(), self.as_ref())
    }

    fn warn(&self) -> String {
        paint(Color::Red.bold(), self.as_ref())
    }
}

fn paint(style: Style, text: &str) -> String {
    if *ENABLED && style != Style::new() {
        style.paint(text).to_string()
    } else {
        text.to_string()
    }
}

/// Remove escape sequences from the string (e.g. for colors).
#[cfg(test)]
pub fn strip_escapes(s: &str) -> String {
    // Escape sequences can be fairly gnarly, e.g. for RGB colors, but all the ones used for
    // styling end with 'm'.
    let mut result = String::with_capacity(s.len());
    let mut escaping = false;
    for c in s.chars() {
        if c == '\x1b' {
            escaping = true;
        } else if escaping {
            if c == 'm' {
                escaping = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}
