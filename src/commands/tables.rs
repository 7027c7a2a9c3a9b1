//! Helpers for building tables using the tabled crate.
use super::styles::Styling;
use std::io::{self, Write};
use tabled::{
    builder::Builder,
    settings::{Alignment, Padding, Style, object::Columns},
};

struct TableCol {
    header: String,
    align: Alignment,
    help: String,
    fields: Vec<String>,
}

/// General table. They look like this:
/// name      type      vaddr  offset  size  flags      if titles
/// ----      ----      -----  ------  ----  -----
///           NULL          0       0     0  none
/// .text     PROGBITS   1000    1000   2a4  ALLOC EXEC
///
/// name: the section name                                if explain
/// type: what the section holds
/// ...
pub struct TableBuilder {
    cols: Vec<TableCol>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder { cols: Vec::new() }
    }

    /// Left aligned column
    pub fn add_col_l(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::left());
    }

    /// Right aligned column
    pub fn add_col_r(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::right());
    }

    /// Typically add_field! is used instead.
    pub fn add_str_field(&mut self, header: &str, value: String) {
        let Some(col) = self.cols.iter_mut().find(|c| c.header == header) else {
            debug_assert!(false, "no column named {header}");
            return;
        };
        if value.is_empty() {
            // Empty fields screw up tabled formatting.
            col.fields.push(" ".to_string());
        } else {
            col.fields.push(value);
        }
    }

    pub fn writeln(&self, mut out: impl Write, titles: bool, explain: bool) -> io::Result<()> {
        writeln!(out, "{}", self.table_str(titles))?;
        if explain {
            writeln!(out)?;
            writeln!(out, "{}", self.explain_str())?;
        }
        Ok(())
    }

    fn add_col(&mut self, header: &str, help: &str, align: Alignment) {
        // We need to preserve ordering so we can't use a HashMap but O(n) is fine for tables.
        debug_assert!(!self.cols.iter().any(|c| c.header == header));
        self.cols.push(TableCol {
            header: header.to_string(),
            align,
            help: help.to_string(),
            fields: Vec::new(),
        });
    }

    fn table_str(&self, titles: bool) -> String {
        let height = self.cols.first().map_or(0, |c| c.fields.len());
        let mut builder = Builder::with_capacity(height + 2, self.cols.len());
        if titles {
            let header: Vec<String> = self.cols.iter().map(|c| c.header.table_header()).collect();
            let dashes: Vec<String> = self
                .cols
                .iter()
                .map(|c| "-".repeat(c.header.len()).table_sep())
                .collect();
            builder.push_record(header);
            builder.push_record(dashes);
        }
        for i in 0..height {
            let row: Vec<String> = self
                .cols
                .iter()
                .map(|c| c.fields.get(i).cloned().unwrap_or_default())
                .collect();
            builder.push_record(row);
        }

        let mut table = builder.build();
        for (i, col) in self.cols.iter().enumerate() {
            table.modify(Columns::one(i), col.align);
        }
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());
        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .cols
            .iter()
            .map(|c| format!("{}: {}", c.header.explain_title(), c.help.explain_text()))
            .collect();
        explains.join("\n")
    }
}

macro_rules! add_field {
    ($builder:ident, $header:literal, $value:expr) => {
        let s = format!("{}", $value);
        $builder.add_str_field($header, $crate::commands::styles::Styling::table_field(&s));
    };
    ($builder:ident, $header:literal, $format:literal, $value:expr) => {
        let s = format!($format, $value);
        $builder.add_str_field($header, $crate::commands::styles::Styling::table_field(&s));
    };
}
pub(crate) use add_field;

struct SimpleRow {
    name: String,
    value: String,
    help: String,
}

/// Table with just name and value columns. They look like this:
/// machine     Amd64                                   these have no titles
/// timestamp   0x5f5e1000
///
/// machine: the CPU architecture                       if explain
/// timestamp: seconds since 1970 when the image was linked
pub struct SimpleTableBuilder {
    rows: Vec<SimpleRow>,
}

impl SimpleTableBuilder {
    pub fn new() -> SimpleTableBuilder {
        SimpleTableBuilder { rows: Vec::new() }
    }

    /// Typically add_simple! is used instead.
    pub fn add_str_row(&mut self, name: &str, value: String, help: &str) {
        self.rows.push(SimpleRow {
            name: name.to_string(),
            value,
            help: help.to_string(),
        });
    }

    pub fn writeln(&self, mut out: impl Write, explain: bool) -> io::Result<()> {
        writeln!(out, "{}", self.table_str())?;
        if explain {
            writeln!(out)?;
            writeln!(out, "{}", self.explain_str())?;
        }
        Ok(())
    }

    fn table_str(&self) -> String {
        let mut builder = Builder::with_capacity(self.rows.len(), 2);
        for row in self.rows.iter() {
            builder.push_record([row.name.clone(), row.value.clone()]);
        }

        let mut table = builder.build();
        table.modify(Columns::one(0), Alignment::left());
        table.modify(Columns::one(1), Alignment::left());
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());
        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .rows
            .iter()
            .map(|r| format!("{}: {}", r.name.explain_title(), r.help.explain_text()))
            .collect();
        explains.join("\n")
    }
}

macro_rules! add_simple {
    ($builder:ident, $name:literal, $value:expr, $help:expr) => {
        let s = format!("{}", $value);
        $builder.add_str_row($name, $crate::commands::styles::Styling::table_field(&s), $help);
    };
    ($builder:ident, $name:literal, $format:literal, $value:expr, $help:expr) => {
        let s = format!($format, $value);
        $builder.add_str_row($name, $crate::commands::styles::Styling::table_field(&s), $help);
    };
}
pub(crate) use add_simple;
