//! Table observer.
//!
//! Renders tallies with `tabled`, either as a `Name | Value | Description`
//! table or, in compact mode, as a grid of `name: value` cells.
//!
//! ```rust,ignore
//! use contavisite::observers::table::{TableObserver, TableStyle};
//!
//! let observer = TableObserver::new().with_style(TableStyle::Rounded);
//! println!("{}", observer.render(stats.tallies().into_iter()));
//! // ╭────────────────────┬───────┬──────────────────────────────╮
//! // │ Name               │ Value │ Description                  │
//! // ├────────────────────┼───────┼──────────────────────────────┤
//! // │ page_loads         │ 3     │ Page loads that ran the ...  │
//! ```

use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::stats::Observable;

/// Border style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// `+`, `-` and `|` only.
    Ascii,
    /// Box drawing with rounded corners.
    #[default]
    Rounded,
    /// Box drawing with square corners.
    Sharp,
    /// Box drawing with separators between every row.
    Modern,
    /// A Markdown table.
    Markdown,
    /// No borders.
    Blank,
}

/// Settings for [`TableObserver`].
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Border style.
    pub style: TableStyle,
    /// Header row, standard mode only.
    pub show_header: bool,
    /// Line printed above the table.
    pub title: Option<String>,
    /// Render `name: value` cells instead of rows.
    pub compact: bool,
    /// Cells per row in compact mode, at least 1.
    pub columns: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
        }
    }
}

#[derive(Tabled)]
struct TallyRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: u64,
    #[tabled(rename = "Description")]
    help: String,
}

/// Renders tallies as a text table.
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Rounded borders with a header row.
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer using `config`.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the border style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Shows or hides the header row.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Prints `title` on its own line above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Switches to the compact grid.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Cells per row in compact mode. Values below 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    /// Renders `tallies`. An empty iterator renders an empty string in
    /// compact mode and a header-only table otherwise.
    pub fn render<'a>(&self, tallies: impl Iterator<Item = &'a dyn Observable>) -> String {
        if self.config.compact {
            self.render_compact(tallies)
        } else {
            self.render_standard(tallies)
        }
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn titled(&self, table: Table) -> String {
        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn render_compact<'a>(&self, tallies: impl Iterator<Item = &'a dyn Observable>) -> String {
        let cells: Vec<String> = tallies
            .map(|t| format!("{}: {}", display_name(t), t.value()))
            .collect();
        if cells.is_empty() {
            return String::new();
        }

        let cols = self.config.columns;
        let mut builder = Builder::default();
        for chunk in cells.chunks(cols) {
            let mut row = chunk.to_vec();
            row.resize(cols, String::new());
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        self.titled(table)
    }

    fn render_standard<'a>(&self, tallies: impl Iterator<Item = &'a dyn Observable>) -> String {
        let rows: Vec<TallyRow> = tallies
            .map(|t| TallyRow {
                name: display_name(t).to_string(),
                value: t.value(),
                help: t.help().to_string(),
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);
        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }
        self.titled(table)
    }
}

fn display_name(tally: &dyn Observable) -> &str {
    if tally.name().is_empty() {
        "(unnamed)"
    } else {
        tally.name()
    }
}
