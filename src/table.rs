//! Plain-text tables of task lists.

use std::{borrow::Cow, io::Write};

use crate::{error::Result, protocol::todo::TaskList};

/// A column that can be shown for a task list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    DisplayName,
    Id,
    Owner,
    Shared,
    SystemName,
}

impl Column {
    pub const ALL: [Self; 5] = [
        Self::DisplayName,
        Self::Id,
        Self::Owner,
        Self::Shared,
        Self::SystemName,
    ];

    /// The name used on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "display name",
            Self::Id => "id",
            Self::Owner => "owner",
            Self::Shared => "shared",
            Self::SystemName => "system name",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.name() == name)
    }

    fn value(self, list: &TaskList) -> Cow<'_, str> {
        let yes_no = |b: bool| Cow::Borrowed(if b { "yes" } else { "no" });
        match self {
            Self::DisplayName => Cow::Borrowed(&list.display_name),
            Self::Id => Cow::Borrowed(&list.id),
            Self::Owner => yes_no(list.is_owner),
            Self::Shared => yes_no(list.is_shared),
            Self::SystemName => Cow::Borrowed(&list.well_known_list_name),
        }
    }
}

/// Parses a comma separated column selection like `"Display Name, Id"`.
///
/// Names are matched case-insensitively. `all` selects every column.
/// Unknown names and repetitions are skipped.
#[must_use]
pub fn parse_columns(selection: &str) -> Vec<Column> {
    let mut columns = Vec::new();

    for name in selection.split(',') {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }

        if name == "all" {
            return Column::ALL.to_vec();
        }

        match Column::from_name(&name) {
            Some(column) if !columns.contains(&column) => columns.push(column),
            Some(_) => {}
            None => warn!("ignoring unknown column \"{name}\""),
        }
    }

    columns
}

/// Writes `lists` as a table with the given `columns`.
///
/// ```text
/// +--------------+----+
/// | DISPLAY NAME | ID |
/// +--------------+----+
/// | Tasks        | 1  |
/// +--------------+----+
/// ```
///
/// Nothing is written when `columns` is empty.
pub fn render<W: Write>(writer: &mut W, lists: &[TaskList], columns: &[Column]) -> Result<()> {
    if columns.is_empty() {
        return Ok(());
    }

    let header: Vec<Cow<'_, str>> = columns
        .iter()
        .map(|column| Cow::Owned(column.name().to_uppercase()))
        .collect();
    let rows: Vec<Vec<Cow<'_, str>>> = lists
        .iter()
        .map(|list| columns.iter().map(|column| column.value(list)).collect())
        .collect();

    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            std::iter::once(&header)
                .chain(&rows)
                .map(|row| row[i].chars().count())
                .max()
                .unwrap_or_default()
        })
        .collect();

    let separator = widths.iter().fold(String::from("+"), |mut line, width| {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
        line
    });

    writeln!(writer, "{separator}")?;
    write_row(writer, &header, &widths)?;
    writeln!(writer, "{separator}")?;
    for row in &rows {
        write_row(writer, row, &widths)?;
    }
    writeln!(writer, "{separator}")?;

    Ok(())
}

fn write_row<W: Write>(writer: &mut W, row: &[Cow<'_, str>], widths: &[usize]) -> Result<()> {
    write!(writer, "|")?;
    for (cell, width) in row.iter().zip(widths) {
        let padding = width - cell.chars().count();
        write!(writer, " {cell}{} |", " ".repeat(padding))?;
    }
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> TaskList {
        TaskList {
            id: "AAMk=".into(),
            display_name: "Tasks".into(),
            is_owner: true,
            is_shared: false,
            well_known_list_name: "defaultList".into(),
        }
    }

    #[test]
    fn parses_mixed_case_selection() {
        assert_eq!(
            parse_columns("Display Name, Id"),
            vec![Column::DisplayName, Column::Id]
        );
    }

    #[test]
    fn all_selects_every_column() {
        assert_eq!(parse_columns("all"), Column::ALL.to_vec());
        assert_eq!(parse_columns(" ALL "), Column::ALL.to_vec());
    }

    #[test]
    fn skips_unknown_and_repeated_columns() {
        assert_eq!(
            parse_columns("owner, colour, Owner,,shared"),
            vec![Column::Owner, Column::Shared]
        );
        assert!(parse_columns("").is_empty());
    }

    #[test]
    fn renders_booleans_as_words() {
        let mut out = Vec::new();
        render(
            &mut out,
            &[tasks()],
            &[Column::DisplayName, Column::Owner, Column::Shared],
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "+--------------+-------+--------+\n\
             | DISPLAY NAME | OWNER | SHARED |\n\
             +--------------+-------+--------+\n\
             | Tasks        | yes   | no     |\n\
             +--------------+-------+--------+\n"
        );
    }

    #[test]
    fn pads_to_widest_cell() {
        let mut long = tasks();
        long.display_name = "Groceries for the week".into();

        let mut out = Vec::new();
        render(&mut out, &[tasks(), long], &[Column::DisplayName]).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("| Tasks                  |\n"));
        assert!(out.contains("| Groceries for the week |\n"));
    }

    #[test]
    fn no_columns_renders_nothing() {
        let mut out = Vec::new();
        render(&mut out, &[tasks()], &[]).unwrap();
        assert!(out.is_empty());
    }
}
