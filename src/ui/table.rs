// coati is a version control tool for data science projects
// Copyright (C) 2025  The coati authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    Left,
    Right,
}

#[derive(Debug)]
enum Row {
    Cells(Vec<String>),
    Separator,
}

/// A plain-text table renderer for history and status listings.
/// Cell contents may contain ANSI colour codes; widths are computed over
/// the visible characters only.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
    alignments: Vec<Alignment>,
}

impl Table {
    pub fn new_with_alignments(alignments: Vec<Alignment>) -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            alignments,
        }
    }

    pub fn set_headers(&mut self, headers: Vec<String>) {
        self.headers = headers;
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(Row::Cells(cells));
    }

    pub fn add_separator(&mut self) {
        self.rows.push(Row::Separator);
    }

    pub fn render(&self) -> String {
        let num_columns = self
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Cells(cells) => Some(cells.len()),
                Row::Separator => None,
            })
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; num_columns];
        for (i, header) in self.headers.iter().enumerate() {
            widths[i] = widths[i].max(visible_width(header));
        }
        for row in &self.rows {
            if let Row::Cells(cells) = row {
                for (i, cell) in cells.iter().enumerate() {
                    widths[i] = widths[i].max(visible_width(cell));
                }
            }
        }

        let mut out = String::new();
        if !self.headers.is_empty() {
            out.push_str(&self.render_cells(&self.headers, &widths));
            out.push('\n');
            out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().max(1)));
            out.push('\n');
        }
        for row in &self.rows {
            match row {
                Row::Cells(cells) => {
                    out.push_str(&self.render_cells(cells, &widths));
                    out.push('\n');
                }
                Row::Separator => {
                    out.push_str(&"-".repeat(
                        widths.iter().sum::<usize>() + 2 * widths.len().max(1),
                    ));
                    out.push('\n');
                }
            }
        }
        out
    }

    fn render_cells(&self, cells: &[String], widths: &[usize]) -> String {
        let mut line = String::new();
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = width.saturating_sub(visible_width(cell));
            let alignment = self
                .alignments
                .get(i)
                .copied()
                .unwrap_or(Alignment::Left);
            match alignment {
                Alignment::Left => {
                    line.push_str(cell);
                    line.push_str(&" ".repeat(pad));
                }
                Alignment::Right => {
                    line.push_str(&" ".repeat(pad));
                    line.push_str(cell);
                }
            }
            line.push_str("  ");
        }
        line.trim_end().to_string()
    }
}

/// Number of visible characters, skipping ANSI escape sequences.
fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_alignment() {
        let mut table = Table::new_with_alignments(vec![Alignment::Left, Alignment::Right]);
        table.set_headers(vec!["name".to_string(), "count".to_string()]);
        table.add_row(vec!["a".to_string(), "1".to_string()]);
        table.add_row(vec!["longer".to_string(), "123".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("a"));
        assert!(lines[2].ends_with("1"));
        assert!(lines[3].starts_with("longer"));
        assert!(lines[3].ends_with("123"));
    }

    #[test]
    fn test_visible_width_skips_ansi() {
        assert_eq!(visible_width("plain"), 5);
        assert_eq!(visible_width("\x1b[1;32mgreen\x1b[0m"), 5);
    }
}
