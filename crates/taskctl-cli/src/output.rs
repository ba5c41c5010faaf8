use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", format_table(headers, &rows));
}

/// Render rows under padded headers. Columns whose every non-empty cell is
/// an integer (task levels, PR numbers, concurrency caps) are right-aligned
/// so the digits line up; everything else is left-aligned.
fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let numeric: Vec<bool> = (0..headers.len())
        .map(|i| {
            let mut saw_value = false;
            for row in rows {
                if let Some(cell) = row.get(i) {
                    if cell.is_empty() || cell == "-" {
                        continue;
                    }
                    if cell.parse::<i64>().is_err() {
                        return false;
                    }
                    saw_value = true;
                }
            }
            saw_value
        })
        .collect();

    let pad = |cell: &str, i: usize| -> String {
        let w = widths.get(i).copied().unwrap_or(0);
        if numeric.get(i).copied().unwrap_or(false) {
            format!("{:>w$}", cell, w = w)
        } else {
            format!("{:<w$}", cell, w = w)
        }
    };

    let mut out = String::new();
    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| pad(h, i))
        .collect();
    out.push_str(&header_row.join("  "));
    out.push('\n');

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&sep.join("  "));
    out.push('\n');

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, i))
            .collect();
        out.push_str(&cells.join("  "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn numeric_columns_right_align() {
        let table = format_table(
            &["ID", "LEVEL", "TITLE"],
            &rows(&[
                &["01ARZ3ND", "0", "Parse header"],
                &["01ARZ4X2", "12", "Wire together"],
            ]),
        );
        let lines: Vec<&str> = table.lines().collect();
        // Width 5 comes from the LEVEL header itself.
        assert!(lines[0].starts_with("ID        LEVEL"));
        assert!(lines[2].contains("      0  "), "level pads from the left");
        assert!(lines[3].contains("     12  "));
    }

    #[test]
    fn text_columns_stay_left_aligned() {
        let table = format_table(
            &["STATUS", "TITLE"],
            &rows(&[&["ready", "Short"], &["pr_created", "A longer title"]]),
        );
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[2].starts_with("ready     "));
        assert!(lines[3].starts_with("pr_created"));
    }

    #[test]
    fn placeholder_cells_do_not_break_numeric_detection() {
        // CONCURRENCY prints "-" for projects without a cap.
        let table = format_table(
            &["NAME", "CONCURRENCY"],
            &rows(&[&["widgets", "4"], &["gadgets", "-"]]),
        );
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[2].ends_with("          4"));
    }

    #[test]
    fn all_text_column_with_digit_free_cells_is_not_numeric() {
        let table = format_table(
            &["BRANCH"],
            &rows(&[&["feature/01ARZ3ND/x"], &["main"]]),
        );
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[3].starts_with("main"));
    }
}
