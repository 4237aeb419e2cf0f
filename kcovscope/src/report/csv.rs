//! Per-function CSV

use crate::coverage::FuncStat;

/// Column order is part of the output contract
pub const CSV_HEADER: [&str; 7] =
    ["Module", "Filename", "Function", "Covered PCs", "Total PCs", "Line", "Coverage %"];

/// Header row plus one row per function, in the order given
#[must_use]
pub fn render_functions(functions: &[FuncStat]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().map(|s| (*s).to_string()));
    for func in functions {
        push_record(
            &mut out,
            [
                func.module.clone(),
                func.file.clone(),
                func.name.clone(),
                func.covered_pcs.to_string(),
                func.total_pcs.to_string(),
                func.line.to_string(),
                format!("{:.2}", func.percent()),
            ]
            .into_iter(),
        );
    }
    out
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(&field));
    }
    out.push('\n');
}

/// Quote a field if it contains a separator, quote or newline
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, covered: usize, total: usize) -> FuncStat {
        FuncStat {
            module: "vmlinux".to_string(),
            file: "main.c".to_string(),
            name: name.to_string(),
            line: 1,
            covered_pcs: covered,
            total_pcs: total,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let csv = render_functions(&[func("main", 1, 1), func("helper", 1, 3)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Module,Filename,Function,Covered PCs,Total PCs,Line,Coverage %");
        assert_eq!(lines[1], "vmlinux,main.c,main,1,1,1,100.00");
        assert_eq!(lines[2], "vmlinux,main.c,helper,1,3,1,33.33");
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("operator\"\""), "\"operator\"\"\"\"\"");
    }
}
