//! Tabular subsystem and file summaries

#![allow(clippy::format_push_string)]

use super::html::escape_html;
use crate::coverage::FileStat;
use crate::subsystems::SubsystemStat;
use std::collections::BTreeMap;

const COLUMNS: [&str; 6] = ["name", "lines", "PCsInFiles", "Funcs", "PCsInFuncs", "PCsInCoveredFuncs"];

const HEADINGS: [&str; 6] =
    ["Name", "Lines", "PCs in files", "Functions", "PCs in functions", "PCs in covered functions"];

/// One row per subsystem, in name order
#[must_use]
pub fn render_subsystems(groups: &BTreeMap<String, SubsystemStat>) -> String {
    let rows = groups.values().map(SubsystemStat::formatted);
    render_table("Subsystem coverage", rows)
}

/// One row per file, in path order
#[must_use]
pub fn render_files(files: &[FileStat]) -> String {
    let rows = files.iter().map(|f| {
        BTreeMap::from([
            ("name", f.name.clone()),
            ("lines", f.lines()),
            ("PCsInFiles", f.pcs_in_files()),
            ("Funcs", f.funcs()),
            ("PCsInFuncs", f.pcs_in_funcs()),
            ("PCsInCoveredFuncs", f.pcs_in_covered_funcs()),
        ])
    });
    render_table("File coverage", rows)
}

fn render_table(title: &str, rows: impl Iterator<Item = BTreeMap<&'static str, String>>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n"
    ));
    out.push_str("<table>\n<tr>");
    for heading in HEADINGS {
        out.push_str(&format!("<th>{heading}</th>"));
    }
    out.push_str("</tr>\n");

    for row in rows {
        out.push_str("<tr>");
        for column in COLUMNS {
            let value = row.get(column).map_or("", String::as_str);
            out.push_str(&format!("<td>{}</td>", escape_html(value)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::{group_by_subsystems, Subsystem};

    #[test]
    fn test_subsystem_table() {
        let mut file = FileStat::named("sound/core/pcm.c");
        file.covered_lines = 1;
        file.total_lines = 4;
        let groups = group_by_subsystems(&[file], &[Subsystem::from_paths("sound", &["sound"])]);

        let html = render_subsystems(&groups);
        assert!(html.contains("<td>sound</td><td>1 / 4 / 25.00%</td>"));
        assert_eq!(html.matches("<tr>").count(), 2);
    }

    #[test]
    fn test_file_table_escapes_names() {
        let html = render_files(&[FileStat::named("drivers/<gen>.c")]);
        assert!(html.contains("<td>drivers/&lt;gen&gt;.c</td><td>0 / 0 / 0.00%</td>"));
    }
}
