//! Interactive HTML report
//!
//! One self-contained document: a file index with per-file coverage, then
//! every file's source with per-line coverage classes and heat markers.

// Report assembly reads best as push_str(&format!(..))
#![allow(clippy::format_push_string)]

use crate::coverage::{percent, Aggregate, FileStat, FuncStat};
use crate::symbolization::CoverIndex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const STYLE: &str = "\
body { font-family: sans-serif; margin: 1em; }
table { border-collapse: collapse; }
td, th { padding: 0 0.6em; text-align: left; }
.source td.ln { color: #888; text-align: right; user-select: none; }
.source td.src { font-family: monospace; white-space: pre; }
tr.covered td.src { background: #d8f5d8; }
tr.uncovered td.src { background: #f8d8d8; }
tr.both td.src { background: #f5ecc8; }
.kw { color: #0000b0; font-weight: bold; }
.cm { color: #707070; font-style: italic; }
.str { color: #a03000; }
.num { color: #007070; }
.pp { color: #7000a0; }
.warn { color: #b00000; }
";

/// Coverage of one source line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LineCover {
    covered: usize,
    total: usize,
    hits: u32,
}

impl LineCover {
    fn class(self) -> &'static str {
        if self.covered == 0 {
            "uncovered"
        } else if self.covered == self.total {
            "covered"
        } else {
            "both"
        }
    }
}

/// Render the full HTML report
///
/// Source text is read from `kernel_src` when the file exists there;
/// otherwise only lines known from debug info are shown.
#[must_use]
pub fn render_html(index: &CoverIndex, agg: &Aggregate, kernel_src: Option<&Path>) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Coverage report</title>\n<style>\n");
    out.push_str(STYLE);
    out.push_str("</style>\n</head>\n<body>\n");

    let total = index.frames().len();
    let covered = agg.pc_hits.len();
    out.push_str(&format!(
        "<p class=\"summary\">{covered} of {total} coverage callbacks covered ({:.2}%) by {} programs</p>\n",
        percent(covered, total),
        agg.programs.len()
    ));
    if !agg.precise {
        out.push_str(
            "<p class=\"warn\">Inexact coverage: functions are marked covered as a whole</p>\n",
        );
    }
    if agg.unresolved > 0 {
        out.push_str(&format!(
            "<p class=\"warn\">{} traced PCs outside any known function</p>\n",
            agg.unresolved
        ));
    }

    render_file_index(&mut out, &agg.file_stats);
    for (file_idx, stat) in agg.file_stats.iter().enumerate() {
        render_file(&mut out, index, agg, file_idx, stat, kernel_src);
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn render_file_index(out: &mut String, files: &[FileStat]) {
    out.push_str("<h1>Files</h1>\n<table class=\"files\">\n");
    out.push_str("<tr><th>File</th><th>PCs</th><th>Lines</th><th>Functions</th></tr>\n");
    for (file_idx, stat) in files.iter().enumerate() {
        out.push_str(&format!(
            "<tr><td><a href=\"#file-{file_idx}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&stat.name),
            stat.pcs_in_files(),
            stat.lines(),
            stat.funcs()
        ));
    }
    out.push_str("</table>\n");
}

fn render_file(
    out: &mut String,
    index: &CoverIndex,
    agg: &Aggregate,
    file_idx: usize,
    stat: &FileStat,
    kernel_src: Option<&Path>,
) {
    out.push_str(&format!(
        "<h2 id=\"file-{file_idx}\">{} <small>{}</small></h2>\n",
        escape_html(&stat.name),
        stat.pcs_in_files()
    ));

    let functions: Vec<&FuncStat> = agg.func_stats.iter().filter(|f| f.file == stat.name).collect();
    if !functions.is_empty() {
        out.push_str("<table class=\"functions\">\n");
        for func in functions {
            let class = match func.covered_pcs {
                0 => "uncovered",
                n if n == func.total_pcs => "covered",
                _ => "both",
            };
            out.push_str(&format!(
                "<tr class=\"{class}\"><td><a href=\"#file-{file_idx}-line-{}\">{}</a></td><td>{}/{}</td><td>{:.0}%</td></tr>\n",
                func.line,
                escape_html(&func.name),
                func.covered_pcs,
                func.total_pcs,
                func.percent()
            ));
        }
        out.push_str("</table>\n");
    }

    let lines = line_coverage(index, agg, &stat.name);
    let source = kernel_src.and_then(|src| fs::read_to_string(src.join(&stat.name)).ok());

    out.push_str("<table class=\"source\">\n");
    let mut highlighter = Highlighter::default();
    match source {
        Some(text) => {
            for (n, text) in (1u32..).zip(text.lines()) {
                render_line(out, file_idx, n, &highlighter.line(text), lines.get(&n));
            }
        }
        None => {
            for (&n, cover) in &lines {
                render_line(out, file_idx, n, "", Some(cover));
            }
        }
    }
    out.push_str("</table>\n");
}

fn render_line(out: &mut String, file_idx: usize, n: u32, html: &str, cover: Option<&LineCover>) {
    match cover {
        Some(cover) => out.push_str(&format!(
            "<tr id=\"file-{file_idx}-line-{n}\" class=\"{}\" data-pcs=\"{}/{}\" data-hits=\"{}\"><td class=\"ln\">{n}</td><td class=\"src\">{html}</td></tr>\n",
            cover.class(),
            cover.covered,
            cover.total,
            cover.hits
        )),
        None => out.push_str(&format!(
            "<tr id=\"file-{file_idx}-line-{n}\"><td class=\"ln\">{n}</td><td class=\"src\">{html}</td></tr>\n"
        )),
    }
}

fn line_coverage(index: &CoverIndex, agg: &Aggregate, file: &str) -> BTreeMap<u32, LineCover> {
    let mut lines: BTreeMap<u32, LineCover> = BTreeMap::new();
    for frame in index.frames().iter().filter(|f| f.file_path == file && f.has_line()) {
        let line = lines.entry(frame.line).or_default();
        let hits = agg.hits(frame.pc);
        line.total += 1;
        if hits > 0 {
            line.covered += 1;
            line.hits += hits;
        }
    }
    lines
}

const KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "const", "continue", "default", "do", "double",
    "else", "enum", "extern", "false", "float", "for", "goto", "if", "inline", "int", "long",
    "NULL", "register", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "true", "typedef", "union", "unsigned", "void", "volatile", "while",
];

/// Line-at-a-time C highlighter; remembers open block comments
#[derive(Debug, Default)]
struct Highlighter {
    in_comment: bool,
}

impl Highlighter {
    fn line(&mut self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();

        if !self.in_comment && text.trim_start().starts_with('#') {
            push_span(&mut out, "pp", text);
            return out;
        }

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.in_comment || (c == '/' && next == Some('*')) {
                let start = i;
                if !self.in_comment {
                    self.in_comment = true;
                    i += 2;
                }
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        i += 2;
                        self.in_comment = false;
                        break;
                    }
                    i += 1;
                }
                push_span(&mut out, "cm", &collect(&chars[start..i]));
            } else if c == '/' && next == Some('/') {
                push_span(&mut out, "cm", &collect(&chars[i..]));
                break;
            } else if c == '"' || c == '\'' {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    i += if chars[i] == '\\' { 2 } else { 1 };
                }
                i = (i + 1).min(chars.len());
                push_span(&mut out, "str", &collect(&chars[start..i]));
            } else if c.is_ascii_digit() {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                push_span(&mut out, "num", &collect(&chars[start..i]));
            } else if c.is_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word = collect(&chars[start..i]);
                if KEYWORDS.contains(&word.as_str()) {
                    push_span(&mut out, "kw", &word);
                } else {
                    out.push_str(&escape_html(&word));
                }
            } else {
                out.push_str(&escape_html(c.encode_utf8(&mut [0; 4])));
                i += 1;
            }
        }
        out
    }
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn push_span(out: &mut String, class: &str, text: &str) {
    out.push_str(&format!("<span class=\"{class}\">{}</span>", escape_html(text)));
}

/// Escape text for HTML element content and attribute values
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
