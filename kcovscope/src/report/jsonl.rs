//! JSON-lines exports
//!
//! Each line is one compact JSON document. Blocks are whole source lines:
//! `from_column` is 0 and `to_column` is [`LINE_END`].

use crate::coverage::aggregator::{file_frames, program_files};
use crate::coverage::Aggregate;
use crate::domain::{CoverError, LINE_END};
use crate::symbolization::CoverIndex;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct FileCoverage<'a> {
    file_path: &'a str,
    functions: Vec<FunctionBlocks<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionBlocks<'a> {
    func_name: &'a str,
    blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
struct Block {
    pc: u64,
    hit_count: u32,
    from_line: u32,
    from_column: i32,
    to_line: u32,
    to_column: i32,
}

#[derive(Debug, Serialize)]
struct ProgramDoc<'a> {
    program: &'a str,
    coverage: Vec<ProgramFile<'a>>,
}

#[derive(Debug, Serialize)]
struct ProgramFile<'a> {
    file_path: &'a str,
    functions: Vec<ProgramFunction<'a>>,
}

#[derive(Debug, Serialize)]
struct ProgramFunction<'a> {
    func_name: &'a str,
    covered_blocks: Vec<LineBlock>,
}

#[derive(Debug, Serialize)]
struct LineBlock {
    from_line: u32,
    from_column: i32,
    to_line: u32,
    to_column: i32,
}

impl LineBlock {
    fn whole_line(line: u32) -> Self {
        Self { from_line: line, from_column: 0, to_line: line, to_column: LINE_END }
    }
}

/// One document per file with at least one covered callback
///
/// Every callback of such a file is listed with its hit count, so
/// uncovered blocks show up with `hit_count` 0.
///
/// # Errors
/// Returns `Json` if serialization fails
pub fn render_files_jsonl(index: &CoverIndex, agg: &Aggregate) -> Result<Vec<u8>, CoverError> {
    let mut out = Vec::new();
    for stat in agg.file_stats.iter().filter(|f| f.covered_pcs > 0) {
        let functions = file_frames(index, &stat.name)
            .into_iter()
            .map(|(func_name, frames)| FunctionBlocks {
                func_name,
                blocks: frames
                    .into_iter()
                    .map(|frame| Block {
                        pc: frame.pc,
                        hit_count: agg.hits(frame.pc),
                        from_line: frame.line,
                        from_column: 0,
                        to_line: frame.line,
                        to_column: LINE_END,
                    })
                    .collect(),
            })
            .collect();

        serde_json::to_writer(&mut out, &FileCoverage { file_path: &stat.name, functions })?;
        out.push(b'\n');
    }
    Ok(out)
}

/// One document per program, listing the lines it covered
///
/// # Errors
/// Returns `Json` if serialization fails
pub fn render_programs_jsonl(index: &CoverIndex, agg: &Aggregate) -> Result<Vec<u8>, CoverError> {
    let mut out = Vec::new();
    for program in &agg.programs {
        let coverage = program_files(index, program)
            .into_iter()
            .map(|(file_path, functions)| ProgramFile {
                file_path,
                functions: functions
                    .into_iter()
                    .map(|(func_name, lines)| ProgramFunction {
                        func_name,
                        covered_blocks: lines.into_iter().map(LineBlock::whole_line).collect(),
                    })
                    .collect(),
            })
            .collect();

        serde_json::to_writer(&mut out, &ProgramDoc { program: &program.name, coverage })?;
        out.push(b'\n');
    }
    Ok(out)
}
