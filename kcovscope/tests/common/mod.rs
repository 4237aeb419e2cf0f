//! C fixtures for end-to-end report tests
//!
//! A fixture is `int main() {}` compiled with `-fsanitize-coverage=trace-pc`
//! and linked against a tiny callback that prints its own return address
//! (minus the ASLR slide). Builds need a native `cc`; helpers return `None`
//! when the toolchain can't produce a fixture, and callers skip.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const KCOV_SRC: &str = r#"
#define _GNU_SOURCE
#include <dlfcn.h>
#include <link.h>
#include <stddef.h>
#include <stdio.h>

void* aslr_base() {
    struct link_map* map = NULL;
    void* handle = dlopen(NULL, RTLD_LAZY | RTLD_NOLOAD);
    if (handle != NULL) {
        dlinfo(handle, RTLD_DI_LINKMAP, &map);
        dlclose(handle);
    }
    return map ? (void*)map->l_addr : NULL;
}

void __sanitizer_cov_trace_pc() {
    printf("%llu\n", (long long)(__builtin_return_address(0) - aslr_base()));
}
"#;

const MAIN_SRC: &str = "int main() {}";

/// How the fixture's `main.c` is compiled and linked
#[derive(Debug, Clone, Copy)]
pub struct FixtureOptions {
    pub coverage: bool,
    pub debug_info: bool,
    pub link: Link,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self { coverage: true, debug_info: true, link: Link::Default }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Default,
    NoPie,
    Pie,
    PieRelocs,
}

impl Link {
    pub const ALL: [Link; 4] = [Link::Default, Link::NoPie, Link::Pie, Link::PieRelocs];

    fn ldflags(self) -> &'static [&'static str] {
        match self {
            Link::Default => &[],
            Link::NoPie => &["-no-pie"],
            Link::Pie => &["-pie", "-Wl,--section-start=.text=0x33300000"],
            Link::PieRelocs => &["-pie", "-Wl,--section-start=.text=0x33300000,--emit-relocs"],
        }
    }

    fn cflags(self) -> &'static [&'static str] {
        match self {
            Link::NoPie => &["-fno-pie"],
            Link::Pie | Link::PieRelocs => &["-fpie"],
            Link::Default => &[],
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub binary: PathBuf,
}

impl Fixture {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// `os/arch` key of the host, if it is a target the fixtures support
pub fn host_target() -> Option<&'static str> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    if cfg!(target_arch = "x86_64") {
        Some("linux/amd64")
    } else if cfg!(target_arch = "aarch64") {
        Some("linux/arm64")
    } else if cfg!(target_arch = "riscv64") {
        Some("linux/riscv64")
    } else {
        None
    }
}

fn cc(dir: &Path, args: &[&str]) -> Result<(), String> {
    let output = Command::new("cc")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("failed to run cc: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Build a fixture named `vmlinux` in a fresh temp dir
///
/// Returns `None` (after printing why) when the host can't build it.
pub fn build_fixture(options: FixtureOptions) -> Option<Fixture> {
    host_target()?;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let kcov_src = root.join("kcov.c");
    let main_src = root.join("main.c");
    fs::write(&kcov_src, KCOV_SRC).unwrap();
    fs::write(&main_src, MAIN_SRC).unwrap();

    let kcov_obj = root.join("kcov.o");
    let main_obj = root.join("main.o");
    let binary = root.join("vmlinux");

    let kcov_args = ["-c", "-fpie", "-w", "-x", "c", "-o", path_str(&kcov_obj), path_str(&kcov_src)];
    if let Err(e) = cc(root, &kcov_args) {
        println!("skipping: can't compile the kcov callback: {e}");
        return None;
    }

    // Compile with coverage, link without it
    let mut main_args: Vec<&str> = Vec::new();
    if options.debug_info {
        main_args.extend(["-g", "-gdwarf-4"]);
    }
    main_args.extend(["-w", "-c", "-o", path_str(&main_obj), path_str(&main_src)]);
    main_args.extend(options.link.cflags());
    if options.coverage {
        main_args.push("-fsanitize-coverage=trace-pc");
    }
    if let Err(e) = cc(root, &main_args) {
        println!("skipping: {e}");
        return None;
    }

    let mut link_args = vec!["-o", path_str(&binary), path_str(&main_obj), path_str(&kcov_obj), "-ldl"];
    link_args.extend(options.link.ldflags());
    if let Err(e) = cc(root, &link_args) {
        println!("skipping: link with {:?} failed: {e}", options.link);
        return None;
    }

    Some(Fixture { dir, binary })
}

/// Compile `source` into a relocatable `<name>.ko` next to the fixture
pub fn build_module(fixture: &Fixture, name: &str, source: &str) -> Option<PathBuf> {
    let src = fixture.path().join(format!("{name}.c"));
    let obj = fixture.path().join(format!("{name}.ko"));
    fs::write(&src, source).unwrap();

    let args = [
        "-g",
        "-gdwarf-4",
        "-w",
        "-c",
        "-fno-pie",
        "-fsanitize-coverage=trace-pc",
        "-o",
        path_str(&obj),
        path_str(&src),
    ];
    if let Err(e) = cc(fixture.path(), &args) {
        println!("skipping: can't build {name}.ko: {e}");
        return None;
    }
    Some(obj)
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}
