mod common;

use common::{build_fixture, build_module, host_target, FixtureOptions};
use kcovscope::config::CoverConfig;
use kcovscope::generator::ReportGenerator;
use kcovscope::targets::{next_instruction_pc, TargetRegistry};
use kcovscope_common::{HandlerParams, Program};
use std::fs;

const MODULE_SRC: &str = "int dummy_open(int x) { return x + 1; }\n";
const MODULE_BASE: u64 = 0xffff_ffff_c0a0_0000;

#[test]
fn test_loaded_module_is_placed_and_covered() {
    let Some(key) = host_target() else {
        return;
    };
    let Some(fixture) = build_fixture(FixtureOptions::default()) else {
        return;
    };
    if build_module(&fixture, "snd-dummy", MODULE_SRC).is_none() {
        return;
    }

    let proc_modules = fixture.path().join("modules.txt");
    fs::write(&proc_modules, format!("snd_dummy 4096 0 - Live 0x{MODULE_BASE:x}\n")).unwrap();

    let mut config = CoverConfig::new(key, fixture.path());
    config.kernel_src = Some(fixture.path().to_path_buf());
    config.loaded_modules = Some(proc_modules);
    let registry = TargetRegistry::builtin();
    let rg = ReportGenerator::from_config(&config, &registry).unwrap();

    let index = rg.index();
    assert_eq!(index.modules().len(), 2);
    let module = index.modules().iter().position(|m| m.name == "snd_dummy").unwrap();
    assert_eq!(index.modules()[module].base_address, MODULE_BASE);

    let callbacks: Vec<_> = index.frames().iter().filter(|f| f.module == module).collect();
    assert!(!callbacks.is_empty(), "snd-dummy.ko calls the coverage callback");
    for frame in &callbacks {
        assert!(frame.pc >= MODULE_BASE);
        assert_eq!(frame.function_name, "dummy_open");
    }

    let pc = next_instruction_pc(rg.target(), callbacks[0].pc);
    let params = HandlerParams::new(vec![Program::new("", vec![pc]).with_data("open")]);
    let agg = rg.aggregate(&params).unwrap();
    assert!(agg.is_covered(callbacks[0].pc));

    let mut programs = Vec::new();
    rg.do_cover_programs(&mut programs, &params).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&programs).unwrap();
    assert_eq!(doc["program"], "open");
    assert_eq!(doc["coverage"][0]["functions"][0]["func_name"], "dummy_open");
}

#[test]
fn test_unloaded_module_is_skipped() {
    let Some(key) = host_target() else {
        return;
    };
    let Some(fixture) = build_fixture(FixtureOptions::default()) else {
        return;
    };
    if build_module(&fixture, "snd-dummy", MODULE_SRC).is_none() {
        return;
    }

    let mut config = CoverConfig::new(key, fixture.path());
    config.kernel_src = Some(fixture.path().to_path_buf());
    let rg = ReportGenerator::from_config(&config, &TargetRegistry::builtin()).unwrap();

    // Discovered but never placed, so it contributes no callbacks
    assert_eq!(rg.index().modules().len(), 2);
    assert!(rg.index().frames().iter().all(|f| rg.index().modules()[f.module].is_main()));
}
