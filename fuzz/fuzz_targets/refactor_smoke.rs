#![no_main]

use std::collections::BTreeMap;

use hoist_index::Index;
use hoist_refactor::{
    commit, make_method_top_level, FileId, MakeTopLevelOptions, MakeTopLevelParams,
    RefactorDatabase,
};
use hoist_syntax::ast::Stmt;
use libfuzzer_sys::fuzz_target;

mod utils;

fuzz_target!(|data: &[u8]| {
    let text = utils::input_text(data);
    let file = FileId::new("fuzz.py");
    let index = Index::new(
        BTreeMap::from([(file.clone(), text.to_string())]),
        Vec::new(),
    );
    let Some(parsed) = index.parsed(&file) else {
        return;
    };
    let module = &parsed.module;

    // Try every method of every class; rejections are expected, panics and
    // unappliable plans are not.
    for stmt in module.walk_stmts() {
        let Stmt::ClassDef(class) = module.stmt(stmt) else {
            continue;
        };
        for &member in &class.body {
            let Some(def) = module.stmt(member).as_function() else {
                continue;
            };
            let params = MakeTopLevelParams {
                file: file.clone(),
                class_name: class.name.name.clone(),
                method_name: def.name.name.clone(),
            };
            if let Ok(plan) =
                make_method_top_level(&index, &index, &params, &MakeTopLevelOptions::default())
            {
                commit(&index.snapshot(), &plan).expect("planned edits must apply");
            }
        }
    }
});
