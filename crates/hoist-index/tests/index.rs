use std::collections::BTreeMap;
use std::path::PathBuf;

use hoist_index::Index;
use hoist_refactor::{FileId, MethodTarget, RefactorDatabase, UsageIndex};
use hoist_syntax::ast::Stmt;
use pretty_assertions::assert_eq;

const SHAPES: &str = "class Shape:\n    def area(self):\n        return self.w\n\nShape().area()\n";

fn target(index: &Index) -> MethodTarget {
    let file = FileId::new("pkg/shapes.py");
    let module = &index.parsed(&file).unwrap().module;
    let method = module
        .walk_stmts()
        .find(|&id| matches!(module.stmt(id), Stmt::FunctionDef(def) if def.name.name == "area"))
        .unwrap();
    MethodTarget {
        file,
        class_name: "Shape".to_string(),
        method_name: "area".to_string(),
        method,
        range: module.stmt(method).range(),
    }
}

#[test]
fn call_sites_are_sorted_by_file_then_offset() {
    let files = BTreeMap::from([
        (FileId::new("pkg/shapes.py"), SHAPES.to_string()),
        (
            FileId::new("app.py"),
            "a.area()\nb.c.area(1)\narea()\nx.area\n".to_string(),
        ),
        (FileId::new("README.md"), "s.area()".to_string()),
    ]);
    let index = Index::new(files, Vec::new());
    let sites = index.find_call_sites(&target(&index));

    let found: Vec<(&str, &str)> = sites
        .iter()
        .map(|site| {
            let text = index.file_text(&site.file).unwrap();
            (site.file.as_str(), &text[site.range.start..site.range.end])
        })
        .collect();
    assert_eq!(
        found,
        vec![
            ("app.py", "a.area()"),
            ("app.py", "b.c.area(1)"),
            ("pkg/shapes.py", "Shape().area()"),
        ]
    );
    assert!(sites.iter().all(|site| site.qualifier.is_some()));
}

#[test]
fn loads_python_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("src/pkg")).unwrap();
    std::fs::create_dir_all(root.join(".venv/lib")).unwrap();
    std::fs::create_dir_all(root.join("src/pkg/__pycache__")).unwrap();
    std::fs::write(root.join("src/pkg/__init__.py"), "").unwrap();
    std::fs::write(root.join("src/pkg/shapes.py"), SHAPES).unwrap();
    std::fs::write(root.join(".venv/lib/site.py"), "x = 1\n").unwrap();
    std::fs::write(root.join("src/pkg/__pycache__/shapes.py"), "x = 1\n").unwrap();
    std::fs::write(root.join("notes.txt"), "not python").unwrap();

    let index = Index::load(root, vec![PathBuf::from("src")]).unwrap();
    let files: Vec<&str> = index.files().map(FileId::as_str).collect();
    assert_eq!(files, vec!["src/pkg/__init__.py", "src/pkg/shapes.py"]);
    assert_eq!(
        index
            .importable_module_name(&FileId::new("src/pkg/shapes.py"))
            .as_deref(),
        Some("pkg.shapes")
    );
    assert_eq!(
        index
            .importable_module_name(&FileId::new("src/pkg/__init__.py"))
            .as_deref(),
        Some("pkg")
    );
    assert!(index.parsed(&FileId::new("src/pkg/shapes.py")).is_some());
}

#[test]
fn member_bindings_skip_the_declaring_class() {
    let files = BTreeMap::from([
        (FileId::new("pkg/shapes.py"), SHAPES.to_string()),
        (
            FileId::new("app.py"),
            "class Circle:\n    def area(self):\n        return 1\n\nx.area = None\n".to_string(),
        ),
    ]);
    let index = Index::new(files, Vec::new());
    let bindings = index.find_member_bindings(&target(&index));
    let found: Vec<(&str, &str)> = bindings
        .iter()
        .map(|binding| {
            let text = index.file_text(&binding.file).unwrap();
            (binding.file.as_str(), &text[binding.range.start..binding.range.end])
        })
        .collect();
    assert_eq!(found, vec![("app.py", "Circle"), ("app.py", "area")]);
}
