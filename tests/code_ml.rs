//! CodeML: marks hidden in source comments so the template stays valid code

use markup_tailor::config::load_bindings;
use markup_tailor::{Compiler, Context, FileSource, MarkKind, Metadata};
use pretty_assertions::assert_eq;
use std::io::Write;

const ENTITY: &str = "\
package /*{+package*/com.example/*+}*/;
/*{@generator:tailor@}*/
/**- Template notes: the placeholder below keeps the file compiling -**/
public class /*{+name*/Sample/*+}*/ {
/*{{+:    private {+type+} {+field+};
*//*    private int x;
*//*+}}*/}
/*- trailing -*/";

fn compiler() -> Compiler {
    Compiler::code_ml()
}

#[test]
fn test_render_entity() {
    let dom = compiler().compile_str(ENTITY).unwrap();
    let mut ctx = Context::new()
        .with("package", "com.acme")
        .with("name", "Person")
        .with("type", vec!["String", "int"])
        .with("field", vec!["name", "age"]);
    assert_eq!(
        dom.tailor(&mut ctx).unwrap(),
        "\
package com.acme;


public class Person {
    private String name;
    private int age;
}
"
    );
}

#[test]
fn test_entity_structure() {
    let dom = compiler().compile_str(ENTITY).unwrap();
    assert_eq!(dom.markup(), ENTITY);
    assert_eq!(dom.metadata().get("generator"), Some("tailor"));
    assert_eq!(dom.metadata().get(Metadata::LANG), Some("CodeML"));

    let kinds: Vec<&str> = dom.marks().iter().map(|m| m.kind_name()).collect();
    assert_eq!(
        kinds,
        vec![
            "replace-with-var",
            "set-metadata",
            "cut-doc-comment",
            "replace-with-var",
            "replace-with-form",
            "cut-comment",
        ]
    );
    match &dom.marks()[4].kind {
        MarkKind::ReplaceWithForm { form, wrapped } => {
            assert_eq!(wrapped, "/*    private int x;\n*/");
            assert_eq!(dom.marks()[4].line, 5);
            let names: Vec<&str> = form.vars().iter().map(|v| v.name.as_str()).collect();
            assert_eq!(names, vec!["type", "field"]);
        }
        other => panic!("Expected ReplaceWithForm, got {:?}", other),
    }
}

#[test]
fn test_cut_in_comment_envelope() {
    let dom = compiler()
        .compile_str("call();/*{-*/\ndebug();\n/*-}*/done();")
        .unwrap();
    assert_eq!(dom.marks()[0].wrapped(), Some("\ndebug();\n"));
    assert_eq!(dom.tailor(&mut Context::new()).unwrap(), "call();done();");
}

#[test]
fn test_replace_default() {
    let dom = compiler()
        .compile_str("int size = /*{+size|10*/0/*+}*/;")
        .unwrap();
    assert_eq!(dom.tailor(&mut Context::new()).unwrap(), "int size = 10;");
}

#[test]
fn test_file_source_with_bindings_file() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("Entity.java");
    std::fs::write(&template, ENTITY).unwrap();

    let bindings = dir.path().join("entity.yaml");
    let mut file = std::fs::File::create(&bindings).unwrap();
    writeln!(file, "package: org.sample").unwrap();
    writeln!(file, "name: Order").unwrap();
    writeln!(file, "type: [long]").unwrap();
    writeln!(file, "field: [id]").unwrap();
    drop(file);

    let dom = compiler().compile(&FileSource::new(&template)).unwrap();
    assert!(dom.metadata().get(Metadata::SOURCE).unwrap().contains("Entity.java"));

    let mut ctx = Context::new();
    for (name, value) in load_bindings(&bindings).unwrap() {
        ctx.set(name, value);
    }
    let out = dom.tailor(&mut ctx).unwrap();
    assert!(out.starts_with("package org.sample;"));
    assert!(out.contains("    private long id;\n}"));
}
