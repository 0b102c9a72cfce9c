//! End-to-end scenarios exercised through the public `Engine` embedding
//! surface rather than the interpreter directly, mirroring how
//! `ouros`'s `tests/` directory drives whole programs through `Runner`
//! instead of its internal VM.

use std::cell::RefCell;
use std::rc::Rc;

use alang::{Engine, EngineConfig, HostValue, Value};

fn engine() -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    engine.initialize();
    engine
}

#[test]
fn arithmetic_coercion_concatenates_left_to_right() {
    let mut engine = engine();
    let result = engine.execute(r#"1 + "2" + 3;"#).unwrap();
    assert_eq!(result.to_display_string(), "123");
}

#[test]
fn async_then_dispatch_runs_after_the_registering_statement() {
    let mut engine = engine();
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let log_for_record = log.clone();
    engine.register_function(
        "record",
        1,
        Some(1),
        Rc::new(move |args| {
            if let Some(HostValue::String(s)) = args.into_iter().next() {
                log_for_record.borrow_mut().push(s);
                Ok(HostValue::Null)
            } else {
                Err("record expects a string".to_string())
            }
        }),
    );

    engine
        .execute(
            r#"
            async function f() { return 42; }
            let p = f();
            p.then(x => record("a:" + x));
            record("b");
        "#,
        )
        .unwrap();

    // `then` on an already-settled promise must not run inline.
    assert_eq!(&*log.borrow(), &["b".to_string()]);

    engine.run_event_loop_until_idle();
    assert_eq!(&*log.borrow(), &["b".to_string(), "a:42".to_string()]);
}

#[test]
fn interface_match_succeeds_for_a_conforming_class() {
    let mut engine = engine();
    engine.register_interface("Shape", &["area"]);
    let result = engine
        .execute(
            r"
            class Circle { function area() { return 3.14; } }
            let c = new Circle();
            c =~= Shape;
        ",
        )
        .unwrap();
    assert!(matches!(result, Value::Boolean(true)));
}

#[test]
fn destructuring_with_defaults_and_rest_binds_as_expected() {
    let mut engine = engine();
    let result = engine
        .execute(
            r#"
            let [a, b = 10, ...rest] = [1];
            a + ":" + b + ":" + rest.len();
        "#,
        )
        .unwrap();
    assert_eq!(result.to_display_string(), "1:10:0");
}

#[test]
fn caught_exception_carries_message_and_a_multi_frame_stack() {
    let mut engine = engine();
    let result = engine
        .execute(
            r#"
            function g() { throw "oops"; }
            function f() { g(); }
            let result = null;
            try { f(); } catch (e) { result = e; }
            result;
        "#,
        )
        .unwrap();
    let Value::Object(map) = result else { panic!("expected the reified exception object") };
    let map = map.borrow();
    assert_eq!(map.get("message").unwrap().to_display_string(), "oops");
    let Some(Value::Array(stack)) = map.get("stack") else { panic!("expected a stack array") };
    assert!(stack.borrow().len() >= 2);
}

#[test]
fn two_imports_of_the_same_file_share_one_module_object() {
    let dir = std::env::temp_dir();
    let path = dir.join("alang_scenario_shared_module.alang");
    std::fs::write(&path, "export let X = 1;").unwrap();

    let mut engine = Engine::new(EngineConfig { import_base_dir: dir, ..EngineConfig::default() });
    engine.initialize();
    let source = format!(
        r#"
        import "{stem}" as A;
        import "{stem}" as B;
        A === B;
        "#,
        stem = path.file_stem().unwrap().to_str().unwrap()
    );
    let result = engine.execute(&source).unwrap();
    assert!(matches!(result, Value::Boolean(true)));

    std::fs::remove_file(&path).ok();
}
