//! Message dispatch tests
//!
//! Drives the engine through scripts attached to a small stack and checks
//! where messages land, what `pass` does, and how failures surface.

use stackrt::runtime::context::ExecutionContext;
use stackrt::runtime::error::{ErrorCategory, ScriptError};
use stackrt::runtime::part::{PartKey, PartType};
use stackrt::{Engine, Message, PartSpecifier, RuntimeConfig, Value};

struct Home {
    engine: Engine,
    stack: PartKey,
    background: PartKey,
    card: PartKey,
    bg_button: PartKey,
    card_button: PartKey,
}

fn home() -> Home {
    let mut engine = Engine::new(RuntimeConfig {
        ordinal_seed: Some(3),
        ..RuntimeConfig::default()
    });
    let stack = engine.registry_mut().add_stack("Home");
    let scope = engine.current_scope().unwrap();
    let background = scope.background.unwrap();
    let card = scope.card.unwrap();
    let bg_button = engine
        .registry_mut()
        .add_part(background, PartType::Button, "Next")
        .unwrap();
    let card_button = engine
        .registry_mut()
        .add_part(card, PartType::Button, "OK")
        .unwrap();
    Home {
        engine,
        stack,
        background,
        card,
        bg_button,
        card_button,
    }
}

fn set_script(engine: &Engine, key: PartKey, script: &str) {
    engine.part(key).unwrap().set_script(script);
}

fn msg(engine: &Engine) -> Value {
    engine
        .registry()
        .message_box()
        .properties()
        .get("contents")
        .unwrap()
}

fn context(engine: &Engine) -> ExecutionContext {
    engine.new_context().unwrap()
}

#[test]
fn background_button_message_reaches_the_stack() {
    let home = home();
    set_script(
        &home.engine,
        home.stack,
        "(on mouseUp ()\n  (put (& \"stack got \" (the short name of target)) into msg))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_message(&mut ctx, &PartSpecifier::by_name(PartType::Button, "Next"), &Message::new("mouseUp"));

    assert!(outcome.trapped);
    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(msg(&home.engine), Value::text("stack got Next"));
    assert_eq!(ctx.target_key(), Some(home.bg_button));
}

#[test]
fn pass_walks_every_level_in_order() {
    let home = home();
    let log = "(put (& (the short name of me) \";\") after msg) (pass)";
    for (key, name) in [
        (home.card_button, "button"),
        (home.card, "card"),
        (home.background, "bg"),
        (home.stack, "stack"),
    ] {
        let part = home.engine.part(key).unwrap();
        part.properties().set("name", name).unwrap();
        part.set_script(format!("(on hello () {})", log));
    }

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_to_part(&mut ctx, home.card_button, &Message::new("hello"));

    assert!(!outcome.trapped, "the last handler passed to the application");
    assert_eq!(msg(&home.engine), Value::text("button;card;bg;stack;"));
}

#[test]
fn target_stays_fixed_across_nested_sends() {
    let home = home();
    set_script(
        &home.engine,
        home.card_button,
        "(on mouseUp () (send refresh to (this card)))",
    );
    set_script(
        &home.engine,
        home.card,
        "(on refresh () (put (the short name of target) into msg))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_to_part(&mut ctx, home.card_button, &Message::new("mouseUp"));

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(msg(&home.engine), Value::text("OK"));
}

#[test]
fn message_box_sends_go_to_the_current_card() {
    let home = home();
    set_script(&home.engine, home.card, "(on ping () (put \"pong\" into msg))");

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_message(&mut ctx, &PartSpecifier::MessageBox, &Message::new("ping"));

    assert!(outcome.trapped);
    assert_eq!(msg(&home.engine), Value::text("pong"));
}

#[test]
fn functions_return_values_and_result_register_is_set() {
    let home = home();
    set_script(
        &home.engine,
        home.background,
        "(function total (a b)\n  (return (+ a b)))\n(on compute ()\n  (return (total 2 40)))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_to_part(&mut ctx, home.card, &Message::new("compute"));

    assert!(outcome.trapped);
    assert_eq!(ctx.result(), &Value::Integer(42));

    let value = home
        .engine
        .invoke_function(
            &mut ctx,
            &PartSpecifier::This(PartType::Card),
            "TOTAL",
            vec![Value::text("1"), Value::Integer(1)],
        )
        .unwrap();
    assert_eq!(value, Value::Integer(2));
}

#[test]
fn chunk_puts_edit_field_contents() {
    let mut home = home();
    let field = home
        .engine
        .registry_mut()
        .add_part(home.card, PartType::Field, "List")
        .unwrap();
    home.engine
        .part(field)
        .unwrap()
        .properties()
        .set("text", "alpha,beta,gamma")
        .unwrap();
    set_script(
        &home.engine,
        home.card,
        "(on edit ()\n  (get (item 2 of (field \"List\")))\n  (put \"BETA\" into (item 2 of (field \"List\"))))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home.engine.send_to_part(&mut ctx, home.card, &Message::new("edit"));

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(ctx.it(), &Value::text("beta"));
    assert_eq!(
        home.engine.part(field).unwrap().properties().get("contents").unwrap(),
        Value::text("alpha,BETA,gamma")
    );
}

#[test]
fn errors_report_category_and_location() {
    let home = home();
    set_script(
        &home.engine,
        home.card,
        "(on fail ()\n  (get 1)\n  (set id of (button \"OK\") to 99))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home.engine.send_to_part(&mut ctx, home.card, &Message::new("fail"));

    let err = outcome.error.expect("permission error");
    assert!(outcome.trapped);
    assert_eq!(err.category(), ErrorCategory::Permission);
    let location = err.location().expect("location");
    assert_eq!(location.handler, "fail");
    assert_eq!(location.line, 3);
    assert!(location.part.starts_with("card"), "{}", location.part);
}

#[test]
fn syntax_errors_surface_when_the_script_is_first_used() {
    let home = home();
    set_script(&home.engine, home.card, "(on broken ()\n  (put 1 into)");

    let mut ctx = context(&home.engine);
    let outcome = home.engine.send_to_part(&mut ctx, home.card, &Message::new("anything"));

    let err = outcome.error.expect("syntax error");
    assert_eq!(err.category(), ErrorCategory::Syntax);
}

#[test]
fn missing_targets_are_reported_without_running_anything() {
    let home = home();
    let mut ctx = context(&home.engine);
    let outcome = home.engine.send_message(
        &mut ctx,
        &PartSpecifier::by_name(PartType::Button, "Missing"),
        &Message::new("mouseUp"),
    );
    assert!(!outcome.trapped);
    assert!(matches!(outcome.error, Some(ScriptError::PartNotFound(_))));
}

#[test]
fn sends_into_another_stack_resolve_there() {
    let mut home = home();
    let other = home.engine.registry_mut().add_stack("Tools");
    let other_card = home.engine.registry().cards(other).unwrap()[0];
    let tool = home
        .engine
        .registry_mut()
        .add_part(other_card, PartType::Button, "Tool")
        .unwrap();
    set_script(
        &home.engine,
        other_card,
        "(on report () (put (the short name of (button 1)) into msg))",
    );
    set_script(
        &home.engine,
        home.card_button,
        "(on mouseUp () (send report to (card 1 of (stack \"Tools\"))))",
    );

    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_to_part(&mut ctx, home.card_button, &Message::new("mouseUp"));

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(msg(&home.engine), Value::text("Tool"));
    assert_eq!(home.engine.registry().current_scope().unwrap().stack, home.stack);
    assert_ne!(tool, home.card_button);
}

#[test]
fn repeat_control_outside_a_loop_is_an_error() {
    let home = home();
    set_script(
        &home.engine,
        home.card,
        "(on leave ()\n  (exit repeat))\n(on skip ()\n  (put \"before\" into msg)\n  (next repeat)\n  (put \"after\" into msg))",
    );

    for name in ["leave", "skip"] {
        let mut ctx = context(&home.engine);
        let outcome = home.engine.send_to_part(&mut ctx, home.card, &Message::new(name));
        assert!(outcome.trapped, "{} stops the walk", name);
        let err = outcome.error.expect("repeat control error");
        assert_eq!(err.category(), ErrorCategory::Semantic);
        assert_eq!(err.root(), &ScriptError::semantic("repeat control outside a repeat loop"));
    }
    assert_eq!(msg(&home.engine), Value::text("before"));
}

#[test]
fn peeking_suppresses_every_message() {
    let home = home();
    set_script(&home.engine, home.card, "(on ping () (put \"pong\" after msg))");
    let send = |message: Message| {
        let mut ctx = context(&home.engine);
        home.engine.send_to_part(&mut ctx, home.card, &message)
    };

    home.engine.set_peeking(true);
    for message in [Message::new("ping"), Message::system("ping")] {
        let outcome = send(message);
        assert!(!outcome.trapped);
        assert!(outcome.is_ok());
    }
    let mut ctx = context(&home.engine);
    let outcome = home
        .engine
        .send_message(&mut ctx, &PartSpecifier::This(PartType::Card), &Message::new("ping"));
    assert!(!outcome.trapped);
    assert_eq!(msg(&home.engine), Value::Empty);

    home.engine.set_peeking(false);
    home.engine.set_lock_messages(true);
    assert!(send(Message::new("ping")).trapped);
    assert!(!send(Message::system("ping")).trapped);
    assert_eq!(msg(&home.engine), Value::text("pong"));
}

