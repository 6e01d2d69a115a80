use super::*;

fn handler(session: &mut Session, target: impl Into<EventTarget>, event: &str) -> Result<FunctionRef> {
    match session.event_handler(target, event)? {
        Value::Function(function) => Ok(function),
        other => Err(Error::ScriptRuntime(format!("expected a handler, got {other:?}"))),
    }
}

#[test]
fn reading_the_accessor_compiles_once() -> Result<()> {
    let mut session = session(r#"<button id="b" onclick="return 1">b</button>"#)?;
    let button = element(&session, "b")?;
    let first = handler(&mut session, button, "click")?;
    let second = handler(&mut session, button, "click")?;
    assert!(first.ptr_eq(&second));
    assert_eq!(first.params(), vec!["event"]);
    Ok(())
}

#[test]
fn dispatch_reuses_the_compiled_handler() -> Result<()> {
    let mut session = session(r#"<button id="b" onclick="return true">b</button>"#)?;
    let button = element(&session, "b")?;
    assert!(session.click(button)?);
    let after_click = handler(&mut session, button, "click")?;
    assert!(session.click(button)?);
    assert!(after_click.ptr_eq(&handler(&mut session, button, "click")?));
    Ok(())
}

#[test]
fn rewriting_the_attribute_drops_the_compiled_handler() -> Result<()> {
    let mut session =
        session(r#"<button id="b" onclick="document.title = 'first'; return true">b</button>"#)?;
    let button = element(&session, "b")?;
    let stale = handler(&mut session, button, "click")?;

    session.set_attribute(button, "onclick", "document.title = 'second'; return true")?;
    let fresh = handler(&mut session, button, "click")?;
    assert!(!stale.ptr_eq(&fresh));

    session.click(button)?;
    assert_eq!(session.title(), "second");
    Ok(())
}

#[test]
fn attribute_names_are_case_insensitive_in_html() -> Result<()> {
    let mut session = session(r#"<p id="p" OnClick="document.title = 'upper'; return true"></p>"#)?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "upper");

    session.set_attribute(paragraph, "ONCLICK", "document.title = 'set'; return true")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "set");
    Ok(())
}

#[test]
fn empty_slots_read_as_null() -> Result<()> {
    let mut session = session(r#"<p id="p"></p>"#)?;
    let paragraph = element(&session, "p")?;
    assert_eq!(session.event_handler(paragraph, "click")?, Value::Null);
    assert_eq!(session.event_handler(EventTarget::Window, "load")?, Value::Null);
    assert!(session.event_handler(paragraph, "beforeunload").is_err());
    assert!(session.event_handler(paragraph, "onclick").is_err());
    Ok(())
}

#[test]
fn removing_the_attribute_empties_the_slot() -> Result<()> {
    let mut session = session(r#"<button id="b" onclick="return false">b</button>"#)?;
    let button = element(&session, "b")?;
    assert!(!session.click(button)?);

    session.remove_attribute(button, "onclick")?;
    assert_eq!(session.event_handler(button, "click")?, Value::Null);
    assert!(session.click(button)?);
    Ok(())
}

#[test]
fn non_callable_assignment_is_ignored() -> Result<()> {
    let mut session = session(r#"<button id="b" onclick="return true">b</button>"#)?;
    let button = element(&session, "b")?;
    let original = handler(&mut session, button, "click")?;

    session.set_event_handler(button, "click", Value::Number(1.0))?;
    session.set_event_handler(button, "click", Value::String("return false".into()))?;
    assert!(original.ptr_eq(&handler(&mut session, button, "click")?));
    Ok(())
}

#[test]
fn assigned_functions_replace_the_slot_directly() -> Result<()> {
    let mut session = outside_only(r#"<button id="b">b</button>"#)?;
    session.eval(
        "document.getElementById('b').onclick = function () { document.title = 'assigned'; return true; };",
    )?;
    let button = element(&session, "b")?;
    assert!(session.click(button)?);
    assert_eq!(session.title(), "assigned");

    let from_script = session.eval("document.getElementById('b').onclick")?;
    assert_eq!(from_script, session.event_handler(button, "click")?);
    Ok(())
}

#[test]
fn script_reads_compile_attribute_source() -> Result<()> {
    let mut session = outside_only(r#"<button id="b" onclick="return 42">b</button>"#)?;
    assert_eq!(
        session.eval("typeof document.getElementById('b').onclick")?,
        Value::String("function".into())
    );
    assert_eq!(
        session.eval("document.getElementById('b').onclick()")?,
        Value::Number(42.0)
    );
    assert_eq!(
        session.eval("document.getElementById('b').onclick.name")?,
        Value::String("onclick".into())
    );
    Ok(())
}

#[test]
fn the_slot_listener_is_installed_once() -> Result<()> {
    let mut session = outside_only(r#"<button id="b" onclick="clicks++; return true">b</button>"#)?;
    session.eval("var clicks = 0")?;
    let button = element(&session, "b")?;

    session.set_attribute(button, "onclick", "clicks++; return true")?;
    session.set_attribute(button, "onclick", "clicks = clicks + 1; return true")?;
    let assigned = session.eval("(function () { clicks++; return true; })")?;
    session.set_event_handler(button, "click", assigned)?;
    session.click(button)?;
    assert_eq!(session.eval("clicks")?, Value::Number(1.0));
    Ok(())
}

#[test]
fn script_set_attribute_goes_through_the_slot() -> Result<()> {
    let mut session = outside_only(r#"<p id="p"></p>"#)?;
    session.eval(
        "document.getElementById('p').setAttribute('onclick', \"document.title = 'via setAttribute'; return true\")",
    )?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "via setAttribute");
    Ok(())
}

#[test]
fn body_window_events_reflect_onto_the_window() -> Result<()> {
    let mut session = session(
        r#"<body onload="document.title = 'loaded'; return true" onclick="return true"></body>"#,
    )?;
    assert_eq!(session.title(), "loaded");

    let body = session
        .body()
        .ok_or_else(|| Error::ScriptRuntime("missing body".into()))?;
    let from_window = handler(&mut session, EventTarget::Window, "load")?;
    let from_body = handler(&mut session, body, "load")?;
    assert!(from_window.ptr_eq(&from_body));

    assert!(!matches!(session.event_handler(EventTarget::Window, "click")?, Value::Function(_)));
    assert!(matches!(session.event_handler(body, "click")?, Value::Function(_)));
    Ok(())
}

#[test]
fn window_error_handlers_take_five_parameters() -> Result<()> {
    let mut session = session(r#"<body onerror="return true"><p id="p" onerror="return true"></p></body>"#)?;
    let window = handler(&mut session, EventTarget::Window, "error")?;
    assert_eq!(window.params(), vec!["event", "source", "lineno", "colno", "error"]);

    let paragraph = element(&session, "p")?;
    let element_handler = handler(&mut session, paragraph, "error")?;
    assert_eq!(element_handler.params(), vec!["event"]);
    Ok(())
}

#[test]
fn repeated_body_tags_only_apply_the_attributes_they_add() -> Result<()> {
    let mut session = session_with(
        r#"<body onclick="document.title = 'attribute'; return true"><script>document.body.onclick = function () { document.title = 'assigned'; return true; };</script><body data-x="1" onclick="document.title = 'ignored'">"#,
        SessionOptions::new().run_scripts("dangerously"),
    )?;
    let body = session
        .body()
        .ok_or_else(|| Error::ScriptRuntime("missing body".into()))?;
    assert_eq!(session.get_attribute(body, "data-x").as_deref(), Some("1"));
    assert!(session.click(body)?);
    assert_eq!(session.title(), "assigned");
    Ok(())
}

#[test]
fn repeated_body_tags_can_add_new_handlers() -> Result<()> {
    let mut session = session(
        r#"<p id="p">x</p><body onclick="document.title = 'merged'; return true">"#,
    )?;
    let body = session
        .body()
        .ok_or_else(|| Error::ScriptRuntime("missing body".into()))?;
    assert!(session.click(body)?);
    assert_eq!(session.title(), "merged");
    Ok(())
}
