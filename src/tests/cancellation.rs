use super::*;

fn dispatch(session: &mut Session, id: &str, event: &Event) -> Result<bool> {
    let target = element(session, id)?;
    session.dispatch_event(target, event)
}

#[test]
fn mouseover_cancels_on_truthy_return() -> Result<()> {
    let mut session = session(
        r#"<div id="yes" onmouseover="return true"></div><div id="no" onmouseover="return 0"></div><div id="silent" onmouseover="void 0"></div>"#,
    )?;

    let event = Event::new("mouseover").bubbles(true).cancelable(true);
    assert!(!dispatch(&mut session, "yes", &event)?);
    assert!(event.default_prevented());

    let event = Event::new("mouseover").bubbles(true).cancelable(true);
    assert!(dispatch(&mut session, "no", &event)?);

    let event = Event::new("mouseover").bubbles(true).cancelable(true);
    assert!(dispatch(&mut session, "silent", &event)?);
    Ok(())
}

#[test]
fn click_cancels_unless_truthy() -> Result<()> {
    let mut session = session(
        r#"<button id="false" onclick="return false"></button><button id="truthy" onclick="return 'yes'"></button><button id="absent" onclick="document.title = 'ran'"></button>"#,
    )?;
    let falsy = element(&session, "false")?;
    let truthy = element(&session, "truthy")?;
    let absent = element(&session, "absent")?;

    assert!(!session.click(falsy)?);
    assert!(session.click(truthy)?);
    assert!(!session.click(absent)?);
    assert_eq!(session.title(), "ran");
    Ok(())
}

#[test]
fn return_values_cancel_even_non_cancelable_events() -> Result<()> {
    let mut session = session(r#"<p id="p" onkeydown="return false"></p>"#)?;
    let event = Event::new("keydown");
    assert!(!dispatch(&mut session, "p", &event)?);
    Ok(())
}

#[test]
fn prevent_default_honours_cancelable() -> Result<()> {
    let mut session = session(
        r#"<p id="p" onkeyup="event.preventDefault(); return true"></p>"#,
    )?;
    assert!(dispatch(&mut session, "p", &Event::new("keyup"))?);
    assert!(!dispatch(&mut session, "p", &Event::new("keyup").cancelable(true))?);
    Ok(())
}

#[test]
fn error_polarity_depends_on_the_event_object() -> Result<()> {
    let mut session = session(
        r#"<body onerror="return true"><img id="allow" onerror="return true"><img id="deny" onerror="return false"></body>"#,
    )?;

    let error_event = Event::error_event("boom", "https://example.com/app.js", 3, 7, Value::Undefined);
    assert!(!session.dispatch_event(EventTarget::Window, &error_event)?);

    assert!(dispatch(&mut session, "allow", &Event::new("error"))?);
    assert!(!dispatch(&mut session, "deny", &Event::new("error"))?);
    Ok(())
}

#[test]
fn window_error_handler_receives_five_arguments() -> Result<()> {
    let mut session = session(
        r#"<body onerror="document.title = event + '|' + source + '|' + lineno + ':' + colno + '|' + error.message; return false"></body>"#,
    )?;
    let event = Event::error_event(
        "boom",
        "app.js",
        3,
        7,
        Value::Object(ObjectRef::default()),
    );
    assert!(session.dispatch_event(EventTarget::Window, &event)?);
    assert_eq!(session.title(), "boom|app.js|3:7|undefined");
    Ok(())
}

#[test]
fn propagation_runs_target_then_ancestors() -> Result<()> {
    let mut session = session(
        r#"<div id="outer" onclick="document.title = document.title + '>outer'; return true"><button id="inner" onclick="document.title = 'inner'; return true"></button></div>"#,
    )?;
    let inner = element(&session, "inner")?;
    assert!(session.click(inner)?);
    assert_eq!(session.title(), "inner>outer");
    Ok(())
}

#[test]
fn stop_propagation_keeps_ancestors_out() -> Result<()> {
    let mut session = session(
        r#"<div id="outer" onclick="document.title = 'outer'; return true"><button id="inner" onclick="event.stopPropagation(); document.title = 'inner'; return true"></button></div>"#,
    )?;
    let inner = element(&session, "inner")?;
    session.click(inner)?;
    assert_eq!(session.title(), "inner");
    Ok(())
}

#[test]
fn non_bubbling_events_stay_at_the_target() -> Result<()> {
    let mut session = session(
        r#"<div id="outer" onfocus="document.title = 'outer'; return true"><input id="field" onfocus="document.title = 'field'; return true"></div>"#,
    )?;
    let field = element(&session, "field")?;
    session.fire_event(field, "focus", false)?;
    assert_eq!(session.title(), "field");
    Ok(())
}

#[test]
fn script_listeners_and_handlers_share_the_event() -> Result<()> {
    let mut session = outside_only(r#"<button id="b" onclick="log.push('handler:' + event.eventPhase); return true"></button>"#)?;
    session.eval(
        "var log = [];
         var b = document.getElementById('b');
         document.addEventListener('click', function (e) { log.push('capture:' + e.eventPhase); }, true);
         b.addEventListener('click', function (e) { log.push('listener:' + (this === b)); e.preventDefault(); });
         window.addEventListener('click', function (e) { log.push('window:' + e.defaultPrevented); });",
    )?;
    let button = element(&session, "b")?;
    assert!(!session.click(button)?);
    assert_eq!(
        session.eval("log.join(',')")?,
        Value::String("capture:1,handler:2,listener:true,window:true".into())
    );
    Ok(())
}

#[test]
fn script_dispatch_reports_cancellation() -> Result<()> {
    let mut session = outside_only("")?;
    let result = session.eval(
        "var e = new Event('custom', { cancelable: true });
         document.body.addEventListener('custom', function (ev) { ev.preventDefault(); });
         document.body.dispatchEvent(e)",
    )?;
    assert_eq!(result, Value::Bool(false));
    assert_eq!(session.eval("e.defaultPrevented")?, Value::Bool(true));
    assert_eq!(session.eval("e.eventPhase")?, Value::Number(0.0));
    Ok(())
}
