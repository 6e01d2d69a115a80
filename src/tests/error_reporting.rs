use super::*;

fn with_console(markup: &str, options: SessionOptions) -> Result<(Session, VirtualConsole)> {
    let console = VirtualConsole::new();
    let session = Session::new(markup, options.virtual_console(console.clone()))?;
    Ok((session, console))
}

#[test]
fn compile_failures_go_inert_and_are_reported_once() -> Result<()> {
    let (mut session, console) =
        with_console(r#"<button id="b" onclick="return (">b</button>"#, SessionOptions::new())?;
    let button = element(&session, "b")?;

    assert!(session.click(button)?);
    assert!(session.click(button)?);
    assert_eq!(session.event_handler(button, "click")?, Value::Null);

    let reports = console.messages(ConsoleLevel::JsdomError);
    assert_eq!(reports.len(), 1);
    assert!(
        reports[0].starts_with("failed to compile onclick handler"),
        "unexpected report: {}",
        reports[0]
    );
    Ok(())
}

#[test]
fn a_fixed_attribute_recovers_from_a_compile_failure() -> Result<()> {
    let (mut session, _console) =
        with_console(r#"<button id="b" onclick="}">b</button>"#, SessionOptions::new())?;
    let button = element(&session, "b")?;
    assert_eq!(session.event_handler(button, "click")?, Value::Null);

    session.set_attribute(button, "onclick", "document.title = 'fixed'; return true")?;
    session.click(button)?;
    assert_eq!(session.title(), "fixed");
    Ok(())
}

#[test]
fn uncaught_handler_exceptions_reach_the_console() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<button id="b" onclick="missing(); return false">b</button>"#,
        SessionOptions::new(),
    )?;
    let button = element(&session, "b")?;
    assert!(session.click(button)?);
    assert_eq!(
        console.messages(ConsoleLevel::JsdomError),
        vec!["Uncaught ReferenceError: missing is not defined"]
    );
    Ok(())
}

#[test]
fn window_onerror_returning_true_suppresses_the_report() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<body onerror="document.title = event; return true"><button id="b" onclick="missing()">b</button></body>"#,
        SessionOptions::new(),
    )?;
    let button = element(&session, "b")?;
    session.click(button)?;
    assert_eq!(session.title(), "ReferenceError: missing is not defined");
    assert!(console.messages(ConsoleLevel::JsdomError).is_empty());
    Ok(())
}

#[test]
fn error_listeners_see_an_error_event() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<button id="b" onclick="throw new TypeError('bad input')">b</button>"#,
        SessionOptions::new().run_scripts("outside-only"),
    )?;
    session.eval(
        "var seen = '';
         window.addEventListener('error', function (e) {
           seen = e.type + '|' + e.message + '|' + e.error.message;
         });",
    )?;
    let button = element(&session, "b")?;
    session.click(button)?;
    assert_eq!(
        session.eval("seen")?,
        Value::String("error|TypeError: bad input|bad input".into())
    );
    assert_eq!(
        console.messages(ConsoleLevel::JsdomError),
        vec!["Uncaught TypeError: bad input"]
    );
    Ok(())
}

#[test]
fn errors_inside_onerror_are_only_logged() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<body onerror="missingToo()"><button id="b" onclick="missing()">b</button></body>"#,
        SessionOptions::new(),
    )?;
    let button = element(&session, "b")?;
    session.click(button)?;
    assert_eq!(
        console.messages(ConsoleLevel::JsdomError),
        vec![
            "Uncaught ReferenceError: missingToo is not defined",
            "Uncaught ReferenceError: missing is not defined",
        ]
    );
    Ok(())
}

#[test]
fn a_throwing_listener_does_not_block_the_next_one() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<button id="b">b</button>"#,
        SessionOptions::new().run_scripts("outside-only"),
    )?;
    session.eval(
        "var log = [];
         var b = document.getElementById('b');
         b.addEventListener('click', function () { log.push('a'); throw new Error('first'); });
         b.addEventListener('click', function () { log.push('b'); });",
    )?;
    let button = element(&session, "b")?;
    session.click(button)?;
    assert_eq!(session.eval("log.join(',')")?, Value::String("a,b".into()));
    assert_eq!(
        console.messages(ConsoleLevel::JsdomError),
        vec!["Uncaught Error: first"]
    );
    Ok(())
}

#[test]
fn embedder_eval_returns_errors_instead_of_reporting() -> Result<()> {
    let (mut session, console) = with_console("", SessionOptions::new().run_scripts("outside-only"))?;
    match session.eval("missing()") {
        Err(Error::ScriptRuntime(message)) => {
            assert_eq!(message, "Uncaught ReferenceError: missing is not defined");
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
    assert!(matches!(session.eval("return 1"), Err(Error::ScriptParse(_))));
    assert!(console.entries().is_empty());
    Ok(())
}

#[test]
fn runaway_recursion_becomes_a_range_error() -> Result<()> {
    let (mut session, _console) = with_console("", SessionOptions::new().run_scripts("outside-only"))?;
    let outcome = session.eval("function down(n) { return down(n + 1); } down(0)");
    match outcome {
        Err(Error::ScriptRuntime(message)) => {
            assert_eq!(message, "Uncaught RangeError: Maximum call stack size exceeded");
        }
        other => panic!("expected a range error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn event_tracing_records_listener_invocations() -> Result<()> {
    let (mut session, console) = with_console(
        r#"<button id="b" onclick="return true">b</button>"#,
        SessionOptions::new(),
    )?;
    console.set_trace_events(true);
    let button = element(&session, "b")?;
    session.click(button)?;

    let trace = console.messages(ConsoleLevel::Trace);
    assert_eq!(
        trace,
        vec![
            "[event] click target=#b current=#b phase=bubble default_prevented=false",
            "[handler] compile onclick target=#b scope=element>document",
            "[event] done click target=#b outcome=completed default_prevented=false propagation_stopped=false immediate_stopped=false",
        ]
    );
    Ok(())
}
