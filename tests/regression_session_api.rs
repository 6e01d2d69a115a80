use scripted_dom::{
    ConsoleLevel, CookieJar, Error, Event, EventTarget, Result, Session, SessionOptions, Value,
    VirtualConsole,
};

fn quiet_options() -> SessionOptions {
    SessionOptions::new().virtual_console(VirtualConsole::new())
}

fn by_id(session: &Session, id: &str) -> Result<scripted_dom::NodeId> {
    session
        .get_element_by_id(id)
        .ok_or_else(|| Error::ScriptRuntime(format!("missing #{id}")))
}

#[test]
fn form_handlers_read_sibling_controls_and_write_results() -> Result<()> {
    let html = r#"
        <form id="order" name="order">
          <input id="qty" name="qty" value="4">
          <input id="price" name="price" value="2.5">
          <button id="total" type="button"
                  onclick="getElementById('out').textContent = String(qty.value * price.value); return false">
            total
          </button>
        </form>
        <p id="out"></p>
    "#;
    let mut session = Session::new(html, quiet_options())?;
    let button = by_id(&session, "total")?;
    assert!(!session.click(button)?);
    let out = by_id(&session, "out")?;
    assert_eq!(session.text_content(out)?, "10");

    let qty = by_id(&session, "qty")?;
    session.set_attribute(qty, "value", "10")?;
    session.click(button)?;
    assert_eq!(session.text_content(out)?, "25");
    Ok(())
}

#[test]
fn handlers_share_the_cookie_jar_with_the_embedder() -> Result<()> {
    let jar = CookieJar::new();
    let mut session = Session::new(
        r#"<button id="b" onclick="document.cookie = 'seen=yes'; return true">b</button>"#,
        quiet_options()
            .url("https://shop.example/cart")
            .cookie_jar(jar.clone()),
    )?;
    jar.set_cookie("session=abc", "https://shop.example/")?;
    let button = by_id(&session, "b")?;
    session.click(button)?;

    let cookies = jar.get_cookie_string("https://shop.example/cart")?;
    assert!(cookies.contains("session=abc"), "cookies: {cookies}");
    assert!(cookies.contains("seen=yes"), "cookies: {cookies}");
    assert!(session.cookie_jar().ptr_eq(&jar));
    Ok(())
}

#[test]
fn inline_scripts_define_functions_that_handlers_call() -> Result<()> {
    let html = r#"
        <script>
          var clicks = 0;
          function record(label) {
            clicks = clicks + 1;
            document.title = label + ':' + clicks;
            return true;
          }
        </script>
        <button id="one" onclick="return record(id)">one</button>
        <button id="two" onclick="return record(this.id)">two</button>
    "#;
    let mut session = Session::new(html, quiet_options().run_scripts("dangerously"))?;
    let one = by_id(&session, "one")?;
    let two = by_id(&session, "two")?;
    assert!(session.click(one)?);
    assert!(session.click(two)?);
    assert_eq!(session.title(), "two:2");
    assert_eq!(session.eval("clicks")?, Value::Number(2.0));
    Ok(())
}

#[test]
fn body_onload_runs_once_after_parsing() -> Result<()> {
    let html = r#"
        <body onload="document.title = document.readyState + '/' + (loads = (typeof loads === 'number' ? loads : 0) + 1)">
          <p id="p">x</p>
        </body>
    "#;
    let mut session = Session::new(html, quiet_options().run_scripts("outside-only"))?;
    assert_eq!(session.title(), "complete/1");
    assert_eq!(session.eval("loads")?, Value::Number(1.0));

    let paragraph = by_id(&session, "p")?;
    session.fire_event(paragraph, "load", false)?;
    assert_eq!(session.eval("loads")?, Value::Number(1.0));
    Ok(())
}

#[test]
fn embedder_events_report_cancellation() -> Result<()> {
    let mut session = Session::new(
        r#"<a id="link" href="/next" onclick="return false">next</a>"#,
        quiet_options(),
    )?;
    let link = by_id(&session, "link")?;
    let event = Event::new("click").bubbles(true).cancelable(true);
    assert!(!session.dispatch_event(link, &event)?);
    assert!(event.default_prevented());
    assert_eq!(event.target(), Some(EventTarget::Node(link)));
    Ok(())
}

#[test]
fn broken_handlers_do_not_break_their_neighbours() -> Result<()> {
    let console = VirtualConsole::new();
    let html = r#"
        <div id="outer" onclick="document.title = 'outer ran'; return true">
          <button id="broken" onclick="return (">broken</button>
          <button id="throws" onclick="nope.value = 1">throws</button>
        </div>
    "#;
    let mut session = Session::new(html, SessionOptions::new().virtual_console(console.clone()))?;

    let broken = by_id(&session, "broken")?;
    assert!(session.click(broken)?);
    assert_eq!(session.title(), "outer ran");

    let throws = by_id(&session, "throws")?;
    session.click(throws)?;

    let errors = console.messages(ConsoleLevel::JsdomError);
    assert_eq!(errors.len(), 2, "errors: {errors:?}");
    assert!(errors[0].starts_with("failed to compile onclick handler"));
    assert_eq!(errors[1], "Uncaught ReferenceError: nope is not defined");
    Ok(())
}

#[test]
fn unknown_nodes_are_rejected() -> Result<()> {
    let mut big = Session::new("<p></p><p></p><p></p><p></p>", quiet_options())?;
    let small = Session::new("", quiet_options())?;
    let stray = big.create_element("div");
    assert!(matches!(small.text_content(stray), Err(Error::UnknownNode(_))));
    Ok(())
}
