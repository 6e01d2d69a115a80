use super::*;

#[test]
fn default_construction_is_an_html_document_at_about_blank() -> Result<()> {
    let session = session("")?;
    assert_eq!(session.content_type(), "text/html");
    assert_eq!(session.parsing_mode(), ParsingMode::Html);
    assert_eq!(session.url(), "about:blank");
    assert_eq!(session.document_uri(), "about:blank");
    assert_eq!(session.referrer(), "about:blank");
    assert_eq!(session.origin(), "null");
    assert_eq!(session.scripting_mode(), ScriptingMode::Disabled);
    assert_eq!(session.ready_state(), "complete");
    Ok(())
}

#[test]
fn xml_mode_defaults_its_own_content_type() -> Result<()> {
    let session = session_with("<root/>", SessionOptions::new().parsing_mode("xml"))?;
    assert_eq!(session.parsing_mode(), ParsingMode::Xml);
    assert_eq!(session.content_type(), "application/xml");

    let svg = session_with(
        "<svg/>",
        SessionOptions::new()
            .parsing_mode("xml")
            .content_type("image/svg+xml"),
    )?;
    assert_eq!(svg.content_type(), "image/svg+xml");
    Ok(())
}

#[test]
fn out_of_domain_options_fail_construction() {
    let err = session_with("", SessionOptions::new().parsing_mode("svg")).err();
    assert_eq!(err, Some(Error::InvalidParsingMode("svg".into())));

    let err = session_with("", SessionOptions::new().run_scripts("always")).err();
    assert_eq!(err, Some(Error::InvalidScriptingMode("always".into())));

    let err = session_with("", SessionOptions::new().url("not a url")).err();
    assert_eq!(
        err,
        Some(Error::InvalidUrl {
            what: "url",
            input: "not a url".into(),
        })
    );

    let err = session_with("", SessionOptions::new().referrer("::")).err();
    assert_eq!(
        err,
        Some(Error::InvalidUrl {
            what: "referrer",
            input: "::".into(),
        })
    );
}

#[test]
fn urls_are_canonicalized() -> Result<()> {
    let session = session_with(
        "",
        SessionOptions::new()
            .url("HTTPS://Example.com/a/../b")
            .referrer("https://referrer.test"),
    )?;
    assert_eq!(session.url(), "https://example.com/b");
    assert_eq!(session.origin(), "https://example.com");
    assert_eq!(session.referrer(), "https://referrer.test/");
    Ok(())
}

#[test]
fn failed_url_change_leaves_document_untouched() -> Result<()> {
    let mut session = session_with("", SessionOptions::new().url("https://example.com/start"))?;
    let err = session.change_url("not a url").err();
    assert!(matches!(err, Some(Error::InvalidUrl { what: "url", .. })));
    assert_eq!(session.url(), "https://example.com/start");
    assert_eq!(session.origin(), "https://example.com");

    session.change_url("http:example.com")?;
    assert_eq!(session.url(), "http://example.com/");
    assert_eq!(session.origin(), "http://example.com");
    Ok(())
}

#[test]
fn reconfigure_distinguishes_absent_from_undefined() -> Result<()> {
    let mut session = session("")?;
    assert_eq!(session.window_top(), Value::Window);

    session.reconfigure_window(WindowReconfiguration::default());
    assert_eq!(session.window_top(), Value::Window);

    session.reconfigure_window(WindowReconfiguration {
        top: Some(Value::Undefined),
    });
    assert_eq!(session.window_top(), Value::Undefined);
    Ok(())
}

#[test]
fn reconfigured_top_is_visible_to_script() -> Result<()> {
    let mut session = outside_only("")?;
    assert_eq!(session.eval("top === window")?, Value::Bool(true));
    session.reconfigure_window(WindowReconfiguration {
        top: Some(Value::Null),
    });
    assert_eq!(session.eval("top")?, Value::Null);
    Ok(())
}

#[test]
fn caller_supplied_cookie_jar_is_used_as_is() -> Result<()> {
    let jar = CookieJar::new();
    let mut session = session_with(
        "",
        SessionOptions::new()
            .url("https://example.com/")
            .run_scripts("outside-only")
            .cookie_jar(jar.clone()),
    )?;
    assert!(session.cookie_jar().ptr_eq(&jar));

    let cookie = session.eval("document.cookie = 'a=1'; document.cookie")?;
    assert_eq!(cookie, Value::String("a=1".into()));
    assert_eq!(jar.get_cookie_string("https://example.com/")?, "a=1");
    Ok(())
}

#[test]
fn default_cookie_jar_is_loose() -> Result<()> {
    let session = session("")?;
    assert!(session.cookie_jar().loose_mode());
    Ok(())
}

#[test]
fn caller_supplied_console_receives_diagnostics() -> Result<()> {
    let console = VirtualConsole::new();
    let mut session = Session::new(
        r#"<p id="p" onclick="console.log('seen', 1); return true"></p>"#,
        SessionOptions::new().virtual_console(console.clone()),
    )?;
    assert!(session.virtual_console().ptr_eq(&console));
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(console.messages(ConsoleLevel::Log), vec!["seen 1"]);
    Ok(())
}
